mod common;
mod propagation;
