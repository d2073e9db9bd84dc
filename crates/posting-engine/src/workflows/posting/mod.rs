//! Supervisor posting: slot validation, allowance pricing, merged-group propagation,
//! auto-posting, and session allowance reporting.

pub mod aggregate;
pub mod allowance;
pub mod auto_post;
pub mod domain;
pub mod memory;
pub mod propagation;
pub mod repository;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use aggregate::{AllowanceSummary, PostingAggregator, PostingStatistics, SupervisorAllowance};
pub use allowance::AllowanceCalculator;
pub use auto_post::{
    AutoPostAssigner, AutoPostReport, AutoPostRequest, AutoPostSkip, SchoolCandidate, SkipReason,
};
pub use domain::{
    AllowanceBreakdown, GeoPoint, InstitutionId, LocationCategory, MergedGroup, NewPosting,
    OtherAllowance, Posting, PostingFilter, PostingId, PostingRequest, PostingSlot,
    PostingStatus, PostingUpdate, Rank, SchoolId, SchoolLink, SessionConfig, SessionId,
    SessionThresholds, SupervisorId, SupervisorProfile,
};
pub use memory::{InMemoryPostingStore, InMemoryReferenceData};
pub use propagation::{MergedGroupPropagator, PropagationFailure, PropagationReport};
pub use repository::{PostingRepository, ReferenceData, RepositoryError};
pub use router::posting_router;
pub use service::{
    BatchFailure, BulkPostingReport, EntityKind, MultiPostingReport, PostingFailure,
    PostingOutcome, PostingService, PostingServiceError,
};
pub use validation::{PostingValidator, PostingViolation};
