use rust_decimal::Decimal;

use super::domain::{AllowanceBreakdown, LocationCategory, Rank, SessionThresholds};

/// Stateless pricing of a posting under one session's distance rules.
///
/// No rounding is applied; amounts keep full decimal precision until a presentation
/// boundary decides otherwise. Arithmetic saturates instead of overflowing; validation
/// keeps rates and distances far below that point.
#[derive(Debug, Clone)]
pub struct AllowanceCalculator {
    thresholds: SessionThresholds,
}

impl AllowanceCalculator {
    pub fn new(thresholds: SessionThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &SessionThresholds {
        &self.thresholds
    }

    pub fn location_category(&self, distance_km: Decimal) -> LocationCategory {
        if distance_km <= self.thresholds.inside_threshold_km {
            LocationCategory::Inside
        } else {
            LocationCategory::Outside
        }
    }

    /// Inclusive on both ends of the band.
    pub fn within_dsa_band(&self, distance_km: Decimal) -> bool {
        self.thresholds.dsa_enabled
            && distance_km >= self.thresholds.dsa_min_km
            && distance_km <= self.thresholds.dsa_max_km
    }

    pub fn compute(
        &self,
        rank: &Rank,
        distance_km: Decimal,
        is_secondary: bool,
    ) -> AllowanceBreakdown {
        let location_category = self.location_category(distance_km);
        let mut breakdown = AllowanceBreakdown::zero(distance_km, location_category);

        if is_secondary {
            return breakdown;
        }

        match location_category {
            LocationCategory::Inside => {
                breakdown.local_running = rank.local_running_rate;
            }
            LocationCategory::Outside => {
                breakdown.transport = rank.transport_per_km.saturating_mul(distance_km);
                breakdown.tetfund = rank.tetfund_rate;
                if self.within_dsa_band(distance_km) {
                    let percentage = rank
                        .dsa_percentage
                        .unwrap_or(self.thresholds.dsa_percentage);
                    breakdown.dsa = rank.dta_rate.saturating_mul(percentage) / Decimal::ONE_HUNDRED;
                } else {
                    breakdown.dta = rank.dta_rate;
                }
            }
        }

        breakdown.total = breakdown.subtotal().saturating_add(breakdown.tetfund);
        breakdown
    }
}
