use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{
    PostingId, PostingSlot, Rank, SchoolId, SchoolLink, SessionConfig, SupervisorId,
    SupervisorProfile,
};
use super::repository::{PostingRepository, ReferenceData, RepositoryError};

/// Business-rule violations that block a posting from being persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostingViolation {
    #[error("school {school_id} group {group} visit {visit} is already held by supervisor {occupant} (posting {posting_id})")]
    DuplicateSlot {
        school_id: SchoolId,
        group: u32,
        visit: u32,
        occupant: SupervisorId,
        posting_id: PostingId,
    },
    #[error("supervisor {supervisor_id} already holds {current} of {limit} primary postings this session")]
    CapacityExceeded {
        supervisor_id: SupervisorId,
        current: usize,
        limit: u32,
    },
    #[error("school {school_id} has no approved students in group {group}")]
    GroupNotFound { school_id: SchoolId, group: u32 },
    #[error("group number must be at least 1 (found {group})")]
    InvalidGroup { group: u32 },
    #[error("visit {visit} is outside the supervision cycle of {max_visits} visit(s)")]
    InvalidVisit { visit: u32, max_visits: u32 },
    #[error("school {school_id} has an out-of-range distance ({distance_km} km)")]
    InvalidDistance {
        school_id: SchoolId,
        distance_km: Decimal,
    },
    #[error("rank {rank_id} has an invalid {field} ({value})")]
    InvalidRate {
        rank_id: String,
        field: String,
        value: Decimal,
    },
    #[error("posting {posting_id} follows primary posting {primary_posting_id} and cannot change visit on its own")]
    FollowsPrimary {
        posting_id: PostingId,
        primary_posting_id: PostingId,
    },
}

impl PostingViolation {
    pub fn is_duplicate_slot(&self) -> bool {
        matches!(self, PostingViolation::DuplicateSlot { .. })
    }

    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, PostingViolation::CapacityExceeded { .. })
    }
}

/// Pre-persistence checks for a primary posting.
///
/// The duplicate-slot check is advisory: it gives callers early feedback, while the
/// repository remains the authority on slot uniqueness.
pub struct PostingValidator<'a, R: ?Sized, D: ?Sized> {
    postings: &'a R,
    reference: &'a D,
}

impl<'a, R, D> PostingValidator<'a, R, D>
where
    R: PostingRepository + ?Sized,
    D: ReferenceData + ?Sized,
{
    pub fn new(postings: &'a R, reference: &'a D) -> Self {
        Self {
            postings,
            reference,
        }
    }

    /// Collect every violation for placing `supervisor` on `slot`.
    pub fn validate(
        &self,
        session: &SessionConfig,
        slot: &PostingSlot,
        supervisor: &SupervisorProfile,
        school: &SchoolLink,
    ) -> Result<Vec<PostingViolation>, RepositoryError> {
        let mut violations = input_violations(session, slot, school, &supervisor.rank);

        if let Some(duplicate) = self.check_slot(slot)? {
            violations.push(duplicate);
        }

        let current = self.postings.active_primary_count(
            &slot.institution_id,
            &slot.session_id,
            &supervisor.supervisor_id,
        )?;
        if current >= session.max_postings_per_supervisor as usize {
            violations.push(PostingViolation::CapacityExceeded {
                supervisor_id: supervisor.supervisor_id.clone(),
                current,
                limit: session.max_postings_per_supervisor,
            });
        }

        let approved = self.reference.approved_acceptances(
            &slot.institution_id,
            &slot.session_id,
            &slot.school_id,
            Some(slot.group),
        )?;
        if approved == 0 {
            violations.push(PostingViolation::GroupNotFound {
                school_id: slot.school_id.clone(),
                group: slot.group,
            });
        }

        Ok(violations)
    }

    /// Supervisor-agnostic occupancy check for a single slot.
    pub fn check_slot(
        &self,
        slot: &PostingSlot,
    ) -> Result<Option<PostingViolation>, RepositoryError> {
        Ok(self
            .postings
            .active_in_slot(slot)?
            .map(|occupant| PostingViolation::DuplicateSlot {
                school_id: slot.school_id.clone(),
                group: slot.group,
                visit: slot.visit,
                occupant: occupant.supervisor_id,
                posting_id: occupant.id,
            }))
    }
}

/// Longest plausible road distance to a school.
pub const MAX_DISTANCE_KM: u32 = 40_075;
/// Ceiling for any single rate-card amount.
pub const MAX_RATE: u64 = 1_000_000_000_000;

pub(crate) fn visit_violation(session: &SessionConfig, visit: u32) -> Option<PostingViolation> {
    if visit == 0 || visit > session.max_visits {
        Some(PostingViolation::InvalidVisit {
            visit,
            max_visits: session.max_visits,
        })
    } else {
        None
    }
}

fn input_violations(
    session: &SessionConfig,
    slot: &PostingSlot,
    school: &SchoolLink,
    rank: &Rank,
) -> Vec<PostingViolation> {
    let mut violations = Vec::new();

    if slot.group == 0 {
        violations.push(PostingViolation::InvalidGroup { group: slot.group });
    }

    violations.extend(visit_violation(session, slot.visit));

    if school.distance_km < Decimal::ZERO || school.distance_km > Decimal::from(MAX_DISTANCE_KM) {
        violations.push(PostingViolation::InvalidDistance {
            school_id: school.school_id.clone(),
            distance_km: school.distance_km,
        });
    }

    let rates = [
        ("local_running_rate", rank.local_running_rate),
        ("transport_per_km", rank.transport_per_km),
        ("dta_rate", rank.dta_rate),
        ("tetfund_rate", rank.tetfund_rate),
    ];
    for (field, value) in rates {
        if value < Decimal::ZERO || value > Decimal::from(MAX_RATE) {
            violations.push(PostingViolation::InvalidRate {
                rank_id: rank.rank_id.clone(),
                field: field.to_string(),
                value,
            });
        }
    }

    let percentage = rank
        .dsa_percentage
        .unwrap_or(session.thresholds.dsa_percentage);
    if percentage < Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
        violations.push(PostingViolation::InvalidRate {
            rank_id: rank.rank_id.clone(),
            field: "dsa_percentage".to_string(),
            value: percentage,
        });
    }

    violations
}
