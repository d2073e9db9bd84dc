use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::domain::{Posting, SchoolId, SchoolLink, SupervisorId, SupervisorProfile};
use super::service::{PostingFailure, PostingOutcome, PostingServiceError};
use super::validation::PostingViolation;

/// Group and visit every auto-posted assignment lands on.
pub const AUTO_POST_GROUP: u32 = 1;
pub const AUTO_POST_VISIT: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoPostRequest {
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub max_per_supervisor: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoPostReport {
    pub successful: Vec<PostingOutcome>,
    pub skipped: Vec<AutoPostSkip>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoPostSkip {
    pub school_id: SchoolId,
    pub school_name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Every supervisor in the rotation reached the per-supervisor limit.
    NoSupervisorCapacity,
    Rejected { violations: Vec<PostingViolation> },
    Failed { failure: PostingFailure },
}

/// A school that can still take auto-posted supervision, with its approved student count.
#[derive(Debug, Clone)]
pub struct SchoolCandidate {
    pub school: SchoolLink,
    pub approved_students: usize,
}

#[derive(Debug, Clone)]
struct RotationEntry {
    supervisor: SupervisorProfile,
    load: usize,
}

/// Round-robin allocator of a supervisor pool onto a pool of under-supervised schools.
///
/// Remaining capacity is tracked per assignment: a supervisor leaves the rotation as soon
/// as it reaches the limit, so the cap holds no matter how often the cursor wraps.
#[derive(Debug, Clone)]
pub struct AutoPostAssigner {
    max_visits: u32,
    max_per_supervisor: u32,
}

impl AutoPostAssigner {
    pub fn new(max_visits: u32, max_per_supervisor: u32) -> Self {
        Self {
            max_visits,
            max_per_supervisor,
        }
    }

    pub fn max_per_supervisor(&self) -> u32 {
        self.max_per_supervisor
    }

    /// Schools with approved students and fewer active postings than the visit cap,
    /// closest first.
    pub fn school_pool(
        &self,
        candidates: Vec<SchoolCandidate>,
        active: &[Posting],
        route_id: Option<&str>,
    ) -> Vec<SchoolLink> {
        let mut per_school: HashMap<&SchoolId, usize> = HashMap::new();
        for posting in active.iter().filter(|posting| posting.is_active()) {
            *per_school.entry(&posting.slot.school_id).or_default() += 1;
        }

        let mut pool: Vec<SchoolLink> = candidates
            .into_iter()
            .filter(|candidate| candidate.approved_students > 0)
            .filter(|candidate| {
                route_id.map_or(true, |route| {
                    candidate.school.route_id.as_deref() == Some(route)
                })
            })
            .filter(|candidate| {
                let existing = per_school
                    .get(&candidate.school.school_id)
                    .copied()
                    .unwrap_or(0);
                existing < self.max_visits as usize
            })
            .map(|candidate| candidate.school)
            .collect();

        pool.sort_by(|left, right| {
            left.distance_km
                .cmp(&right.distance_km)
                .then_with(|| left.school_id.cmp(&right.school_id))
        });
        pool
    }

    /// Supervisors below the limit, least loaded first, then by name.
    fn rotation(
        &self,
        supervisors: Vec<SupervisorProfile>,
        active: &[Posting],
    ) -> Vec<RotationEntry> {
        let mut load: HashMap<&SupervisorId, usize> = HashMap::new();
        for posting in active.iter().filter(|posting| posting.counts_toward_capacity()) {
            *load.entry(&posting.supervisor_id).or_default() += 1;
        }

        let mut rotation: Vec<RotationEntry> = supervisors
            .into_iter()
            .map(|supervisor| {
                let current = load.get(&supervisor.supervisor_id).copied().unwrap_or(0);
                RotationEntry {
                    supervisor,
                    load: current,
                }
            })
            .filter(|entry| entry.load < self.max_per_supervisor as usize)
            .collect();

        rotation.sort_by(|left, right| match left.load.cmp(&right.load) {
            Ordering::Equal => {
                let (left, right) = (&left.supervisor, &right.supervisor);
                left.name
                    .cmp(&right.name)
                    .then_with(|| left.supervisor_id.cmp(&right.supervisor_id))
            }
            other => other,
        });
        rotation
    }

    /// Ordered supervisor pool as it stands before any assignment is made.
    pub fn supervisor_pool(
        &self,
        supervisors: Vec<SupervisorProfile>,
        active: &[Posting],
    ) -> Vec<SupervisorProfile> {
        self.rotation(supervisors, active)
            .into_iter()
            .map(|entry| entry.supervisor)
            .collect()
    }

    /// Walk the school pool, handing each school to the supervisor under the cursor.
    ///
    /// `place` persists one posting. A school rejected for reasons other than the
    /// supervisor's capacity is skipped without consuming the supervisor's turn.
    pub fn assign<F>(
        &self,
        schools: Vec<SchoolLink>,
        supervisors: Vec<SupervisorProfile>,
        active: &[Posting],
        mut place: F,
    ) -> AutoPostReport
    where
        F: FnMut(&SchoolLink, &SupervisorProfile) -> Result<PostingOutcome, PostingServiceError>,
    {
        let mut rotation = self.rotation(supervisors, active);
        let mut report = AutoPostReport::default();
        let mut cursor = 0usize;
        let mut schools = schools.into_iter();

        while let Some(school) = schools.next() {
            let reason = loop {
                if rotation.is_empty() {
                    break Some(SkipReason::NoSupervisorCapacity);
                }
                cursor %= rotation.len();

                match place(&school, &rotation[cursor].supervisor) {
                    Ok(outcome) => {
                        report.successful.push(outcome);
                        let entry = &mut rotation[cursor];
                        entry.load += 1;
                        if entry.load >= self.max_per_supervisor as usize {
                            rotation.remove(cursor);
                        } else {
                            cursor = (cursor + 1) % rotation.len();
                        }
                        break None;
                    }
                    Err(PostingServiceError::Validation(violations))
                        if violations.iter().all(PostingViolation::is_capacity_exceeded) =>
                    {
                        rotation.remove(cursor);
                    }
                    Err(PostingServiceError::Validation(violations)) => {
                        break Some(SkipReason::Rejected { violations });
                    }
                    Err(err) => {
                        break Some(SkipReason::Failed {
                            failure: PostingFailure::from(err),
                        });
                    }
                }
            };

            if let Some(reason) = reason {
                report.skipped.push(AutoPostSkip {
                    school_id: school.school_id.clone(),
                    school_name: school.name.clone(),
                    reason,
                });
            }

            if rotation.is_empty() {
                report.skipped.extend(schools.by_ref().map(|school| AutoPostSkip {
                    school_id: school.school_id,
                    school_name: school.name,
                    reason: SkipReason::NoSupervisorCapacity,
                }));
            }
        }

        report
    }
}
