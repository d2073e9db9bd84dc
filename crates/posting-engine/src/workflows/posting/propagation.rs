use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::allowance::AllowanceCalculator;
use super::domain::{NewPosting, Posting, PostingId, PostingSlot, SchoolId};
use super::repository::{PostingRepository, ReferenceData, RepositoryError};

/// Dependent postings produced for one primary posting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropagationReport {
    pub created: Vec<Posting>,
    /// Secondary slots that already had an active posting.
    pub skipped: Vec<PostingSlot>,
    pub failures: Vec<PropagationFailure>,
}

/// A merged-group link that could not be turned into a dependent posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationFailure {
    pub primary_posting_id: PostingId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_school_id: Option<SchoolId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_group: Option<u32>,
    pub reason: String,
}

/// Mirrors a primary posting onto the secondary side of its merged groups.
///
/// Resolution is one hop: secondary groups are never scanned for further merges.
pub struct MergedGroupPropagator<'a, R: ?Sized, D: ?Sized> {
    postings: &'a R,
    reference: &'a D,
}

impl<'a, R, D> MergedGroupPropagator<'a, R, D>
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

    pub fn propagate(
        &self,
        primary: &Posting,
        calculator: &AllowanceCalculator,
    ) -> PropagationReport {
        let mut report = PropagationReport::default();
        if !primary.is_primary || !primary.is_active() {
            return report;
        }

        let slot = &primary.slot;
        let links = match self.reference.merged_groups(
            &slot.institution_id,
            &slot.session_id,
            &slot.school_id,
            slot.group,
        ) {
            Ok(links) => links,
            Err(err) => {
                report.failures.push(PropagationFailure {
                    primary_posting_id: primary.id,
                    secondary_school_id: None,
                    secondary_group: None,
                    reason: format!("merged group lookup failed: {err}"),
                });
                return report;
            }
        };

        for link in links
            .iter()
            .filter(|link| link.session_id == slot.session_id)
            .filter(|link| link.is_anchored_at(&slot.school_id, slot.group))
        {
            let secondary_slot = PostingSlot {
                institution_id: slot.institution_id.clone(),
                session_id: slot.session_id.clone(),
                school_id: link.secondary_school.clone(),
                group: link.secondary_group,
                visit: slot.visit,
            };

            let failure = |reason: String| PropagationFailure {
                primary_posting_id: primary.id,
                secondary_school_id: Some(link.secondary_school.clone()),
                secondary_group: Some(link.secondary_group),
                reason,
            };

            match self.create_dependent(primary, secondary_slot.clone(), calculator) {
                Ok(Some(posting)) => report.created.push(posting),
                Ok(None) => report.skipped.push(secondary_slot),
                Err(DependentError::SchoolNotLinked) => report.failures.push(failure(format!(
                    "school {} is not linked to institution {}",
                    link.secondary_school, slot.institution_id
                ))),
                Err(DependentError::Repository(err)) => {
                    report.failures.push(failure(err.to_string()))
                }
            }
        }

        report
    }

    fn create_dependent(
        &self,
        primary: &Posting,
        slot: PostingSlot,
        calculator: &AllowanceCalculator,
    ) -> Result<Option<Posting>, DependentError> {
        if self.postings.active_in_slot(&slot)?.is_some() {
            return Ok(None);
        }

        let school = self
            .reference
            .school(&slot.institution_id, &slot.school_id)?
            .ok_or(DependentError::SchoolNotLinked)?;

        let allowance = calculator.compute(&primary.rank, school.distance_km, true);
        let draft = NewPosting::dependent_of(primary, slot, allowance, Utc::now());

        match self.postings.insert(draft) {
            Ok(posting) => Ok(Some(posting)),
            // Another writer covered the slot between the check and the insert.
            Err(RepositoryError::Conflict) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

enum DependentError {
    SchoolNotLinked,
    Repository(RepositoryError),
}

impl From<RepositoryError> for DependentError {
    fn from(value: RepositoryError) -> Self {
        Self::Repository(value)
    }
}
