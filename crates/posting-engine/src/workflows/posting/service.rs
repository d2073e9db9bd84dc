use std::fmt;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::aggregate::{AllowanceSummary, PostingAggregator, PostingStatistics};
use super::allowance::AllowanceCalculator;
use super::auto_post::{
    AutoPostAssigner, AutoPostReport, AutoPostRequest, SchoolCandidate, AUTO_POST_GROUP,
    AUTO_POST_VISIT,
};
use super::domain::{
    InstitutionId, NewPosting, Posting, PostingFilter, PostingId, PostingRequest, PostingSlot,
    PostingUpdate, SchoolLink, SessionConfig, SessionId, SupervisorProfile,
};
use super::propagation::{MergedGroupPropagator, PropagationFailure, PropagationReport};
use super::repository::{PostingRepository, ReferenceData, RepositoryError};
use super::validation::{visit_violation, PostingValidator, PostingViolation};

/// A stored primary posting together with the dependents its merged groups produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingOutcome {
    pub posting: Posting,
    pub dependents: Vec<Posting>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub propagation_failures: Vec<PropagationFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkPostingReport {
    pub successful: Vec<PostingOutcome>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiPostingReport {
    pub successful: Vec<Posting>,
    pub failed: Vec<BatchFailure>,
    pub dependent_postings: Vec<Posting>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub propagation_failures: Vec<PropagationFailure>,
}

/// One rejected item of a batch, keyed by its position in the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub index: usize,
    pub request: PostingRequest,
    pub failure: PostingFailure,
}

/// Serializable form of [`PostingServiceError`] for batch reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostingFailure {
    Rejected { violations: Vec<PostingViolation> },
    NotFound { entity: EntityKind, id: String },
    Conflict { slot: PostingSlot },
    Cancelled { posting_id: PostingId },
    Unavailable { message: String },
}

impl From<PostingServiceError> for PostingFailure {
    fn from(value: PostingServiceError) -> Self {
        match value {
            PostingServiceError::Validation(violations) => Self::Rejected { violations },
            PostingServiceError::NotFound { entity, id } => Self::NotFound { entity, id },
            PostingServiceError::Conflict(slot) => Self::Conflict { slot },
            PostingServiceError::Cancelled(posting_id) => Self::Cancelled { posting_id },
            PostingServiceError::Repository(err) => Self::Unavailable {
                message: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Session,
    Supervisor,
    School,
    Posting,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::Session => "session",
            EntityKind::Supervisor => "supervisor",
            EntityKind::School => "school",
            EntityKind::Posting => "posting",
        };
        f.write_str(label)
    }
}

/// Service composing validation, pricing, persistence, and merged-group propagation for a
/// single institution.
pub struct PostingService<R, D> {
    institution: InstitutionId,
    postings: Arc<R>,
    reference: Arc<D>,
    auto_post_limit: Option<u32>,
}

impl<R, D> PostingService<R, D>
where
    R: PostingRepository + 'static,
    D: ReferenceData + 'static,
{
    pub fn new(institution: InstitutionId, postings: Arc<R>, reference: Arc<D>) -> Self {
        Self {
            institution,
            postings,
            reference,
            auto_post_limit: None,
        }
    }

    /// Default per-supervisor limit for auto-posting when a request does not name one.
    pub fn with_auto_post_limit(mut self, limit: Option<u32>) -> Self {
        self.auto_post_limit = limit;
        self
    }

    pub fn institution(&self) -> &InstitutionId {
        &self.institution
    }

    fn validator(&self) -> PostingValidator<'_, R, D> {
        PostingValidator::new(self.postings.as_ref(), self.reference.as_ref())
    }

    fn propagator(&self) -> MergedGroupPropagator<'_, R, D> {
        MergedGroupPropagator::new(self.postings.as_ref(), self.reference.as_ref())
    }

    fn session_config(&self, session: &SessionId) -> Result<SessionConfig, PostingServiceError> {
        self.reference
            .session(&self.institution, session)?
            .ok_or_else(|| PostingServiceError::not_found(EntityKind::Session, session))
    }

    fn supervisor(
        &self,
        request: &PostingRequest,
    ) -> Result<SupervisorProfile, PostingServiceError> {
        self.reference
            .supervisor(&self.institution, &request.supervisor_id)?
            .ok_or_else(|| {
                PostingServiceError::not_found(EntityKind::Supervisor, &request.supervisor_id)
            })
    }

    fn school(&self, request: &PostingRequest) -> Result<SchoolLink, PostingServiceError> {
        self.reference
            .school(&self.institution, &request.school_id)?
            .ok_or_else(|| PostingServiceError::not_found(EntityKind::School, &request.school_id))
    }

    fn slot_for(&self, session: &SessionId, request: &PostingRequest) -> PostingSlot {
        PostingSlot {
            institution_id: self.institution.clone(),
            session_id: session.clone(),
            school_id: request.school_id.clone(),
            group: request.group,
            visit: request.visit,
        }
    }

    fn load_posting(&self, id: PostingId) -> Result<Posting, PostingServiceError> {
        self.postings
            .fetch(&self.institution, id)?
            .ok_or_else(|| PostingServiceError::not_found(EntityKind::Posting, id))
    }

    /// Every violation that would block `request`, without persisting anything.
    pub fn validate_posting(
        &self,
        session: &SessionId,
        request: &PostingRequest,
    ) -> Result<Vec<PostingViolation>, PostingServiceError> {
        let config = self.session_config(session)?;
        let supervisor = self.supervisor(request)?;
        let school = self.school(request)?;
        let slot = self.slot_for(session, request);
        Ok(self.validator().validate(&config, &slot, &supervisor, &school)?)
    }

    /// Create one primary posting and its merged-group dependents.
    pub fn create_posting(
        &self,
        session: &SessionId,
        request: PostingRequest,
    ) -> Result<PostingOutcome, PostingServiceError> {
        let config = self.session_config(session)?;
        self.place_request(&config, request)
    }

    fn place_request(
        &self,
        config: &SessionConfig,
        request: PostingRequest,
    ) -> Result<PostingOutcome, PostingServiceError> {
        let supervisor = self.supervisor(&request)?;
        let school = self.school(&request)?;
        let slot = self.slot_for(&config.session_id, &request);
        self.place(config, slot, &supervisor, &school, request.notes)
    }

    fn place(
        &self,
        config: &SessionConfig,
        slot: PostingSlot,
        supervisor: &SupervisorProfile,
        school: &SchoolLink,
        notes: Option<String>,
    ) -> Result<PostingOutcome, PostingServiceError> {
        let violations = self.validator().validate(config, &slot, supervisor, school)?;
        if !violations.is_empty() {
            debug!(
                supervisor = %supervisor.supervisor_id,
                slot = %slot,
                violations = violations.len(),
                "posting rejected by validation"
            );
            return Err(PostingServiceError::Validation(violations));
        }

        let calculator = AllowanceCalculator::new(config.thresholds.clone());
        let allowance = calculator.compute(&supervisor.rank, school.distance_km, false);
        let draft = NewPosting::primary(slot, supervisor, allowance, notes, Utc::now());
        let posting = self.persist(draft)?;

        info!(
            posting_id = %posting.id,
            supervisor = %posting.supervisor_id,
            slot = %posting.slot,
            total = %posting.allowance.total,
            "posting created"
        );

        let PropagationReport {
            created, failures, ..
        } = self.propagator().propagate(&posting, &calculator);
        for failure in &failures {
            warn!(
                posting_id = %posting.id,
                reason = %failure.reason,
                "merged group propagation failed"
            );
        }
        if !created.is_empty() {
            info!(posting_id = %posting.id, dependents = created.len(), "dependent postings created");
        }

        Ok(PostingOutcome {
            posting,
            dependents: created,
            propagation_failures: failures,
        })
    }

    fn persist(&self, draft: NewPosting) -> Result<Posting, PostingServiceError> {
        let slot = draft.slot.clone();
        match self.postings.insert(draft) {
            Ok(posting) => Ok(posting),
            Err(RepositoryError::Conflict) => {
                warn!(slot = %slot, "slot taken between validation and insert");
                Err(PostingServiceError::Conflict(slot))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Best-effort batch: each item succeeds or fails on its own, in input order.
    pub fn bulk_create_postings(
        &self,
        session: &SessionId,
        requests: Vec<PostingRequest>,
    ) -> Result<BulkPostingReport, PostingServiceError> {
        let config = self.session_config(session)?;
        let mut report = BulkPostingReport::default();

        for (index, request) in requests.into_iter().enumerate() {
            match self.place_request(&config, request.clone()) {
                Ok(outcome) => report.successful.push(outcome),
                Err(err) => {
                    warn!(index, error = %err, "bulk posting item failed");
                    report.failed.push(BatchFailure {
                        index,
                        request,
                        failure: err.into(),
                    });
                }
            }
        }

        info!(
            session = %session,
            succeeded = report.successful.len(),
            failed = report.failed.len(),
            "bulk posting finished"
        );
        Ok(report)
    }

    /// Batch create reporting primary and dependent postings as separate lists.
    pub fn create_multi_postings(
        &self,
        session: &SessionId,
        requests: Vec<PostingRequest>,
    ) -> Result<MultiPostingReport, PostingServiceError> {
        let config = self.session_config(session)?;
        let mut report = MultiPostingReport::default();

        for (index, request) in requests.into_iter().enumerate() {
            match self.place_request(&config, request.clone()) {
                Ok(outcome) => {
                    report.successful.push(outcome.posting);
                    report.dependent_postings.extend(outcome.dependents);
                    report
                        .propagation_failures
                        .extend(outcome.propagation_failures);
                }
                Err(err) => {
                    warn!(index, error = %err, "multi posting item failed");
                    report.failed.push(BatchFailure {
                        index,
                        request,
                        failure: err.into(),
                    });
                }
            }
        }

        info!(
            session = %session,
            succeeded = report.successful.len(),
            dependents = report.dependent_postings.len(),
            failed = report.failed.len(),
            "multi posting finished"
        );
        Ok(report)
    }

    /// Round-robin supervisors onto under-supervised schools (group 1, visit 1).
    pub fn auto_assign(
        &self,
        session: &SessionId,
        request: AutoPostRequest,
    ) -> Result<AutoPostReport, PostingServiceError> {
        let config = self.session_config(session)?;
        let max_per_supervisor = request
            .max_per_supervisor
            .or(self.auto_post_limit)
            .unwrap_or(config.max_postings_per_supervisor);
        let assigner = AutoPostAssigner::new(config.max_visits, max_per_supervisor);

        let active = self.postings.active_for_session(&self.institution, session)?;
        let mut candidates = Vec::new();
        for school in self.reference.schools(&self.institution)? {
            let approved_students = self.reference.approved_acceptances(
                &self.institution,
                session,
                &school.school_id,
                None,
            )?;
            candidates.push(SchoolCandidate {
                school,
                approved_students,
            });
        }
        let schools = assigner.school_pool(candidates, &active, request.route_id.as_deref());
        let supervisors = self.reference.supervisors(&self.institution)?;

        debug!(
            session = %session,
            schools = schools.len(),
            max_per_supervisor = assigner.max_per_supervisor(),
            "auto posting pools built"
        );

        let report = assigner.assign(schools, supervisors, &active, |school, supervisor| {
            let slot = PostingSlot {
                institution_id: self.institution.clone(),
                session_id: session.clone(),
                school_id: school.school_id.clone(),
                group: AUTO_POST_GROUP,
                visit: AUTO_POST_VISIT,
            };
            self.place(&config, slot, supervisor, school, None)
        });

        info!(
            session = %session,
            assigned = report.successful.len(),
            skipped = report.skipped.len(),
            "auto posting finished"
        );
        Ok(report)
    }

    /// Flip a posting to cancelled. Cancelling twice is a no-op; dependents are left as is.
    pub fn cancel_posting(&self, id: PostingId) -> Result<Posting, PostingServiceError> {
        let mut posting = self.load_posting(id)?;
        if !posting.is_active() {
            return Ok(posting);
        }

        posting.cancel(Utc::now());
        let posting = self.postings.update(posting)?;
        info!(posting_id = %posting.id, slot = %posting.slot, "posting cancelled");
        Ok(posting)
    }

    /// Change the visit number and/or notes. Cancelled postings accept notes only.
    ///
    /// A primary's active dependents follow it to the new visit. Dependents cannot change
    /// visit on their own.
    pub fn update_posting(
        &self,
        id: PostingId,
        update: PostingUpdate,
    ) -> Result<Posting, PostingServiceError> {
        let mut posting = self.load_posting(id)?;
        let mut followers = Vec::new();

        if let Some(visit) = update.visit.filter(|visit| *visit != posting.slot.visit) {
            if !posting.is_active() {
                return Err(PostingServiceError::Cancelled(id));
            }
            if let Some(primary_posting_id) = posting.merged_with_posting_id {
                return Err(PostingServiceError::Validation(vec![
                    PostingViolation::FollowsPrimary {
                        posting_id: id,
                        primary_posting_id,
                    },
                ]));
            }

            let config = self.session_config(&posting.slot.session_id)?;
            if let Some(violation) = visit_violation(&config, visit) {
                return Err(PostingServiceError::Validation(vec![violation]));
            }

            followers = self.active_dependents(&posting)?;
            let slot = posting.slot.with_visit(visit);
            let mut duplicates = Vec::new();
            duplicates.extend(self.validator().check_slot(&slot)?);
            for dependent in &followers {
                duplicates.extend(self.validator().check_slot(&dependent.slot.with_visit(visit))?);
            }
            if !duplicates.is_empty() {
                return Err(PostingServiceError::Validation(duplicates));
            }
            posting.slot = slot;
        }

        if let Some(notes) = update.notes {
            posting.notes = Some(notes);
        }

        let slot = posting.slot.clone();
        let posting = match self.postings.update(posting) {
            Ok(posting) => posting,
            Err(RepositoryError::Conflict) => return Err(PostingServiceError::Conflict(slot)),
            Err(err) => return Err(err.into()),
        };

        for dependent in followers {
            self.follow_primary(&posting, dependent)?;
        }
        Ok(posting)
    }

    fn active_dependents(&self, primary: &Posting) -> Result<Vec<Posting>, PostingServiceError> {
        Ok(self
            .postings
            .session_postings(&self.institution, &primary.slot.session_id)?
            .into_iter()
            .filter(|posting| {
                posting.is_active() && posting.merged_with_posting_id == Some(primary.id)
            })
            .collect())
    }

    /// Move a dependent onto its primary's visit. A slot claimed since the pre-check is
    /// already covered, so the dependent is cancelled instead.
    fn follow_primary(
        &self,
        primary: &Posting,
        mut dependent: Posting,
    ) -> Result<(), PostingServiceError> {
        let previous = dependent.clone();
        dependent.slot = dependent.slot.with_visit(primary.slot.visit);
        match self.postings.update(dependent) {
            Ok(moved) => {
                debug!(posting_id = %moved.id, slot = %moved.slot, "dependent posting moved");
                Ok(())
            }
            Err(RepositoryError::Conflict) => {
                let mut stale = previous;
                stale.cancel(Utc::now());
                let stale = self.postings.update(stale)?;
                warn!(
                    posting_id = %stale.id,
                    primary_posting_id = %primary.id,
                    visit = primary.slot.visit,
                    "dependent slot taken during visit change, dependent cancelled"
                );
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn get_posting(&self, id: PostingId) -> Result<Posting, PostingServiceError> {
        self.load_posting(id)
    }

    pub fn list_postings(
        &self,
        session: &SessionId,
        filter: &PostingFilter,
    ) -> Result<Vec<Posting>, PostingServiceError> {
        self.session_config(session)?;
        Ok(self
            .postings
            .session_postings(&self.institution, session)?
            .into_iter()
            .filter(|posting| filter.matches(posting))
            .collect())
    }

    /// Re-run merged-group propagation for an existing primary posting.
    pub fn propagate_merged_groups(
        &self,
        id: PostingId,
    ) -> Result<PropagationReport, PostingServiceError> {
        let posting = self.load_posting(id)?;
        let config = self.session_config(&posting.slot.session_id)?;
        let calculator = AllowanceCalculator::new(config.thresholds);
        Ok(self.propagator().propagate(&posting, &calculator))
    }

    pub fn summarize_allowances(
        &self,
        session: &SessionId,
    ) -> Result<AllowanceSummary, PostingServiceError> {
        self.session_config(session)?;
        let active = self.postings.active_for_session(&self.institution, session)?;
        Ok(PostingAggregator::summarize(session, &active))
    }

    pub fn posting_statistics(
        &self,
        session: &SessionId,
    ) -> Result<PostingStatistics, PostingServiceError> {
        self.session_config(session)?;
        let active = self.postings.active_for_session(&self.institution, session)?;
        Ok(PostingAggregator::statistics(session, &active))
    }
}

/// Error raised by the posting service.
#[derive(Debug, thiserror::Error)]
pub enum PostingServiceError {
    #[error("posting rejected: {}", join_violations(.0))]
    Validation(Vec<PostingViolation>),
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: String },
    #[error("{0} was taken by a concurrent posting")]
    Conflict(PostingSlot),
    #[error("posting {0} is cancelled")]
    Cancelled(PostingId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl PostingServiceError {
    fn not_found(entity: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the outcome means "someone else holds this slot", whichever check caught it.
    pub fn is_slot_conflict(&self) -> bool {
        match self {
            PostingServiceError::Conflict(_) => true,
            PostingServiceError::Validation(violations) => {
                violations.iter().any(PostingViolation::is_duplicate_slot)
            }
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PostingServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PostingServiceError::NotFound { .. }
            | PostingServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            PostingServiceError::Conflict(_)
            | PostingServiceError::Cancelled(_)
            | PostingServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            PostingServiceError::Repository(RepositoryError::Unavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn join_violations(violations: &[PostingViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
