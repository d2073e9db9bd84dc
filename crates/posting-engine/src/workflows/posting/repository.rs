use super::domain::{
    InstitutionId, MergedGroup, NewPosting, Posting, PostingId, PostingSlot, SchoolId,
    SchoolLink, SessionConfig, SessionId, SupervisorId, SupervisorProfile,
};

/// Storage abstraction for postings so the service can be exercised in isolation.
///
/// Slot uniqueness lives here, not in the validator: `insert` and `update` must refuse to
/// leave two active postings on one [`PostingSlot`] and report [`RepositoryError::Conflict`]
/// instead. Reads must never serve a cached view of slot occupancy.
pub trait PostingRepository: Send + Sync {
    fn insert(&self, posting: NewPosting) -> Result<Posting, RepositoryError>;
    fn update(&self, posting: Posting) -> Result<Posting, RepositoryError>;
    fn fetch(
        &self,
        institution: &InstitutionId,
        id: PostingId,
    ) -> Result<Option<Posting>, RepositoryError>;
    fn active_in_slot(&self, slot: &PostingSlot) -> Result<Option<Posting>, RepositoryError>;
    /// Every posting of the session regardless of status, ordered by identifier.
    fn session_postings(
        &self,
        institution: &InstitutionId,
        session: &SessionId,
    ) -> Result<Vec<Posting>, RepositoryError>;

    fn active_for_session(
        &self,
        institution: &InstitutionId,
        session: &SessionId,
    ) -> Result<Vec<Posting>, RepositoryError> {
        Ok(self
            .session_postings(institution, session)?
            .into_iter()
            .filter(Posting::is_active)
            .collect())
    }

    fn active_primary_count(
        &self,
        institution: &InstitutionId,
        session: &SessionId,
        supervisor: &SupervisorId,
    ) -> Result<usize, RepositoryError> {
        Ok(self
            .session_postings(institution, session)?
            .iter()
            .filter(|posting| {
                posting.counts_toward_capacity() && &posting.supervisor_id == supervisor
            })
            .count())
    }
}

/// Read-only reference data owned by the surrounding platform (rank cards, school links,
/// session settings, student acceptances, merged groups).
pub trait ReferenceData: Send + Sync {
    fn session(
        &self,
        institution: &InstitutionId,
        session: &SessionId,
    ) -> Result<Option<SessionConfig>, RepositoryError>;
    fn supervisor(
        &self,
        institution: &InstitutionId,
        supervisor: &SupervisorId,
    ) -> Result<Option<SupervisorProfile>, RepositoryError>;
    fn supervisors(
        &self,
        institution: &InstitutionId,
    ) -> Result<Vec<SupervisorProfile>, RepositoryError>;
    fn school(
        &self,
        institution: &InstitutionId,
        school: &SchoolId,
    ) -> Result<Option<SchoolLink>, RepositoryError>;
    fn schools(&self, institution: &InstitutionId) -> Result<Vec<SchoolLink>, RepositoryError>;
    /// Approved student acceptances for a school in a session, optionally narrowed to a group.
    fn approved_acceptances(
        &self,
        institution: &InstitutionId,
        session: &SessionId,
        school: &SchoolId,
        group: Option<u32>,
    ) -> Result<usize, RepositoryError>;
    /// Merged-group links whose primary side is `(school, group)`; may include inactive links.
    fn merged_groups(
        &self,
        institution: &InstitutionId,
        session: &SessionId,
        school: &SchoolId,
        group: u32,
    ) -> Result<Vec<MergedGroup>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("slot already held by an active posting")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
