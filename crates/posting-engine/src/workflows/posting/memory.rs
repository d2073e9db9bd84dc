//! In-process storage adapters used by the service binary, demos, and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    InstitutionId, MergedGroup, NewPosting, Posting, PostingId, PostingSlot, SchoolId,
    SchoolLink, SessionConfig, SessionId, SupervisorId, SupervisorProfile,
};
use super::repository::{PostingRepository, ReferenceData, RepositoryError};

#[derive(Debug, Default)]
struct PostingLedger {
    postings: BTreeMap<PostingId, Posting>,
    active_slots: HashMap<PostingSlot, PostingId>,
    last_id: u64,
}

/// Posting store whose slot index plays the role of a unique constraint over
/// (institution, session, school, group, visit) for active rows.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPostingStore {
    ledger: Arc<Mutex<PostingLedger>>,
}

impl InMemoryPostingStore {
    fn ledger(&self) -> Result<MutexGuard<'_, PostingLedger>, RepositoryError> {
        self.ledger
            .lock()
            .map_err(|_| RepositoryError::Unavailable("posting ledger lock poisoned".to_string()))
    }

    /// All stored postings across institutions, ordered by identifier.
    pub fn snapshot(&self) -> Result<Vec<Posting>, RepositoryError> {
        Ok(self.ledger()?.postings.values().cloned().collect())
    }
}

impl PostingRepository for InMemoryPostingStore {
    fn insert(&self, posting: NewPosting) -> Result<Posting, RepositoryError> {
        let mut guard = self.ledger()?;
        let ledger = &mut *guard;
        if ledger.active_slots.contains_key(&posting.slot) {
            return Err(RepositoryError::Conflict);
        }

        ledger.last_id += 1;
        let id = PostingId(ledger.last_id);
        let record = posting.into_posting(id);
        ledger.active_slots.insert(record.slot.clone(), id);
        ledger.postings.insert(id, record.clone());
        Ok(record)
    }

    fn update(&self, posting: Posting) -> Result<Posting, RepositoryError> {
        let mut guard = self.ledger()?;
        let ledger = &mut *guard;
        let existing = ledger
            .postings
            .get(&posting.id)
            .ok_or(RepositoryError::NotFound)?;

        if posting.is_active() {
            if let Some(holder) = ledger.active_slots.get(&posting.slot) {
                if *holder != posting.id {
                    return Err(RepositoryError::Conflict);
                }
            }
        }

        if existing.is_active() && ledger.active_slots.get(&existing.slot) == Some(&posting.id) {
            ledger.active_slots.remove(&existing.slot);
        }
        if posting.is_active() {
            ledger.active_slots.insert(posting.slot.clone(), posting.id);
        }
        ledger.postings.insert(posting.id, posting.clone());
        Ok(posting)
    }

    fn fetch(
        &self,
        institution: &InstitutionId,
        id: PostingId,
    ) -> Result<Option<Posting>, RepositoryError> {
        let ledger = self.ledger()?;
        Ok(ledger
            .postings
            .get(&id)
            .filter(|posting| &posting.slot.institution_id == institution)
            .cloned())
    }

    fn active_in_slot(&self, slot: &PostingSlot) -> Result<Option<Posting>, RepositoryError> {
        let ledger = self.ledger()?;
        Ok(ledger
            .active_slots
            .get(slot)
            .and_then(|id| ledger.postings.get(id))
            .cloned())
    }

    fn session_postings(
        &self,
        institution: &InstitutionId,
        session: &SessionId,
    ) -> Result<Vec<Posting>, RepositoryError> {
        let ledger = self.ledger()?;
        Ok(ledger
            .postings
            .values()
            .filter(|posting| {
                &posting.slot.institution_id == institution && &posting.slot.session_id == session
            })
            .cloned()
            .collect())
    }
}

/// Static reference catalog assembled up front and shared read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct InMemoryReferenceData {
    sessions: HashMap<(InstitutionId, SessionId), SessionConfig>,
    supervisors: BTreeMap<(InstitutionId, SupervisorId), SupervisorProfile>,
    schools: BTreeMap<(InstitutionId, SchoolId), SchoolLink>,
    acceptances: HashMap<(InstitutionId, SessionId, SchoolId, u32), usize>,
    merged_groups: Vec<(InstitutionId, MergedGroup)>,
}

impl InMemoryReferenceData {
    pub fn with_session(mut self, institution: &InstitutionId, session: SessionConfig) -> Self {
        self.sessions
            .insert((institution.clone(), session.session_id.clone()), session);
        self
    }

    pub fn with_supervisor(
        mut self,
        institution: &InstitutionId,
        supervisor: SupervisorProfile,
    ) -> Self {
        self.supervisors.insert(
            (institution.clone(), supervisor.supervisor_id.clone()),
            supervisor,
        );
        self
    }

    pub fn with_school(mut self, institution: &InstitutionId, school: SchoolLink) -> Self {
        self.schools
            .insert((institution.clone(), school.school_id.clone()), school);
        self
    }

    /// Record `students` approved acceptances for a school group.
    pub fn with_approved_students(
        mut self,
        institution: &InstitutionId,
        session: &SessionId,
        school: &SchoolId,
        group: u32,
        students: usize,
    ) -> Self {
        *self
            .acceptances
            .entry((institution.clone(), session.clone(), school.clone(), group))
            .or_default() += students;
        self
    }

    pub fn with_merged_group(mut self, institution: &InstitutionId, link: MergedGroup) -> Self {
        self.merged_groups.push((institution.clone(), link));
        self
    }
}

impl ReferenceData for InMemoryReferenceData {
    fn session(
        &self,
        institution: &InstitutionId,
        session: &SessionId,
    ) -> Result<Option<SessionConfig>, RepositoryError> {
        Ok(self
            .sessions
            .get(&(institution.clone(), session.clone()))
            .cloned())
    }

    fn supervisor(
        &self,
        institution: &InstitutionId,
        supervisor: &SupervisorId,
    ) -> Result<Option<SupervisorProfile>, RepositoryError> {
        Ok(self
            .supervisors
            .get(&(institution.clone(), supervisor.clone()))
            .cloned())
    }

    fn supervisors(
        &self,
        institution: &InstitutionId,
    ) -> Result<Vec<SupervisorProfile>, RepositoryError> {
        Ok(self
            .supervisors
            .iter()
            .filter(|((owner, _), _)| owner == institution)
            .map(|(_, profile)| profile.clone())
            .collect())
    }

    fn school(
        &self,
        institution: &InstitutionId,
        school: &SchoolId,
    ) -> Result<Option<SchoolLink>, RepositoryError> {
        Ok(self
            .schools
            .get(&(institution.clone(), school.clone()))
            .cloned())
    }

    fn schools(&self, institution: &InstitutionId) -> Result<Vec<SchoolLink>, RepositoryError> {
        Ok(self
            .schools
            .iter()
            .filter(|((owner, _), _)| owner == institution)
            .map(|(_, school)| school.clone())
            .collect())
    }

    fn approved_acceptances(
        &self,
        institution: &InstitutionId,
        session: &SessionId,
        school: &SchoolId,
        group: Option<u32>,
    ) -> Result<usize, RepositoryError> {
        Ok(self
            .acceptances
            .iter()
            .filter(|((owner, session_id, school_id, group_number), _)| {
                owner == institution
                    && session_id == session
                    && school_id == school
                    && group.map_or(true, |wanted| wanted == *group_number)
            })
            .map(|(_, students)| *students)
            .sum())
    }

    fn merged_groups(
        &self,
        institution: &InstitutionId,
        session: &SessionId,
        school: &SchoolId,
        group: u32,
    ) -> Result<Vec<MergedGroup>, RepositoryError> {
        Ok(self
            .merged_groups
            .iter()
            .filter(|(owner, link)| {
                owner == institution
                    && &link.session_id == session
                    && &link.primary_school == school
                    && link.primary_group == group
            })
            .map(|(_, link)| link.clone())
            .collect())
    }
}
