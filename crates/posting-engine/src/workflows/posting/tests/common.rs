use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use crate::workflows::posting::domain::{
    AllowanceBreakdown, InstitutionId, MergedGroup, NewPosting, OtherAllowance, Posting,
    PostingId, PostingRequest, PostingSlot, Rank, SchoolId, SchoolLink, SessionConfig, SessionId,
    SessionThresholds, SupervisorId, SupervisorProfile,
};
use crate::workflows::posting::memory::{InMemoryPostingStore, InMemoryReferenceData};
use crate::workflows::posting::repository::{PostingRepository, RepositoryError};
use crate::workflows::posting::service::PostingService;
use crate::workflows::posting::AllowanceCalculator;

pub(super) type MemoryService = PostingService<InMemoryPostingStore, InMemoryReferenceData>;

pub(super) fn institution() -> InstitutionId {
    InstitutionId::new("inst-unilag")
}

pub(super) fn session_id() -> SessionId {
    SessionId::new("tp-2025")
}

pub(super) fn thresholds() -> SessionThresholds {
    SessionThresholds {
        inside_threshold_km: dec!(10),
        dsa_enabled: true,
        dsa_min_km: dec!(11),
        dsa_max_km: dec!(30),
        dsa_percentage: dec!(50),
    }
}

pub(super) fn session_config() -> SessionConfig {
    SessionConfig {
        session_id: session_id(),
        name: "2025 Teaching Practice".to_string(),
        thresholds: thresholds(),
        max_postings_per_supervisor: 3,
        max_visits: 3,
    }
}

pub(super) fn lecturer_rank() -> Rank {
    Rank {
        rank_id: "lecturer-1".to_string(),
        name: "Lecturer I".to_string(),
        local_running_rate: dec!(200),
        transport_per_km: dec!(50),
        dta_rate: dec!(1000),
        tetfund_rate: dec!(300),
        dsa_percentage: None,
        other_allowances: vec![OtherAllowance {
            name: "research".to_string(),
            amount: dec!(150),
        }],
    }
}

pub(super) fn supervisor(id: &str, name: &str) -> SupervisorProfile {
    SupervisorProfile {
        supervisor_id: SupervisorId::new(id),
        name: name.to_string(),
        rank: lecturer_rank(),
    }
}

pub(super) fn adaeze() -> SupervisorProfile {
    supervisor("sup-1", "Adaeze Okafor")
}

pub(super) fn bello() -> SupervisorProfile {
    supervisor("sup-2", "Bello Musa")
}

pub(super) fn school(id: &str, name: &str, distance_km: Decimal) -> SchoolLink {
    SchoolLink {
        school_id: SchoolId::new(id),
        name: name.to_string(),
        distance_km,
        route_id: None,
        location: None,
    }
}

pub(super) fn on_route(mut link: SchoolLink, route: &str) -> SchoolLink {
    link.route_id = Some(route.to_string());
    link
}

pub(super) fn merged(
    primary: &str,
    primary_group: u32,
    secondary: &str,
    secondary_group: u32,
) -> MergedGroup {
    MergedGroup {
        session_id: session_id(),
        primary_school: SchoolId::new(primary),
        primary_group,
        secondary_school: SchoolId::new(secondary),
        secondary_group,
        active: true,
    }
}

/// Catalog used by most tests:
/// - school-a (5 km, inside) group 1, merged into school-b group 2
/// - school-b (20 km, DSA band) group 2
/// - school-c (40 km, outside band) group 1
/// - school-x (12 km) group 3
pub(super) fn reference_data() -> InMemoryReferenceData {
    let inst = institution();
    let session = session_id();
    InMemoryReferenceData::default()
        .with_session(&inst, session_config())
        .with_supervisor(&inst, adaeze())
        .with_supervisor(&inst, bello())
        .with_school(&inst, school("school-a", "Akoka High School", dec!(5)))
        .with_school(&inst, school("school-b", "Bariga Grammar School", dec!(20)))
        .with_school(&inst, school("school-c", "Badagry Model College", dec!(40)))
        .with_school(&inst, school("school-x", "Yaba Comprehensive", dec!(12)))
        .with_approved_students(&inst, &session, &SchoolId::new("school-a"), 1, 4)
        .with_approved_students(&inst, &session, &SchoolId::new("school-b"), 2, 3)
        .with_approved_students(&inst, &session, &SchoolId::new("school-c"), 1, 2)
        .with_approved_students(&inst, &session, &SchoolId::new("school-x"), 3, 5)
        .with_merged_group(&inst, merged("school-a", 1, "school-b", 2))
}

pub(super) fn build_service_with(
    reference: InMemoryReferenceData,
) -> (Arc<MemoryService>, InMemoryPostingStore) {
    let store = InMemoryPostingStore::default();
    let service = PostingService::new(institution(), Arc::new(store.clone()), Arc::new(reference));
    (Arc::new(service), store)
}

pub(super) fn build_service() -> (Arc<MemoryService>, InMemoryPostingStore) {
    build_service_with(reference_data())
}

pub(super) fn request(supervisor: &str, school: &str, group: u32, visit: u32) -> PostingRequest {
    PostingRequest {
        supervisor_id: SupervisorId::new(supervisor),
        school_id: SchoolId::new(school),
        group,
        visit,
        notes: None,
    }
}

pub(super) fn slot(school: &str, group: u32, visit: u32) -> PostingSlot {
    PostingSlot {
        institution_id: institution(),
        session_id: session_id(),
        school_id: SchoolId::new(school),
        group,
        visit,
    }
}

pub(super) fn priced(rank: &Rank, distance_km: Decimal) -> AllowanceBreakdown {
    AllowanceCalculator::new(thresholds()).compute(rank, distance_km, false)
}

/// Primary posting built in memory, bypassing the service.
pub(super) fn primary_posting(
    id: u64,
    profile: &SupervisorProfile,
    school: &str,
    visit: u32,
    distance_km: Decimal,
) -> Posting {
    let allowance = priced(&profile.rank, distance_km);
    let posted_at = Utc
        .with_ymd_and_hms(2025, 3, 10, 9, 0, 0)
        .single()
        .expect("valid timestamp");
    NewPosting::primary(slot(school, 1, visit), profile, allowance, None, posted_at)
        .into_posting(PostingId(id))
}

/// Store a primary posting directly, skipping validation.
pub(super) fn seed_posting(
    store: &InMemoryPostingStore,
    profile: &SupervisorProfile,
    school: &str,
    group: u32,
    visit: u32,
) -> Posting {
    let draft = NewPosting::primary(
        slot(school, group, visit),
        profile,
        priced(&profile.rank, dec!(5)),
        None,
        Utc::now(),
    );
    store.insert(draft).expect("seed insert succeeds")
}

pub(super) struct UnavailableRepository;

impl PostingRepository for UnavailableRepository {
    fn insert(&self, _posting: NewPosting) -> Result<Posting, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".into()))
    }

    fn update(&self, _posting: Posting) -> Result<Posting, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".into()))
    }

    fn fetch(
        &self,
        _institution: &InstitutionId,
        _id: PostingId,
    ) -> Result<Option<Posting>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".into()))
    }

    fn active_in_slot(&self, _slot: &PostingSlot) -> Result<Option<Posting>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".into()))
    }

    fn session_postings(
        &self,
        _institution: &InstitutionId,
        _session: &SessionId,
    ) -> Result<Vec<Posting>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".into()))
    }
}

/// Lets a rival writer claim the slot right after validation, once.
#[derive(Default)]
pub(super) struct RacingRepository {
    pub(super) inner: InMemoryPostingStore,
    raced: AtomicBool,
}

impl PostingRepository for RacingRepository {
    fn insert(&self, posting: NewPosting) -> Result<Posting, RepositoryError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let mut rival = posting.clone();
            rival.supervisor_id = SupervisorId::new("sup-rival");
            self.inner.insert(rival)?;
        }
        self.inner.insert(posting)
    }

    fn update(&self, posting: Posting) -> Result<Posting, RepositoryError> {
        self.inner.update(posting)
    }

    fn fetch(
        &self,
        institution: &InstitutionId,
        id: PostingId,
    ) -> Result<Option<Posting>, RepositoryError> {
        self.inner.fetch(institution, id)
    }

    fn active_in_slot(&self, slot: &PostingSlot) -> Result<Option<Posting>, RepositoryError> {
        self.inner.active_in_slot(slot)
    }

    fn session_postings(
        &self,
        institution: &InstitutionId,
        session: &SessionId,
    ) -> Result<Vec<Posting>, RepositoryError> {
        self.inner.session_postings(institution, session)
    }
}

pub(super) async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("body is json")
}
