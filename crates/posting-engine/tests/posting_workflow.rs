//! End-to-end posting scenarios driven through the public service facade and HTTP router,
//! including concurrent writers contending for one slot.

mod common {
    use std::sync::Arc;

    use rust_decimal_macros::dec;

    use posting_engine::workflows::posting::{
        InMemoryPostingStore, InMemoryReferenceData, InstitutionId, MergedGroup, OtherAllowance,
        PostingRequest, PostingService, Rank, SchoolId, SchoolLink, SessionConfig, SessionId,
        SessionThresholds, SupervisorId, SupervisorProfile,
    };

    pub(super) type Service = PostingService<InMemoryPostingStore, InMemoryReferenceData>;

    pub(super) fn institution() -> InstitutionId {
        InstitutionId::new("inst-oau")
    }

    pub(super) fn session() -> SessionId {
        SessionId::new("tp-2026")
    }

    fn rank() -> Rank {
        Rank {
            rank_id: "senior-lecturer".to_string(),
            name: "Senior Lecturer".to_string(),
            local_running_rate: dec!(250),
            transport_per_km: dec!(50),
            dta_rate: dec!(1000),
            tetfund_rate: dec!(700),
            dsa_percentage: None,
            other_allowances: vec![OtherAllowance {
                name: "project supervision".to_string(),
                amount: dec!(120),
            }],
        }
    }

    fn supervisor(id: &str, name: &str) -> SupervisorProfile {
        SupervisorProfile {
            supervisor_id: SupervisorId::new(id),
            name: name.to_string(),
            rank: rank(),
        }
    }

    fn school(id: &str, name: &str, distance_km: rust_decimal::Decimal) -> SchoolLink {
        SchoolLink {
            school_id: SchoolId::new(id),
            name: name.to_string(),
            distance_km,
            route_id: None,
            location: None,
        }
    }

    pub(super) fn build() -> (Arc<Service>, InMemoryPostingStore) {
        let inst = institution();
        let session = session();
        let reference = InMemoryReferenceData::default()
            .with_session(
                &inst,
                SessionConfig {
                    session_id: session.clone(),
                    name: "2026 Teaching Practice".to_string(),
                    thresholds: SessionThresholds {
                        inside_threshold_km: dec!(10),
                        dsa_enabled: true,
                        dsa_min_km: dec!(11),
                        dsa_max_km: dec!(30),
                        dsa_percentage: dec!(50),
                    },
                    max_postings_per_supervisor: 4,
                    max_visits: 3,
                },
            )
            .with_supervisor(&inst, supervisor("sup-a", "Abimbola Ade"))
            .with_supervisor(&inst, supervisor("sup-b", "Chinedu Eze"))
            .with_supervisor(&inst, supervisor("sup-c", "Fatima Sani"))
            .with_school(&inst, school("school-a", "Ife Grammar School", dec!(6)))
            .with_school(&inst, school("school-b", "Modakeke High School", dec!(24)))
            .with_school(&inst, school("school-x", "Ilesa Grammar School", dec!(38)))
            .with_approved_students(&inst, &session, &SchoolId::new("school-a"), 1, 6)
            .with_approved_students(&inst, &session, &SchoolId::new("school-b"), 2, 2)
            .with_approved_students(&inst, &session, &SchoolId::new("school-x"), 3, 4)
            .with_merged_group(
                &inst,
                MergedGroup {
                    session_id: session,
                    primary_school: SchoolId::new("school-a"),
                    primary_group: 1,
                    secondary_school: SchoolId::new("school-b"),
                    secondary_group: 2,
                    active: true,
                },
            );

        let store = InMemoryPostingStore::default();
        let service = PostingService::new(inst, Arc::new(store.clone()), Arc::new(reference));
        (Arc::new(service), store)
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
}

use std::sync::{Arc, Barrier};
use std::thread;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use rust_decimal_macros::dec;
use tower::ServiceExt;

use common::*;
use posting_engine::workflows::posting::{
    posting_router, PostingId, PostingRepository, PostingServiceError, PostingStatus,
};

fn race_for_slot(
    service: &Arc<Service>,
    contenders: &[&str],
) -> Vec<Result<u64, PostingServiceError>> {
    let barrier = Arc::new(Barrier::new(contenders.len()));
    let handles: Vec<_> = contenders
        .iter()
        .map(|supervisor| {
            let service = Arc::clone(service);
            let barrier = Arc::clone(&barrier);
            let supervisor = supervisor.to_string();
            thread::spawn(move || {
                barrier.wait();
                service
                    .create_posting(&session(), request(&supervisor, "school-x", 3, 1))
                    .map(|outcome| outcome.posting.id.0)
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|handle| handle.join().expect("contender thread completes"))
        .collect()
}

#[test]
fn concurrent_creates_yield_one_winner_then_cancel_reopens_slot() {
    let (service, store) = build();

    let results = race_for_slot(&service, &["sup-a", "sup-b"]);

    let winners: Vec<u64> = results
        .iter()
        .filter_map(|result| result.as_ref().ok().copied())
        .collect();
    assert_eq!(winners.len(), 1, "results: {results:?}");
    let loser = results
        .iter()
        .find_map(|result| result.as_ref().err())
        .expect("one contender loses");
    assert!(loser.is_slot_conflict(), "unexpected failure: {loser}");

    let active: Vec<_> = store
        .active_for_session(&institution(), &session())
        .expect("listing runs");
    assert_eq!(active.len(), 1);

    let winner = PostingId(winners[0]);
    let cancelled = service.cancel_posting(winner).expect("cancel succeeds");
    assert_eq!(cancelled.status, PostingStatus::Cancelled);

    let third = service
        .create_posting(&session(), request("sup-c", "school-x", 3, 1))
        .expect("slot free after cancellation");
    assert_ne!(third.posting.id, winner);
    assert_eq!(third.posting.allowance.total, dec!(3600));
}

#[test]
fn many_contenders_never_double_book() {
    let (service, store) = build();

    for _ in 0..8 {
        let results = race_for_slot(&service, &["sup-a", "sup-b", "sup-c"]);
        let winners = results.iter().filter(|result| result.is_ok()).count();
        let active = store
            .active_for_session(&institution(), &session())
            .expect("listing runs");
        assert!(winners <= 1);
        assert_eq!(active.len(), 1);

        if let Some(posting) = active.first() {
            service.cancel_posting(posting.id).expect("cancel succeeds");
        }
    }
}

#[tokio::test]
async fn merged_group_and_summary_through_router() {
    let (service, _) = build();
    let app = posting_router(service);

    for visit in 1..=3 {
        let body = serde_json::json!({
            "supervisor_id": "sup-a",
            "school_id": "school-a",
            "group": 1,
            "visit": visit,
        });
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/v1/sessions/tp-2026/postings")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request builds"),
            )
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .oneshot(
            Request::get("/api/v1/sessions/tp-2026/postings/statistics")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let stats: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
    assert_eq!(stats["primary_postings"], 3);
    assert_eq!(stats["secondary_postings"], 3);
    assert_eq!(stats["inside_postings"], 3);
    assert_eq!(stats["outside_postings"], 3);
    assert_eq!(stats["unique_schools"], 2);
}
