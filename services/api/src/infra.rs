use metrics_exporter_prometheus::PrometheusHandle;
use posting_engine::workflows::posting::{
    GeoPoint, InMemoryReferenceData, InstitutionId, MergedGroup, OtherAllowance, Rank, SchoolId,
    SchoolLink, SessionConfig, SessionId, SessionThresholds, SupervisorId, SupervisorProfile,
};
use rust_decimal::Decimal;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) const DEMO_SESSION: &str = "tp-2025";

pub(crate) fn demo_session() -> SessionConfig {
    SessionConfig {
        session_id: SessionId::new(DEMO_SESSION),
        name: "2025/2026 Teaching Practice".to_string(),
        thresholds: SessionThresholds {
            inside_threshold_km: Decimal::from(10),
            dsa_enabled: true,
            dsa_min_km: Decimal::from(11),
            dsa_max_km: Decimal::from(30),
            dsa_percentage: Decimal::from(50),
        },
        max_postings_per_supervisor: 3,
        max_visits: 3,
    }
}

fn rank(id: &str, name: &str, local_running: i64, per_km: i64, dta: i64, tetfund: i64) -> Rank {
    Rank {
        rank_id: id.to_string(),
        name: name.to_string(),
        local_running_rate: Decimal::from(local_running),
        transport_per_km: Decimal::from(per_km),
        dta_rate: Decimal::from(dta),
        tetfund_rate: Decimal::from(tetfund),
        dsa_percentage: None,
        other_allowances: Vec::new(),
    }
}

fn supervisor(id: &str, name: &str, rank: Rank) -> SupervisorProfile {
    SupervisorProfile {
        supervisor_id: SupervisorId::new(id),
        name: name.to_string(),
        rank,
    }
}

fn school(
    id: &str,
    name: &str,
    distance_km: Decimal,
    route: &str,
    location: (f64, f64),
) -> SchoolLink {
    SchoolLink {
        school_id: SchoolId::new(id),
        name: name.to_string(),
        distance_km,
        route_id: Some(route.to_string()),
        location: Some(GeoPoint {
            latitude: location.0,
            longitude: location.1,
        }),
    }
}

/// Small seeded catalog: three supervisors, five schools on two routes, one merged group.
pub(crate) fn demo_reference_data(institution: &InstitutionId) -> InMemoryReferenceData {
    let session = demo_session();
    let session_id = session.session_id.clone();

    let mut professor = rank("professor", "Professor", 300, 60, 1500, 700);
    professor.other_allowances.push(OtherAllowance {
        name: "research".to_string(),
        amount: Decimal::from(250),
    });
    let mut senior = rank("senior-lecturer", "Senior Lecturer", 250, 50, 1200, 700);
    senior.dsa_percentage = Some(Decimal::from(60));
    let lecturer = rank("lecturer-1", "Lecturer I", 200, 50, 1000, 500);

    let schools = [
        school(
            "akoka-hs",
            "Akoka High School",
            Decimal::from(4),
            "mainland",
            (6.5244, 3.3792),
        ),
        school(
            "bariga-gs",
            "Bariga Grammar School",
            Decimal::from(8),
            "mainland",
            (6.5392, 3.3870),
        ),
        school(
            "ikorodu-mc",
            "Ikorodu Model College",
            Decimal::new(245, 1),
            "east",
            (6.6194, 3.5105),
        ),
        school(
            "epe-cs",
            "Epe Comprehensive School",
            Decimal::from(58),
            "east",
            (6.5841, 3.9836),
        ),
        school(
            "yaba-cs",
            "Yaba Community School",
            Decimal::from(6),
            "mainland",
            (6.5095, 3.3711),
        ),
    ];
    let students = [
        ("akoka-hs", 1, 6),
        ("bariga-gs", 1, 4),
        ("bariga-gs", 2, 3),
        ("ikorodu-mc", 1, 5),
        ("epe-cs", 1, 2),
    ];

    let mut reference = InMemoryReferenceData::default()
        .with_session(institution, session)
        .with_supervisor(
            institution,
            supervisor("sup-adeyemi", "Prof. Ngozi Adeyemi", professor),
        )
        .with_supervisor(
            institution,
            supervisor("sup-balogun", "Dr. Tunde Balogun", senior),
        )
        .with_supervisor(
            institution,
            supervisor("sup-chukwu", "Mr. Emeka Chukwu", lecturer),
        );
    for link in schools {
        reference = reference.with_school(institution, link);
    }
    for (school_id, group, count) in students {
        reference = reference.with_approved_students(
            institution,
            &session_id,
            &SchoolId::new(school_id),
            group,
            count,
        );
    }

    reference.with_merged_group(
        institution,
        MergedGroup {
            session_id,
            primary_school: SchoolId::new("bariga-gs"),
            primary_group: 1,
            secondary_school: SchoolId::new("yaba-cs"),
            secondary_group: 1,
            active: true,
        },
    )
}
