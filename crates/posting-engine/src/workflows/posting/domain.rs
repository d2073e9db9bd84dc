use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// Institution scope every posting, session, and school link belongs to.
    InstitutionId
);
identifier!(
    /// Teaching-practice session (one supervision cycle).
    SessionId
);
identifier!(SchoolId);
identifier!(SupervisorId);

/// Storage-assigned posting identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostingId(pub u64);

impl fmt::Display for PostingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named supplementary allowance carried on a rank rate card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherAllowance {
    pub name: String,
    pub amount: Decimal,
}

/// Per-institution rate card attached to a supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rank {
    pub rank_id: String,
    pub name: String,
    pub local_running_rate: Decimal,
    pub transport_per_km: Decimal,
    pub dta_rate: Decimal,
    pub tetfund_rate: Decimal,
    /// Rank-specific DSA percentage; the session percentage applies when absent.
    #[serde(default)]
    pub dsa_percentage: Option<Decimal>,
    #[serde(default)]
    pub other_allowances: Vec<OtherAllowance>,
}

/// Distance rules a session applies when pricing a posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionThresholds {
    pub inside_threshold_km: Decimal,
    pub dsa_enabled: bool,
    pub dsa_min_km: Decimal,
    pub dsa_max_km: Decimal,
    pub dsa_percentage: Decimal,
}

/// Session configuration supplied by the session registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub session_id: SessionId,
    pub name: String,
    pub thresholds: SessionThresholds,
    pub max_postings_per_supervisor: u32,
    pub max_visits: u32,
}

/// Display-only coordinates for a school.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Institution-specific view of a school. The distance here is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolLink {
    pub school_id: SchoolId,
    pub name: String,
    pub distance_km: Decimal,
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorProfile {
    pub supervisor_id: SupervisorId,
    pub name: String,
    pub rank: Rank,
}

/// Directed link making a secondary (school, group) ride along with visits to a primary one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedGroup {
    pub session_id: SessionId,
    pub primary_school: SchoolId,
    pub primary_group: u32,
    pub secondary_school: SchoolId,
    pub secondary_group: u32,
    pub active: bool,
}

impl MergedGroup {
    pub fn is_anchored_at(&self, school: &SchoolId, group: u32) -> bool {
        self.active && &self.primary_school == school && self.primary_group == group
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationCategory {
    Inside,
    Outside,
}

impl LocationCategory {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Inside => "inside",
            Self::Outside => "outside",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingStatus {
    Active,
    Cancelled,
}

impl PostingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
        }
    }
}

/// The unit of uniqueness: at most one active posting may hold a slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostingSlot {
    pub institution_id: InstitutionId,
    pub session_id: SessionId,
    pub school_id: SchoolId,
    pub group: u32,
    pub visit: u32,
}

impl PostingSlot {
    pub fn with_visit(&self, visit: u32) -> Self {
        Self {
            visit,
            ..self.clone()
        }
    }
}

impl fmt::Display for PostingSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "school {} group {} visit {} (session {})",
            self.school_id, self.group, self.visit, self.session_id
        )
    }
}

/// Monetary breakdown for one posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceBreakdown {
    pub distance_km: Decimal,
    pub location_category: LocationCategory,
    pub transport: Decimal,
    pub dsa: Decimal,
    pub dta: Decimal,
    pub local_running: Decimal,
    pub tetfund: Decimal,
    pub total: Decimal,
}

impl AllowanceBreakdown {
    pub fn zero(distance_km: Decimal, location_category: LocationCategory) -> Self {
        Self {
            distance_km,
            location_category,
            transport: Decimal::ZERO,
            dsa: Decimal::ZERO,
            dta: Decimal::ZERO,
            local_running: Decimal::ZERO,
            tetfund: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }

    /// Everything except tetfund, which is totalled once per supervisor.
    pub fn subtotal(&self) -> Decimal {
        self.transport
            .saturating_add(self.dsa)
            .saturating_add(self.dta)
            .saturating_add(self.local_running)
    }

    pub fn is_zero(&self) -> bool {
        self.total.is_zero()
            && self.transport.is_zero()
            && self.dsa.is_zero()
            && self.dta.is_zero()
            && self.local_running.is_zero()
            && self.tetfund.is_zero()
    }
}

/// Caller input for a single posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingRequest {
    pub supervisor_id: SupervisorId,
    pub school_id: SchoolId,
    pub group: u32,
    pub visit: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Mutable fields of an existing posting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingUpdate {
    #[serde(default)]
    pub visit: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Read-side filter for posting listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingFilter {
    #[serde(default)]
    pub supervisor_id: Option<SupervisorId>,
    #[serde(default)]
    pub school_id: Option<SchoolId>,
    #[serde(default)]
    pub status: Option<PostingStatus>,
}

impl PostingFilter {
    pub fn matches(&self, posting: &Posting) -> bool {
        self.supervisor_id
            .as_ref()
            .map_or(true, |id| id == &posting.supervisor_id)
            && self
                .school_id
                .as_ref()
                .map_or(true, |id| id == &posting.slot.school_id)
            && self.status.map_or(true, |status| status == posting.status)
    }
}

/// A posting that has not been stored yet; storage assigns the identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPosting {
    pub slot: PostingSlot,
    pub supervisor_id: SupervisorId,
    pub rank: Rank,
    pub allowance: AllowanceBreakdown,
    pub other_allowances: Vec<OtherAllowance>,
    pub is_primary: bool,
    pub merged_with_posting_id: Option<PostingId>,
    pub notes: Option<String>,
    pub posted_at: DateTime<Utc>,
}

impl NewPosting {
    pub fn primary(
        slot: PostingSlot,
        supervisor: &SupervisorProfile,
        allowance: AllowanceBreakdown,
        notes: Option<String>,
        posted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            slot,
            supervisor_id: supervisor.supervisor_id.clone(),
            rank: supervisor.rank.clone(),
            allowance,
            other_allowances: supervisor.rank.other_allowances.clone(),
            is_primary: true,
            merged_with_posting_id: None,
            notes,
            posted_at,
        }
    }

    pub fn dependent_of(
        primary: &Posting,
        slot: PostingSlot,
        allowance: AllowanceBreakdown,
        posted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            slot,
            supervisor_id: primary.supervisor_id.clone(),
            rank: primary.rank.clone(),
            allowance,
            other_allowances: Vec::new(),
            is_primary: false,
            merged_with_posting_id: Some(primary.id),
            notes: Some(format!("merged with posting {}", primary.id)),
            posted_at,
        }
    }

    pub fn into_posting(self, id: PostingId) -> Posting {
        Posting {
            id,
            slot: self.slot,
            supervisor_id: self.supervisor_id,
            rank: self.rank,
            allowance: self.allowance,
            other_allowances: self.other_allowances,
            is_primary: self.is_primary,
            merged_with_posting_id: self.merged_with_posting_id,
            status: PostingStatus::Active,
            notes: self.notes,
            posted_at: self.posted_at,
            cancelled_at: None,
        }
    }
}

/// One supervisor-to-school assignment for one group and visit within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub id: PostingId,
    pub slot: PostingSlot,
    pub supervisor_id: SupervisorId,
    pub rank: Rank,
    pub allowance: AllowanceBreakdown,
    pub other_allowances: Vec<OtherAllowance>,
    pub is_primary: bool,
    pub merged_with_posting_id: Option<PostingId>,
    pub status: PostingStatus,
    pub notes: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Posting {
    pub fn is_active(&self) -> bool {
        self.status == PostingStatus::Active
    }

    /// Only active primary postings consume a supervisor's session cap.
    pub fn counts_toward_capacity(&self) -> bool {
        self.is_active() && self.is_primary
    }

    pub fn cancel(&mut self, at: DateTime<Utc>) {
        self.status = PostingStatus::Cancelled;
        self.cancelled_at = Some(at);
    }
}
