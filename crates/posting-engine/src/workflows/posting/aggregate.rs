use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{LocationCategory, OtherAllowance, Posting, SessionId, SupervisorId};

/// Session allowance totals with tetfund counted once per supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceSummary {
    pub session_id: SessionId,
    pub transport: Decimal,
    pub dsa: Decimal,
    pub dta: Decimal,
    pub local_running: Decimal,
    pub subtotal: Decimal,
    pub tetfund: Decimal,
    /// Sum of tetfund as stored on every posting, before deduplication.
    pub tetfund_stored: Decimal,
    pub grand_total: Decimal,
    pub other_allowances: Vec<OtherAllowance>,
    pub posting_count: usize,
    pub supervisor_count: usize,
    pub supervisors: Vec<SupervisorAllowance>,
}

/// One supervisor's share of the session allowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorAllowance {
    pub supervisor_id: SupervisorId,
    pub postings: usize,
    pub transport: Decimal,
    pub dsa: Decimal,
    pub dta: Decimal,
    pub local_running: Decimal,
    pub tetfund: Decimal,
    pub total: Decimal,
}

impl SupervisorAllowance {
    fn new(supervisor_id: SupervisorId) -> Self {
        Self {
            supervisor_id,
            postings: 0,
            transport: Decimal::ZERO,
            dsa: Decimal::ZERO,
            dta: Decimal::ZERO,
            local_running: Decimal::ZERO,
            tetfund: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }

    fn absorb(&mut self, posting: &Posting) {
        let allowance = &posting.allowance;
        self.postings += 1;
        self.transport = self.transport.saturating_add(allowance.transport);
        self.dsa = self.dsa.saturating_add(allowance.dsa);
        self.dta = self.dta.saturating_add(allowance.dta);
        self.local_running = self.local_running.saturating_add(allowance.local_running);
        self.tetfund = self.tetfund.max(allowance.tetfund);
    }

    fn subtotal(&self) -> Decimal {
        total([self.transport, self.dsa, self.dta, self.local_running])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingStatistics {
    pub session_id: SessionId,
    pub total_postings: usize,
    pub primary_postings: usize,
    pub secondary_postings: usize,
    pub inside_postings: usize,
    pub outside_postings: usize,
    pub by_visit: BTreeMap<u32, usize>,
    pub unique_supervisors: usize,
    pub unique_schools: usize,
}

/// Read-side totals over persisted postings. Cancelled postings never contribute.
pub struct PostingAggregator;

impl PostingAggregator {
    pub fn summarize(session_id: &SessionId, postings: &[Posting]) -> AllowanceSummary {
        let mut by_supervisor: BTreeMap<&SupervisorId, SupervisorAllowance> = BTreeMap::new();
        let mut other_allowances: BTreeMap<&str, Decimal> = BTreeMap::new();
        let mut tetfund_stored = Decimal::ZERO;
        let mut posting_count = 0;

        for posting in postings.iter().filter(|posting| posting.is_active()) {
            posting_count += 1;
            tetfund_stored = tetfund_stored.saturating_add(posting.allowance.tetfund);
            by_supervisor
                .entry(&posting.supervisor_id)
                .or_insert_with(|| SupervisorAllowance::new(posting.supervisor_id.clone()))
                .absorb(posting);
            for other in &posting.other_allowances {
                let amount = other_allowances.entry(other.name.as_str()).or_default();
                *amount = amount.saturating_add(other.amount);
            }
        }

        let mut supervisors: Vec<SupervisorAllowance> = by_supervisor.into_values().collect();
        for supervisor in &mut supervisors {
            supervisor.total = supervisor.subtotal().saturating_add(supervisor.tetfund);
        }

        let transport = total(supervisors.iter().map(|entry| entry.transport));
        let dsa = total(supervisors.iter().map(|entry| entry.dsa));
        let dta = total(supervisors.iter().map(|entry| entry.dta));
        let local_running = total(supervisors.iter().map(|entry| entry.local_running));
        let tetfund = total(supervisors.iter().map(|entry| entry.tetfund));
        let subtotal = total([transport, dsa, dta, local_running]);

        AllowanceSummary {
            session_id: session_id.clone(),
            transport,
            dsa,
            dta,
            local_running,
            subtotal,
            tetfund,
            tetfund_stored,
            grand_total: subtotal.saturating_add(tetfund),
            other_allowances: other_allowances
                .into_iter()
                .map(|(name, amount)| OtherAllowance {
                    name: name.to_string(),
                    amount,
                })
                .collect(),
            posting_count,
            supervisor_count: supervisors.len(),
            supervisors,
        }
    }

    pub fn statistics(session_id: &SessionId, postings: &[Posting]) -> PostingStatistics {
        let mut stats = PostingStatistics {
            session_id: session_id.clone(),
            total_postings: 0,
            primary_postings: 0,
            secondary_postings: 0,
            inside_postings: 0,
            outside_postings: 0,
            by_visit: BTreeMap::new(),
            unique_supervisors: 0,
            unique_schools: 0,
        };
        let mut supervisors = BTreeSet::new();
        let mut schools = BTreeSet::new();

        for posting in postings.iter().filter(|posting| posting.is_active()) {
            stats.total_postings += 1;
            if posting.is_primary {
                stats.primary_postings += 1;
            } else {
                stats.secondary_postings += 1;
            }
            match posting.allowance.location_category {
                LocationCategory::Inside => stats.inside_postings += 1,
                LocationCategory::Outside => stats.outside_postings += 1,
            }
            *stats.by_visit.entry(posting.slot.visit).or_default() += 1;
            supervisors.insert(&posting.supervisor_id);
            schools.insert(&posting.slot.school_id);
        }

        stats.unique_supervisors = supervisors.len();
        stats.unique_schools = schools.len();
        stats
    }
}

fn total(amounts: impl IntoIterator<Item = Decimal>) -> Decimal {
    amounts
        .into_iter()
        .fold(Decimal::ZERO, |sum, amount| sum.saturating_add(amount))
}
