use crate::infra::{demo_reference_data, DEMO_SESSION};
use clap::Args;
use posting_engine::error::AppError;
use posting_engine::workflows::posting::{
    AllowanceSummary, AutoPostRequest, InMemoryPostingStore, InMemoryReferenceData,
    InstitutionId, Posting, PostingOutcome, PostingRequest, PostingService, PostingServiceError,
    SchoolId, SessionId, SkipReason, SupervisorId,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type DemoService = PostingService<InMemoryPostingStore, InMemoryReferenceData>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Institution scope for the seeded catalog.
    #[arg(long, default_value = "demo")]
    pub(crate) institution: String,
    /// Restrict auto-posting to schools on this route.
    #[arg(long)]
    pub(crate) route: Option<String>,
    /// Per-supervisor limit for the auto-posting step (defaults to the session cap).
    #[arg(long)]
    pub(crate) max_per_supervisor: Option<u32>,
    /// Skip the auto-posting step.
    #[arg(long)]
    pub(crate) skip_auto: bool,
    /// Write every stored posting to this CSV file.
    #[arg(long)]
    pub(crate) csv: Option<PathBuf>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        institution,
        route,
        max_per_supervisor,
        skip_auto,
        csv,
    } = args;

    let institution = InstitutionId::new(institution);
    let session = SessionId::new(DEMO_SESSION);
    let store = InMemoryPostingStore::default();
    let service = PostingService::new(
        institution.clone(),
        Arc::new(store.clone()),
        Arc::new(demo_reference_data(&institution)),
    );

    println!("Supervisor posting demo ({institution}, session {session})");

    println!("\nPrimary posting with a merged group");
    let outcome = service.create_posting(&session, request("sup-adeyemi", "bariga-gs", 1, 1))?;
    render_outcome(&outcome);

    println!("\nSecond supervisor on the same slot");
    match service.create_posting(&session, request("sup-chukwu", "bariga-gs", 1, 1)) {
        Ok(outcome) => render_outcome(&outcome),
        Err(err) => println!("  Rejected: {err}"),
    }

    println!("\nBulk posting");
    let report = service.bulk_create_postings(
        &session,
        vec![
            request("sup-balogun", "ikorodu-mc", 1, 1),
            request("sup-chukwu", "epe-cs", 1, 1),
            request("sup-chukwu", "ikorodu-mc", 1, 1),
        ],
    )?;
    for outcome in &report.successful {
        render_outcome(outcome);
    }
    for failure in &report.failed {
        println!(
            "  - item {} ({} at {}) failed: {}",
            failure.index,
            failure.request.supervisor_id,
            failure.request.school_id,
            serde_json::to_string(&failure.failure).unwrap_or_else(|_| "unknown".to_string())
        );
    }

    println!("\nMulti posting across visits");
    let multi = service.create_multi_postings(
        &session,
        vec![
            request("sup-adeyemi", "bariga-gs", 1, 2),
            request("sup-chukwu", "bariga-gs", 1, 3),
            request("sup-chukwu", "bariga-gs", 1, 4),
        ],
    )?;
    for posting in &multi.successful {
        println!(
            "  - #{} {} -> {} visit {} total {}",
            posting.id,
            posting.supervisor_id,
            posting.slot.school_id,
            posting.slot.visit,
            posting.allowance.total
        );
    }
    println!(
        "  {} merged postings created, {} items rejected",
        multi.dependent_postings.len(),
        multi.failed.len()
    );

    if !skip_auto {
        auto_post(&service, &session, route, max_per_supervisor)?;
    }

    println!("\nCancelling and re-posting epe-cs group 1 visit 1");
    let epe = service
        .list_postings(&session, &Default::default())?
        .into_iter()
        .find(|posting| {
            posting.is_active()
                && posting.slot.school_id == SchoolId::new("epe-cs")
                && posting.slot.group == 1
                && posting.slot.visit == 1
        });
    if let Some(posting) = epe {
        let cancelled = service.cancel_posting(posting.id)?;
        println!(
            "  - posting {} for {} is now {}",
            cancelled.id,
            cancelled.supervisor_id,
            cancelled.status.label()
        );
        match service.create_posting(&session, request("sup-balogun", "epe-cs", 1, 1)) {
            Ok(outcome) => render_outcome(&outcome),
            Err(err) => println!("  Re-post rejected: {err}"),
        }
    }

    let summary = service.summarize_allowances(&session)?;
    render_summary(&summary);

    let stats = service.posting_statistics(&session)?;
    println!(
        "\nStatistics: {} active postings ({} primary / {} merged), {} inside / {} outside, {} supervisors across {} schools",
        stats.total_postings,
        stats.primary_postings,
        stats.secondary_postings,
        stats.inside_postings,
        stats.outside_postings,
        stats.unique_supervisors,
        stats.unique_schools
    );

    if let Some(path) = csv {
        let postings = store.snapshot().map_err(PostingServiceError::from)?;
        export_ledger(&path, &postings)?;
        println!("\nLedger written to {}", path.display());
    }

    Ok(())
}

fn auto_post(
    service: &DemoService,
    session: &SessionId,
    route_id: Option<String>,
    max_per_supervisor: Option<u32>,
) -> Result<(), AppError> {
    match &route_id {
        Some(route) => println!("\nAuto-posting (route {route})"),
        None => println!("\nAuto-posting (all routes)"),
    }

    let report = service.auto_assign(
        session,
        AutoPostRequest {
            route_id,
            max_per_supervisor,
        },
    )?;
    for outcome in &report.successful {
        render_outcome(outcome);
    }
    for skip in &report.skipped {
        let reason = match &skip.reason {
            SkipReason::NoSupervisorCapacity => "no supervisor capacity left".to_string(),
            SkipReason::Rejected { violations } => violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
            SkipReason::Failed { failure } => {
                serde_json::to_string(failure).unwrap_or_else(|_| "unknown".to_string())
            }
        };
        println!(
            "  - skipped {} ({}): {}",
            skip.school_name, skip.school_id, reason
        );
    }
    Ok(())
}

fn request(supervisor: &str, school: &str, group: u32, visit: u32) -> PostingRequest {
    PostingRequest {
        supervisor_id: SupervisorId::new(supervisor),
        school_id: SchoolId::new(school),
        group,
        visit,
        notes: None,
    }
}

fn render_outcome(outcome: &PostingOutcome) {
    let posting = &outcome.posting;
    println!(
        "  - #{} {} -> {} group {} visit {} [{}] total {}",
        posting.id,
        posting.supervisor_id,
        posting.slot.school_id,
        posting.slot.group,
        posting.slot.visit,
        posting.allowance.location_category.label(),
        posting.allowance.total
    );
    for dependent in &outcome.dependents {
        println!(
            "      merged #{} -> {} group {} (zero allowance)",
            dependent.id, dependent.slot.school_id, dependent.slot.group
        );
    }
    for failure in &outcome.propagation_failures {
        println!("      propagation failed: {}", failure.reason);
    }
}

fn render_summary(summary: &AllowanceSummary) {
    println!("\nAllowance summary for {}", summary.session_id);
    for supervisor in &summary.supervisors {
        println!(
            "  - {}: {} postings | transport {} | dsa {} | dta {} | local running {} | tetfund {} | total {}",
            supervisor.supervisor_id,
            supervisor.postings,
            supervisor.transport,
            supervisor.dsa,
            supervisor.dta,
            supervisor.local_running,
            supervisor.tetfund,
            supervisor.total
        );
    }
    println!(
        "  Subtotal {} + tetfund {} (stored {}) = {}",
        summary.subtotal, summary.tetfund, summary.tetfund_stored, summary.grand_total
    );
    for other in &summary.other_allowances {
        println!("  Other allowance {}: {}", other.name, other.amount);
    }
}

#[derive(Debug, Serialize)]
struct LedgerRow<'a> {
    posting_id: u64,
    session_id: &'a str,
    supervisor_id: &'a str,
    school_id: &'a str,
    group: u32,
    visit: u32,
    status: &'static str,
    primary: bool,
    merged_with: Option<u64>,
    location: &'static str,
    distance_km: Decimal,
    transport: Decimal,
    dsa: Decimal,
    dta: Decimal,
    local_running: Decimal,
    tetfund: Decimal,
    total: Decimal,
}

impl<'a> From<&'a Posting> for LedgerRow<'a> {
    fn from(posting: &'a Posting) -> Self {
        let allowance = &posting.allowance;
        Self {
            posting_id: posting.id.0,
            session_id: posting.slot.session_id.as_str(),
            supervisor_id: posting.supervisor_id.as_str(),
            school_id: posting.slot.school_id.as_str(),
            group: posting.slot.group,
            visit: posting.slot.visit,
            status: posting.status.label(),
            primary: posting.is_primary,
            merged_with: posting.merged_with_posting_id.map(|id| id.0),
            location: allowance.location_category.label(),
            distance_km: allowance.distance_km,
            transport: allowance.transport,
            dsa: allowance.dsa,
            dta: allowance.dta,
            local_running: allowance.local_running,
            tetfund: allowance.tetfund,
            total: allowance.total,
        }
    }
}

fn export_ledger(path: &Path, postings: &[Posting]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path).map_err(std::io::Error::from)?;
    for posting in postings {
        writer
            .serialize(LedgerRow::from(posting))
            .map_err(std::io::Error::from)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_and_exports_ledger() {
        let path =
            std::env::temp_dir().join(format!("posting-ledger-{}.csv", std::process::id()));
        run_demo(DemoArgs {
            institution: "demo".to_string(),
            route: None,
            max_per_supervisor: Some(2),
            skip_auto: false,
            csv: Some(path.clone()),
        })
        .expect("demo completes");

        let contents = std::fs::read_to_string(&path).expect("ledger written");
        let mut lines = contents.lines();
        let header = lines.next().expect("header row");
        assert!(header.starts_with("posting_id,session_id,supervisor_id,school_id"));
        assert!(lines.any(|line| line.contains("yaba-cs") && line.contains(",false,")));
        std::fs::remove_file(&path).ok();
    }
}
