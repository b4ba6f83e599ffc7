use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use kosh_core::{AdminDecision, CorrectionId, EntityKind, IdentityContext, ReportId};
use kosh_server::moderation::{
    AdminGateway, ChangeNotifier, CorrectionApplier, CorrectionStatus, EntityStore,
    ModerationService, ReportStatus, SqliteStore, ThresholdPolicy, WordStatus,
};

/// Kosh: operator tool for the community dictionary moderation queue
#[derive(Parser, Debug)]
#[command(name = "kosh")]
#[command(about = "Inspect and act on the moderation database", long_about = None)]
struct Cli {
    /// Directory holding kosh.db (same as the server's STATE_DIR)
    #[arg(long, default_value = ".")]
    state_dir: PathBuf,

    /// User id to act as for privileged commands
    #[arg(long, default_value = "cli-operator")]
    as_admin: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List words, optionally filtered by status
    Words {
        /// Status filter (e.g. community_review, pending_review, approved)
        #[arg(long)]
        status: Option<String>,
    },
    /// List corrections, optionally filtered by status
    Corrections {
        /// Status filter (e.g. shallow_review, approved, applied)
        #[arg(long)]
        status: Option<String>,
    },
    /// List reports, optionally filtered by status
    Reports {
        /// Status filter (open or resolved)
        #[arg(long)]
        status: Option<String>,
    },
    /// Show the full moderation state of a word or correction
    Show {
        /// Entity kind: word or correction
        kind: String,
        id: Uuid,
    },
    /// Record an admin decision on a word or correction
    Decide {
        /// Entity kind: word or correction
        kind: String,
        id: Uuid,
        /// Decision: approve or reject
        decision: String,
    },
    /// Apply an approved correction to its word
    Apply { id: Uuid },
    /// Resolve an open report
    Resolve {
        id: Uuid,
        /// Resolution note
        resolution: String,
    },
}

/// Deserialize a status string through the entities' serde representation,
/// so the CLI accepts exactly the names the wire format uses.
fn parse_status<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| anyhow!("unknown status: {}", s))
}

fn parse_kind(s: &str) -> Result<EntityKind> {
    match s {
        "word" => Ok(EntityKind::Word),
        "correction" => Ok(EntityKind::Correction),
        other => Err(anyhow!("unknown entity kind: {} (use word or correction)", other)),
    }
}

fn parse_decision(s: &str) -> Result<AdminDecision> {
    match s {
        "approve" => Ok(AdminDecision::Approve),
        "reject" => Ok(AdminDecision::Reject),
        other => Err(anyhow!("unknown decision: {} (use approve or reject)", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let db_path = cli.state_dir.join("kosh.db");
    let store: Arc<dyn EntityStore> = Arc::new(
        SqliteStore::new(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?,
    );
    let policy = ThresholdPolicy::default();
    let notifier = ChangeNotifier::default();
    let service = ModerationService::new(store.clone(), policy, notifier.clone());
    let gateway = AdminGateway::new(store.clone(), policy, notifier.clone());
    let applier = CorrectionApplier::new(store.clone(), policy, notifier);
    let identity = IdentityContext::admin(cli.as_admin.as_str());

    match cli.command {
        Commands::Words { status } => {
            let status = status
                .as_deref()
                .map(parse_status::<WordStatus>)
                .transpose()?;
            let words = store.list_words(status).await?;
            for word in &words {
                println!(
                    "{}  {:<18} {:>2}/{:<2}  {}",
                    word.id,
                    word.status.as_str(),
                    word.votes_for,
                    word.votes_against,
                    word.kurukh_word
                );
            }
            println!("{} word(s)", words.len());
        }
        Commands::Corrections { status } => {
            let status = status
                .as_deref()
                .map(parse_status::<CorrectionStatus>)
                .transpose()?;
            let corrections = store.list_corrections(status).await?;
            for correction in &corrections {
                println!(
                    "{}  {:<16} {:>2}/{:<2}  {} -> {}  (word {})",
                    correction.id,
                    correction.status.as_str(),
                    correction.votes_for,
                    correction.votes_against,
                    correction.current_value,
                    correction.proposed_change,
                    correction.word_id
                );
            }
            println!("{} correction(s)", corrections.len());
        }
        Commands::Reports { status } => {
            let status = status
                .as_deref()
                .map(parse_status::<ReportStatus>)
                .transpose()?;
            let reports = store.list_reports(status).await?;
            for report in &reports {
                println!(
                    "{}  word {}  by {}  {}",
                    report.id, report.word_id, report.reporter, report.reason
                );
            }
            println!("{} report(s)", reports.len());
        }
        Commands::Show { kind, id } => {
            let kind = parse_kind(&kind)?;
            let view = service.load_status(kind, id).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Commands::Decide { kind, id, decision } => {
            let kind = parse_kind(&kind)?;
            let decision = parse_decision(&decision)?;
            let status = gateway.admin_decide(kind, id, decision, &identity).await?;
            println!("{} {} -> {}", kind, id, status);
        }
        Commands::Apply { id } => {
            applier.apply(CorrectionId(id)).await?;
            println!("correction {} applied", id);
        }
        Commands::Resolve { id, resolution } => {
            let report = gateway
                .resolve_report(ReportId(id), resolution, &identity)
                .await?;
            println!("report {} resolved by {}", report.id, cli.as_admin);
        }
    }

    Ok(())
}
