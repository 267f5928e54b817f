//! Draw - Operator CLI for the recharge draw engine
//!
//! Usage:
//!   draw migrate                               - Create the database and apply migrations
//!   draw execute --prize-structure <ID>        - Run today's draw (or --date YYYY-MM-DD)
//!   draw runner-up <WINNER_ID> --reason <TEXT> - Replace a winner with the next runner-up
//!   draw payment paid <WINNER_ID> --confirmation <REF>
//!   draw payment failed <WINNER_ID> --note <TEXT>
//!   draw verify <DRAW_ID>                      - Replay a completed draw
//!   draw show --date <DATE> | --id <DRAW_ID>   - Show a draw and its winners

mod display;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use draw_core::PaymentUpdate;
use draw_engine::{DrawService, EngineConfig};
use draw_store::{DbPool, PgAuditSink, PgEligibility, PgPrizeStructures, PgStore};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "draw")]
#[command(about = "Recharge draw engine - operator CLI")]
#[command(version, propagate_version = true)]
struct Cli {
    /// PostgreSQL server URL (a trailing database name is ignored)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Database name
    #[arg(long, env = "DRAW_DB_NAME", default_value = draw_store::DEFAULT_DB_NAME, global = true)]
    db_name: String,

    /// Engine config file (JSON)
    #[arg(long, env = "DRAW_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Minor currency units of recharge per draw entry
    #[arg(
        long,
        env = "RECHARGE_PER_ENTRY",
        default_value_t = draw_store::DEFAULT_RECHARGE_PER_ENTRY,
        global = true
    )]
    recharge_per_entry: i64,

    /// Operator recorded on draws and audit events
    #[arg(long, env = "DRAW_ACTOR", default_value = "operator", global = true)]
    actor: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database if needed and apply migrations
    Migrate,

    /// Execute the draw for a date
    Execute {
        /// Draw date, defaults to today (UTC)
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Prize structure to award
        #[arg(short, long)]
        prize_structure: Uuid,
    },

    /// Replace a winner with the next available runner-up
    #[command(name = "runner-up")]
    RunnerUp {
        winner_id: Uuid,
        #[arg(short, long)]
        reason: String,
    },

    /// Update a winner's payment status
    #[command(subcommand)]
    Payment(PaymentCommands),

    /// Replay a completed draw from its recorded seed
    Verify { draw_id: Uuid },

    /// Show a draw and its winners
    Show(ShowArgs),

    /// Write the default engine config to a file
    InitConfig { path: PathBuf },

    /// Show version and build info
    Version,
}

#[derive(Subcommand, Debug)]
enum PaymentCommands {
    /// Mark a prize as paid
    Paid {
        winner_id: Uuid,
        /// Payment reference from the provider
        #[arg(short, long)]
        confirmation: String,
    },
    /// Record a failed payment attempt
    Failed {
        winner_id: Uuid,
        #[arg(short, long)]
        note: String,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct ShowArgs {
    #[arg(short, long)]
    date: Option<NaiveDate>,
    #[arg(long)]
    id: Option<Uuid>,
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("draw=debug,draw_engine=debug,info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize Sentry if SENTRY_DSN is set
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok()?;
    if dsn.is_empty() {
        return None;
    }

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: std::env::var("ENVIRONMENT").ok().map(|s| s.into()),
            traces_sample_rate: 0.1,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    info!("Sentry initialized for error tracking");
    Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _sentry_guard = init_sentry();
    init_logging();

    let cli = Cli::parse();
    let base_url = cli
        .database_url
        .clone()
        .unwrap_or_else(draw_store::get_base_url);

    match &cli.command {
        Commands::Version => {
            println!("draw v{}", VERSION);
            println!("  Build: {}", env!("CARGO_PKG_NAME"));
            println!("  Commit: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
            Ok(())
        }
        Commands::InitConfig { path } => {
            EngineConfig::default().save(path)?;
            display::print_success(&format!("Default config written to {}", path.display()));
            Ok(())
        }
        Commands::Migrate => {
            draw_store::init_db(&base_url, &cli.db_name).await?;
            display::print_success(&format!(
                "Database '{}' is at schema {}",
                cli.db_name,
                draw_store::schema::SCHEMA_VERSION
            ));
            Ok(())
        }
        command => {
            let pool = draw_store::connect(&base_url, &cli.db_name)?;
            let service = build_service(&cli, pool.clone())?;
            run(&cli, command, &service, pool).await
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    match &cli.config {
        Some(path) => {
            debug!("Loading engine config from {}", path.display());
            EngineConfig::load(path)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn build_service(cli: &Cli, pool: DbPool) -> Result<DrawService> {
    let config = load_config(cli)?;
    let eligibility = Arc::new(PgEligibility::new(pool.clone(), cli.recharge_per_entry)?);
    let service = DrawService::new(
        config,
        eligibility,
        Arc::new(PgPrizeStructures::new(pool.clone())),
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(PgAuditSink::new(pool)),
    )?;
    Ok(service)
}

async fn run(cli: &Cli, command: &Commands, service: &DrawService, pool: DbPool) -> Result<()> {
    match command {
        Commands::Execute {
            date,
            prize_structure,
        } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            info!(date = %date, prize_structure = %prize_structure, "Executing draw");

            let outcome = service
                .execute_draw(date, *prize_structure, &cli.actor)
                .await?;
            if cli.json {
                return print_json(&outcome);
            }

            let tier_names = tier_names(&pool, *prize_structure).await?;
            display::print_section(&format!("Draw {}", outcome.draw.draw_date));
            display::print_draw(&outcome.draw);
            display::print_winners(&outcome.winners, &tier_names);
            display::print_success(&format!(
                "{} winners and {} runner-ups recorded",
                outcome.primary_winners().count(),
                outcome.runner_ups().count()
            ));
            Ok(())
        }

        Commands::RunnerUp { winner_id, reason } => {
            let replacement = service
                .invoke_runner_up(*winner_id, reason, &cli.actor)
                .await?;
            if cli.json {
                return print_json(&replacement);
            }
            display::print_success(&format!(
                "{} replaced by {} (runner-up rank {})",
                replacement.original.msisdn,
                replacement.promoted.msisdn.green(),
                replacement
                    .promoted
                    .runner_up_rank
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "-".into())
            ));
            Ok(())
        }

        Commands::Payment(payment) => {
            let (winner_id, update) = match payment {
                PaymentCommands::Paid {
                    winner_id,
                    confirmation,
                } => (
                    *winner_id,
                    PaymentUpdate::Paid {
                        confirmation: confirmation.clone(),
                    },
                ),
                PaymentCommands::Failed { winner_id, note } => (
                    *winner_id,
                    PaymentUpdate::Failed { note: note.clone() },
                ),
            };

            let winner = service
                .update_winner_payment_status(winner_id, update, &cli.actor)
                .await?;
            if cli.json {
                return print_json(&winner);
            }
            display::print_success(&format!(
                "Winner {} payment is now {}",
                winner.msisdn,
                display::payment_label(winner.payment_status)
            ));
            Ok(())
        }

        Commands::Verify { draw_id } => {
            let report = service.verify_draw(*draw_id).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                display::print_verification(&report);
            }
            if !report.is_match() {
                bail!(
                    "draw {} does not reproduce ({} mismatches)",
                    draw_id,
                    report.mismatches.len()
                );
            }
            Ok(())
        }

        Commands::Show(args) => {
            let draw = match (args.id, args.date) {
                (Some(id), _) => service.get_draw(id).await?,
                (None, Some(date)) => service.get_draw_by_date(date).await?,
                (None, None) => bail!("either --date or --id is required"),
            };
            let Some(draw) = draw else {
                println!("{}", "  No draw found.".yellow());
                return Ok(());
            };

            let winners = service.list_winners(draw.id).await?;
            if cli.json {
                return print_json(&serde_json::json!({ "draw": draw, "winners": winners }));
            }

            let tier_names = tier_names(&pool, draw.prize_structure_id).await?;
            display::print_section(&format!("Draw {}", draw.draw_date));
            display::print_draw(&draw);
            display::print_winners(&winners, &tier_names);
            Ok(())
        }

        Commands::Migrate | Commands::InitConfig { .. } | Commands::Version => Ok(()),
    }
}

/// Tier id -> name for table output; missing structures just show ids
async fn tier_names(pool: &DbPool, prize_structure_id: Uuid) -> Result<HashMap<Uuid, String>> {
    use draw_core::PrizeStructureProvider;

    let structure = PgPrizeStructures::new(pool.clone())
        .prize_structure(prize_structure_id)
        .await
        .context("loading prize structure")?;
    Ok(structure
        .map(|s| s.tiers.into_iter().map(|t| (t.id, t.name)).collect())
        .unwrap_or_default())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
