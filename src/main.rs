//! Keelson CLI - keep a dependency-gated roadmap consistent on disk.

use clap::Parser;
use keelson::cli::{BackupCommands, Cli, Commands, ConfigCommands, MilestoneCommands};
use keelson::commands::{self, MilestoneDraft, Output};
use keelson::config::{PathOverrides, resolve_settings};
use keelson::models::MilestonePatch;
use keelson::roadmap::UpdateOptions;
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Log filter variable; defaults to `warn`.
const LOG_ENV: &str = "KEELSON_LOG";

/// Set to `json` for JSON log lines.
const LOG_FORMAT_ENV: &str = "KEELSON_LOG_FORMAT";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;
    init_logging();

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("KL_GIT_COMMIT"),
        built = env!("KL_BUILD_TIMESTAMP"),
        "starting kl"
    );

    if let Err(e) = run(cli).await {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> Result<(), keelson::Error> {
    let human = cli.human_readable;
    let settings = resolve_settings(&PathOverrides {
        repo: cli.repo_path,
        data_dir: cli.data_dir,
    })?;

    if let Commands::Config {
        command: ConfigCommands::Show,
    } = cli.command
    {
        output(&settings, human);
        return Ok(());
    }

    let engine = commands::build_engine(&settings);

    match cli.command {
        Commands::Show { id } => {
            let result = commands::show(&engine, id.as_deref()).await?;
            output(&result, human);
        }

        Commands::Milestone { command } => match command {
            MilestoneCommands::Add {
                id,
                title,
                description,
                status,
                progress,
                depends_on,
                tickets,
                features,
                modules,
                actor,
            } => {
                let draft = MilestoneDraft {
                    id,
                    title,
                    description,
                    status,
                    progress,
                    dependencies: depends_on,
                    tickets,
                    features,
                    modules,
                    actor,
                };
                let result = commands::milestone_add(&engine, draft).await?;
                output(&result, human);
            }
            MilestoneCommands::Update {
                id,
                title,
                description,
                status,
                progress,
                dependencies,
                tickets,
                features,
                modules,
                summary,
                reason,
                actor,
                no_git,
            } => {
                let patch = MilestonePatch {
                    title,
                    description,
                    status,
                    progress,
                    dependencies,
                    linked_tickets: tickets,
                    linked_features: features,
                    linked_modules: modules,
                    completion_summary: summary,
                };
                let options = UpdateOptions {
                    reason,
                    actor,
                    skip_git_automation: no_git,
                    domain_override: None,
                };
                let result = commands::milestone_update(&engine, &id, patch, options).await?;
                output(&result, human);
            }
        },

        Commands::Sync { reason, debounced } => {
            let result = commands::sync(&engine, &reason, debounced).await?;
            output(&result, human);
        }

        Commands::History { limit } => {
            let result = commands::history(&engine, limit).await?;
            output(&result, human);
        }

        Commands::Backup { command } => match command {
            BackupCommands::List => {
                let result = commands::backup_list(&engine).await?;
                output(&result, human);
            }
            BackupCommands::Rollback { filename } => {
                let actor = std::env::var("KEELSON_ACTOR").ok();
                let result =
                    commands::backup_rollback(&engine, &filename, actor.as_deref()).await?;
                output(&result, human);
            }
        },

        Commands::Config { .. } => {}
    }

    Ok(())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
