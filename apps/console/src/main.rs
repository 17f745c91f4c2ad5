use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::{load_settings, prepare_database_url},
    CoordinatorServices, DurableHistoryLog, EphemeralHistoryLog, HistoryLog,
    VoiceCommandCoordinator,
};
use devnet::Devnet;
use fhe_services::StaticIdentity;
use shared::{domain::ActorAddress, draft::CommandDraft};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEMO_ACTOR: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

#[derive(Parser, Debug)]
struct Cli {
    /// Overrides `history_database_url` from settings.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a command on an in-process devnet, decrypt it, print the results.
    Demo {
        #[arg(long, default_value = "Turn on lights")]
        name: String,
        #[arg(long, default_value = "1")]
        category: String,
        #[arg(long, default_value = "42")]
        value: String,
        /// Keep history in memory only.
        #[arg(long)]
        ephemeral: bool,
    },
    /// Print persisted history, oldest first.
    History {
        #[arg(long)]
        limit: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    let settings = load_settings();
    let database_url = prepare_database_url(
        cli.database_url
            .as_deref()
            .unwrap_or(&settings.history_database_url),
    )?;

    match cli.command {
        Command::Demo {
            name,
            category,
            value,
            ephemeral,
        } => {
            let history_log: Arc<dyn HistoryLog> = if ephemeral {
                Arc::new(EphemeralHistoryLog)
            } else {
                DurableHistoryLog::initialize(&database_url).await?
            };
            let devnet = Devnet::new();
            let ledger = devnet.ledger();
            let fhe = devnet.fhe();
            let actor = ActorAddress::new(DEMO_ACTOR);
            let services = CoordinatorServices {
                ledger_writer: ledger.signer(actor.clone()),
                ledger,
                encryption: fhe.clone(),
                oracle: fhe,
                identity: Arc::new(StaticIdentity::connected(actor)),
                history_log,
            };
            let coordinator = VoiceCommandCoordinator::new_with_dependencies(settings, services);

            coordinator.start_session().await?;
            coordinator.check_availability().await?;
            coordinator.set_draft(CommandDraft::new(name, category, value));
            let id = coordinator.submit_draft().await?;
            info!(command_id = %id, "console: command created");
            let revealed = coordinator.request_decryption(&id).await?;
            let command = coordinator
                .command(&id)
                .with_context(|| format!("command {id} missing after refresh"))?;

            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "command": command,
                    "revealed": revealed,
                    "stats": coordinator.usage_stats(),
                    "history": coordinator.recent_history(),
                }))?
            );
        }
        Command::History { limit } => {
            let log = DurableHistoryLog::initialize(&database_url).await?;
            let entries = match limit {
                Some(limit) => log.recent(limit).await?,
                None => log.load_all().await?,
            };
            for entry in entries {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
    }

    Ok(())
}
