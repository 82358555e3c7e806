use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{AppConfig, Backend, ConfigLoader};
use crate::engine::MutationEngine;
use crate::gateway::{sqlite, DocumentGateway, Gateway};
use crate::store::StoreHandle;

pub mod commands;

use self::commands::{
    AddArgs, AttachArgs, CommandOutput, DetachArgs, EditArgs, IdArgs, ListArgs, StatusArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "klartext",
    version,
    about = "Capture notes and tasks in one line: `todo call Anna #family !high @tomorrow`"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file location (takes precedence over KLARTEXT_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over KLARTEXT_DATA)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Capture a note or task; reads stdin when no text is given
    Add(AddArgs),
    /// List items, optionally filtered (`tag:work prio:high date:today kind:task`)
    List(ListArgs),
    /// Print every tag in use
    Tags,
    /// Show tasks grouped by status
    Board,
    /// Mark an item as done
    Done(IdArgs),
    /// Flip an item between done and todo
    Toggle(IdArgs),
    /// Move an item to another status column
    Status(StatusArgs),
    /// Change fields of an item
    Edit(EditArgs),
    /// Delete an item
    Delete(IdArgs),
    /// Attach an image file to an item
    Attach(AttachArgs),
    /// Remove an attached image and its stored file
    Detach(DetachArgs),
}

pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;

    let loader = ConfigLoader::with_overrides(cli.config.clone(), cli.data_dir.clone())?;
    let config = loader.load_or_init()?;
    tracing::debug!(backend = %config.backend, config = %loader.paths().config_file.display(), "configuration loaded");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .context("building async runtime")?;
    let output = runtime.block_on(dispatch(&config, cli.command))?;

    print!("{}", output.stdout);
    for notice in &output.notices {
        eprintln!("{notice}");
    }
    Ok(if output.rolled_back {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn dispatch(config: &AppConfig, command: Commands) -> Result<CommandOutput> {
    match config.backend {
        Backend::Sqlite => {
            let gateway = sqlite::init(&config.storage.database_path, &config.storage)?;
            execute_with(gateway, config, command).await
        }
        Backend::Document => {
            let gateway = DocumentGateway::new(config.storage.document_path.clone());
            execute_with(gateway, config, command).await
        }
    }
}

async fn execute_with<G: Gateway>(
    gateway: G,
    config: &AppConfig,
    command: Commands,
) -> Result<CommandOutput> {
    let mut engine = MutationEngine::new(gateway, StoreHandle::default());
    engine.bind(config.principal());
    commands::execute(&mut engine, config, command).await
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_edit_with_repeated_tags() {
        let cli = Cli::try_parse_from([
            "klartext", "edit", "abc", "--tag", "work", "--tag", "home", "--priority", "high",
        ])
        .expect("valid arguments");
        match cli.command {
            Commands::Edit(args) => {
                assert_eq!(args.tag, vec!["work", "home"]);
                assert_eq!(args.priority, Some(crate::model::Priority::High));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_status() {
        assert!(Cli::try_parse_from(["klartext", "status", "abc", "later"]).is_err());
    }
}
