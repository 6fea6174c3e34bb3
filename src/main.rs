//! # mindcare CLI
//!
//! ## Usage
//!
//! ```bash
//! mindcare --config ./config/mindcare.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mindcare setup` | Create data directories and empty store files |
//! | `mindcare build` | Ingest the corpus and build (or load) the vector index |
//! | `mindcare serve` | Start the JSON HTTP server |
//! | `mindcare chat <username>` | Chat with the agent in the terminal |
//! | `mindcare scores <username>` | Export a user's score records |
//!
//! A missing config file means built-in defaults. `OPENAI_API_KEY` may be
//! set in a `.env` file. Logs go to stderr and follow `RUST_LOG`.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dialoguer::Password;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mindcare::config::{self, Config};
use mindcare::export::{self, ExportFormat};
use mindcare::models::ScoreLabel;
use mindcare::progress::ProgressMode;
use mindcare::scores::ScoreFilter;
use mindcare::service::CareService;
use mindcare::{build, server, setup};

/// mindcare: a mental-health support chat backend with a DSM-5 retrieval agent.
#[derive(Parser)]
#[command(name = "mindcare", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mindcare.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create data directories and empty store files. Safe to re-run.
    Setup,

    /// Load, split, summarize and embed the source documents, then build
    /// the vector index or load the existing one.
    Build {
        /// Progress output on stderr: human, json or off.
        /// Defaults to human when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Start the JSON HTTP server on `[server].bind`.
    Serve,

    /// Interactive chat for an existing user. The password is read from stdin.
    Chat {
        username: String,
    },

    /// Export a user's score records.
    Scores {
        username: String,

        /// Output format: json or csv.
        #[arg(long, default_value = "json")]
        format: String,

        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Only records on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Only records on or before this date (YYYY-MM-DD).
        #[arg(long)]
        until: Option<String>,

        /// Only records with this label; repeatable.
        #[arg(long = "label")]
        labels: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Setup => {
            let report = setup::run_setup(&cfg)?;
            println!(
                "Setup complete: {} directories and {} files created.",
                report.created_dirs.len(),
                report.created_files.len()
            );
        }
        Commands::Build { progress } => {
            let mode = match progress.as_deref() {
                Some(s) => match ProgressMode::parse(s) {
                    Some(mode) => mode,
                    None => bail!("--progress must be human, json or off, got '{}'", s),
                },
                None => ProgressMode::default_for_tty(),
            };
            let reporter = mode.reporter();
            let report = build::run_build(&cfg, reporter.as_ref()).await?;
            print!("{}", report.render());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Chat { username } => {
            run_chat(&cfg, &username).await?;
        }
        Commands::Scores {
            username,
            format,
            output,
            since,
            until,
            labels,
        } => {
            let filter = ScoreFilter {
                since: parse_date(since.as_deref(), "--since")?,
                until: parse_date(until.as_deref(), "--until")?,
                labels: labels
                    .iter()
                    .map(|l| {
                        ScoreLabel::parse(l).with_context(|| format!("unknown score label '{}'", l))
                    })
                    .collect::<Result<Vec<_>>>()?,
            };
            let format = ExportFormat::parse(&format)?;
            export::run_export(&cfg, &username, &filter, format, output.as_deref())?;
        }
    }

    Ok(())
}

fn parse_date(value: Option<&str>, flag: &str) -> Result<Option<NaiveDate>> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d")
                .with_context(|| format!("{} must be YYYY-MM-DD, got '{}'", flag, v))
        })
        .transpose()
}

/// Terminal chat loop. `/clear` wipes the history, `/summary` shows score
/// statistics, `/quit` or end of input leaves.
async fn run_chat(cfg: &Config, username: &str) -> Result<()> {
    let service = CareService::open(cfg).await?;
    if !service.index_available() {
        eprintln!("warning: no index loaded, the dsm5 tool is unavailable (run `mindcare build`)");
    }

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    let password = if atty::is(atty::Stream::Stdin) {
        Password::new()
            .with_prompt(format!("password for {}", username))
            .interact()?
    } else {
        // Piped input carries the password on its first line.
        lines.next().transpose()?.unwrap_or_default()
    };
    let session = service
        .login(username, password.trim_end())
        .context("login failed")?;

    for message in service.get_history(username) {
        println!("[{:?}] {}", message.role, message.content);
    }

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next().transpose()? else {
            break;
        };
        let text = line.trim();
        match text {
            "" => continue,
            "/quit" => break,
            "/clear" => {
                let removed = service.clear_history(username)?;
                println!("cleared {} messages", removed);
            }
            "/summary" => {
                let summary = service.health_summary(username);
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            _ => match service.send_message(&session, text).await {
                Ok(reply) => println!("{}", reply.content),
                Err(e) => eprintln!("error: {}", e),
            },
        }
    }
    Ok(())
}
