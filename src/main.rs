//! launchwatch - watch launches, browser tabs and servers from a script
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::{debug, error, info};

use launchwatch_core::logging::{self, Mirror};
use launchwatch_core::ResultExt;
use launchwatch_model::{init_config_dir, load_settings, load_settings_file, ModelSettings};

/// launchwatch - replay debugger deliveries and print model events
#[derive(Parser, Debug)]
#[command(name = "launchwatch")]
#[command(about = "Replay launch, tab and server deliveries as JSON events", long_about = None)]
struct Args {
    /// Also print warnings and errors on stderr
    #[arg(long, global = true)]
    log_stderr: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a script of delivery calls and print events as NDJSON
    Replay {
        /// Script to replay (one JSON call per line); stdin when omitted
        #[arg(value_name = "SCRIPT")]
        script: Option<PathBuf>,

        /// Project whose .launchwatch/config.toml to load
        #[arg(long, value_name = "PATH", conflicts_with = "config")]
        project: Option<PathBuf>,

        /// Settings file to load; it must exist and parse
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Write a default .launchwatch/config.toml
    Init {
        /// Project directory (defaults to the current directory)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let mirror = if args.log_stderr {
        Mirror::Stderr
    } else {
        Mirror::None
    };
    let log_file = logging::init(mirror)?;
    debug!("Arguments: {:?}", args);

    let result = match args.command {
        Command::Replay {
            script,
            project,
            config,
        } => match settings(project, config.as_deref()) {
            Ok(settings) => replay(script.as_deref(), settings).await,
            Err(e) => Err(e.into()),
        },
        Command::Init { path } => {
            let path = path.unwrap_or_else(current_dir);
            init_config_dir(&path)?;
            eprintln!("Wrote {}", path.join(".launchwatch").join("config.toml").display());
            Ok(())
        }
    };

    if let Err(ref e) = result {
        error!("Application error: {:?}", e);
        eprintln!("See {} for details", log_file.display());
    }
    info!("launchwatch exiting");
    result
}

/// An explicit `--config` file is strict; a project directory falls back to defaults
fn settings(
    project: Option<PathBuf>,
    config: Option<&Path>,
) -> launchwatch_core::Result<ModelSettings> {
    let settings = match config {
        Some(file) => load_settings_file(file)
            .with_context(|| format!("loading settings from {}", file.display()))?,
        None => load_settings(&project.unwrap_or_else(current_dir)),
    };
    let source = config.map_or_else(|| "project".to_string(), |f| f.display().to_string());
    logging::log_settings(&source, &settings);
    Ok(settings)
}

async fn replay(script: Option<&Path>, settings: ModelSettings) -> color_eyre::Result<()> {
    let mut stdout = std::io::stdout();

    let stats = match script {
        Some(path) => {
            info!("Replaying {}", path.display());
            let file = tokio::fs::File::open(path).await?;
            launchwatch::run_replay(BufReader::new(file), &mut stdout, settings).await?
        }
        None => {
            info!("Replaying from stdin");
            let stdin = tokio::io::stdin();
            launchwatch::run_replay(BufReader::new(stdin), &mut stdout, settings).await?
        }
    };

    if stats.errors > 0 {
        eprintln!("{} of {} calls failed", stats.errors, stats.calls);
    }
    Ok(())
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
