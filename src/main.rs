mod calc;
mod db;
mod departments;
mod editor;
mod error;
mod export;
mod fields;
mod followups;
mod ipc;
mod logging;
mod model;
mod query;
mod store;
mod uploads;
mod wizard;

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use logging::{LogConfig, LogFormat};

/// Admissions desk sidecar: one JSON request per stdin line, one JSON
/// response per stdout line.
#[derive(Debug, Parser)]
#[command(name = "admissiond", version, about)]
struct Cli {
    /// Workspace directory to open at start.
    #[arg(long, env = "ADMISSIOND_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Records per page for `admissions.list`.
    #[arg(long, env = "ADMISSIOND_PAGE_SIZE", default_value_t = query::DEFAULT_PAGE_SIZE)]
    page_size: usize,

    #[arg(long, env = "ADMISSIOND_LOG_LEVEL", default_value = "info", value_parser = logging::parse_level)]
    log_level: tracing::Level,

    #[arg(long, env = "ADMISSIOND_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(
        &LogConfig::default()
            .with_level(cli.log_level)
            .with_format(cli.log_format),
    )?;

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
        page_size: cli.page_size.max(1),
    };
    if let Some(path) = cli.workspace {
        state.db = Some(db::open_db(&path)?);
        tracing::info!(workspace = %path.display(), "workspace opened");
        state.workspace = Some(path);
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request line");
                ipc::err("", "bad_json", e.to_string(), None)
            }
        };
        writeln!(stdout, "{}", serde_json::to_string(&resp)?)?;
        stdout.flush()?;
    }
    Ok(())
}
