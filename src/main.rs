mod backup;
mod chart;
mod config;
mod db;
mod evaluation;
mod imaging;
mod ipc;
mod model;
mod state;

use clap::Parser;
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    // stdout carries the IPC protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "graderd=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = config::Args::parse();
    let evaluator = args.build_evaluator()?;
    if evaluator.is_none() {
        warn!("no evaluator configured; students.analyze will be unavailable");
    }

    let mut state = ipc::AppState {
        workspace: None,
        controller: state::Controller::new(),
        evaluator,
        normalize: args.normalize_options(),
    };

    if let Some(path) = args.workspace.clone() {
        if let Err(e) = ipc::select_workspace(&mut state, path) {
            warn!(error = %format!("{e:#}"), "startup workspace could not be opened");
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "graderd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    info!("stdin closed; shutting down");
    Ok(())
}
