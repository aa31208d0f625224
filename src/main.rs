mod calc;
mod config;
mod db;
mod filter;
mod ipc;
mod model;
mod refresh;
mod store;
#[cfg(test)]
mod tests_proptest;

use std::io::{self, BufRead};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    // stdout carries the protocol; logs go to stderr.
    let filter = EnvFilter::try_from_env("GRADEBOOKD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(false),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow::anyhow!("failed to initialize tokio runtime: {e}"))?;

    let outbox = ipc::Outbox::stdout()
        .map_err(|e| anyhow::anyhow!("failed to start output writer: {e}"))?;
    let mut state = ipc::AppState::new(runtime.handle().clone(), outbox.clone());
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gradebookd ready");

    let stdin = io::stdin();
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
                tracing::warn!(error = %e, "unparseable request line");
                outbox.send(&ipc::err("", "bad_json", e.to_string(), None));
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        outbox.send(&resp);
    }

    tracing::info!("stdin closed; shutting down");
    for (_, handle) in state.refreshes.drain() {
        handle.stop();
        runtime.block_on(handle.join());
    }
    outbox.flush();
    Ok(())
}
