use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use catalog_gate::client::{
    ClientLimitConfig, ClientLimiter, FileStorage, KeyValueStorage, LimitStatus, RemoteDecision,
    RemoteLimiter,
};
use catalog_gate::clock::SystemClock;
use catalog_gate::config::{Args, AttemptArgs, Command, ServeArgs};
use catalog_gate::handlers::router;
use catalog_gate::models::{ActionType, RateLimit};
use catalog_gate::rate_limit::ServerLimiter;
use catalog_gate::security_log::TracingSink;
use catalog_gate::state::AppState;
use catalog_gate::sweeper::Sweeper;

#[tokio::main]
async fn main() -> Result<()> {
    // parse cli arguments
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&args.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    match args.command {
        Command::Serve(serve_args) => serve(serve_args).await,
        Command::Attempt(attempt_args) => attempt(attempt_args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let sink = Arc::new(TracingSink::new(args.environment.clone()));
    let limiter = Arc::new(ServerLimiter::new(Arc::new(SystemClock), sink.clone()));
    let state = Arc::new(AppState::new(limiter.clone(), sink));

    // one sweeper for the lifetime of the process
    let sweeper = Sweeper::new();
    sweeper
        .start(limiter, Duration::from_secs(args.cleanup_interval))
        .await;

    let app = router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(%addr, environment = %args.environment, "rate limit gate listening");
    for action in ActionType::ALL {
        let limit = action.limit();
        info!(
            action = action.as_str(),
            max_actions = limit.max_actions(),
            window_ms = limit.window_ms(),
            "limit configured"
        );
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.stop().await;
    info!("shut down");
    Ok(())
}

async fn attempt(args: AttemptArgs) -> Result<()> {
    let limit = RateLimit::new(args.max_actions, args.window_ms)?;
    let config = ClientLimitConfig::new(limit, args.key);
    let limiter = ClientLimiter::new(
        FileStorage::new(args.storage_dir),
        config,
        Arc::new(SystemClock),
    );

    let mut out = std::io::stdout();
    // local gate first: instant, works offline
    if !local_gate(&limiter, args.action, &args.label, &mut out)? {
        return Ok(());
    }

    let remote = RemoteLimiter::new(reqwest::Client::new(), &args.server);
    let decision = remote.check(args.action).await;
    report_server(&decision, &args.label, &mut out)?;
    Ok(())
}

// Prints the local verdict right away, before the server is asked
fn local_gate<K: KeyValueStorage>(
    limiter: &ClientLimiter<K>,
    action: ActionType,
    label: &str,
    out: &mut impl Write,
) -> Result<bool> {
    if limiter.record_action() {
        writeln!(out, "{}: allowed locally, checking server", action)?;
        out.flush()?;
        Ok(true)
    } else {
        writeln!(out, "{}", limiter.status().label(label))?;
        Ok(false)
    }
}

fn report_server(decision: &RemoteDecision, label: &str, out: &mut impl Write) -> Result<()> {
    match decision {
        RemoteDecision::Allowed => writeln!(out, "server: allowed")?,
        RemoteDecision::Denied { reset_in_ms, message } => {
            writeln!(out, "server: {}", message)?;
            let status = LimitStatus {
                limited: true,
                reset_in_ms: *reset_in_ms,
            };
            writeln!(out, "{}", status.label(label))?;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
