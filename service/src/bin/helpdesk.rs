//! Notification worker process.
//!
//! Connects to `PostgreSQL`, Redis and Redpanda, then drains the notification queue
//! into the SMTP relay until Ctrl-C or SIGTERM.

use anyhow::{Context, Result};
use helpdesk::app::Helpdesk;
use helpdesk::config::Config;
use helpdesk::retry::RetryPolicy;
use helpdesk::smtp::SmtpMailer;
use helpdesk::worker::EmailWorker;
use helpdesk_core::environment::SystemClock;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "helpdesk=info,helpdesk_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Invalid configuration")?;

    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.server.metrics_port));
    helpdesk::metrics::install(metrics_addr).context("Failed to start metrics exporter")?;

    let helpdesk = Helpdesk::connect(&config)
        .await
        .context("Failed to connect to backends")?;

    match helpdesk.dead_letters.count_pending().await {
        Ok(0) => {}
        Ok(pending) => tracing::warn!(pending, "Dead-lettered notifications awaiting review"),
        Err(e) => tracing::warn!(error = %e, "Could not count dead-lettered notifications"),
    }

    let mailer = SmtpMailer::new(&config.smtp).context("Invalid SMTP settings")?;

    let (worker, shutdown) = EmailWorker::new(
        helpdesk.broker.clone(),
        config.redpanda.topology(),
        mailer,
        Arc::new(helpdesk.dead_letters.clone()),
        Arc::new(SystemClock),
    );
    let worker = worker
        .with_ack_mode(config.worker.ack_mode)
        .with_retry_policy(
            RetryPolicy::builder()
                .max_retries(config.worker.max_retries)
                .build(),
        );
    let handle = worker.spawn();

    shutdown_signal().await;
    tracing::info!("Shutting down");

    let _ = shutdown.send(true);
    handle.await.context("Email worker panicked")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
