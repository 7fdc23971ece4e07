use std::sync::Arc;

use gerrit_events::config::Config;
use gerrit_events::dependency::{DependencyGate, StaticJobDirectory};
use gerrit_events::events::EventContext;
use gerrit_events::handler::GerritHandler;
use gerrit_events::memory::BuildMemory;
use gerrit_events::run_listener::{LoggingNotifier, RunListener};
use gerrit_events::server::{AppState, build_router};
use gerrit_events::stream::{ReconnectConfig, StreamConnection, TcpConnector};
use gerrit_events::worker::{GerritEventListener, ListenerResult};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Logs every event that makes it through classification.
struct EventLogger;

impl GerritEventListener for EventLogger {
    fn gerrit_event(&self, ctx: &EventContext) -> ListenerResult {
        info!(event = %ctx.event, "Received event");
        Ok(())
    }

    fn name(&self) -> &str {
        "event-logger"
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gerrit_events=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let provider = config.provider();
    info!(%provider, "Starting");

    let handler = GerritHandler::new(
        config.receiving_workers,
        config.sending_workers,
        config.queue_capacity,
    );
    let memory = Arc::new(BuildMemory::new());
    let run_listener = Arc::new(RunListener::new(
        Arc::clone(&memory),
        LoggingNotifier,
        Arc::clone(handler.send_queue()),
    ));
    let jobs = StaticJobDirectory::from_dependencies(&config.job_dependencies);
    info!(jobs = config.job_dependencies.len(), "Loaded job dependencies");
    let gate = Arc::new(
        DependencyGate::new(Arc::new(jobs), run_listener)
            .with_schedule_delay(config.build_schedule_delay),
    );
    handler.add_listener(gate);
    handler.add_listener(Arc::new(EventLogger));

    let connection = StreamConnection::new(
        TcpConnector::new(&config.host, config.port),
        provider,
        handler.work_queue().clone(),
        config.watchdog.clone(),
        ReconnectConfig::DEFAULT,
    );
    connection.start();

    let app = build_router(AppState::new(memory, connection.state()));
    let listener = match tokio::net::TcpListener::bind(config.http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %config.http_addr, error = %e, "Could not bind diagnostics server");
            connection.shutdown().await;
            handler.shutdown().await;
            std::process::exit(1);
        }
    };
    info!("listening on {}", config.http_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Diagnostics server failed");
    }

    connection.shutdown().await;
    handler.shutdown().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
