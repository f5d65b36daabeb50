use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agora_api::config::ServerConfig;
use agora_api::router::build_app;
use agora_api::state::AppState;
use agora_api::tasks;
use agora_db::PgStore;
use agora_events::delivery::{select_provider, SmtpConfig};
use agora_events::{
    AuthorEnricher, DlqContext, DlqRegistry, EmailQueue, EventBus, EventsConfig,
    MessageKind, Notifier, RetentionPurger, TaskDispatcher, TaskRegistry,
};
use agora_worker::{
    run_task_worker, AuditWorker, BusStatsReporter, ContentRollupWorker, PanicPolicy,
    SearchWorker, WorkerSet,
};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "agora_api=debug,agora_events=debug,agora_worker=debug,tower_http=info".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let events = EventsConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = agora_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    agora_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    agora_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store = Arc::new(PgStore::new(pool.clone()));

    // --- Email provider ---
    let mailer = select_provider(
        &events.email_provider,
        SmtpConfig::from_env().as_ref(),
        &events.email_from,
    )
    .expect("Invalid email provider configuration");

    // --- Dead-letter queue ---
    let dlq_context = DlqContext {
        store: Some(store.clone()),
        file_path: events.dlq_file.clone(),
        dir_path: events.dlq_dir.clone(),
        mailer: mailer.clone(),
        admin_emails: events.admin_emails.clone(),
        from_address: events.email_from.clone(),
    };
    let dead_letters = DlqRegistry::with_defaults().resolve_or_log(&events.dlq_provider, &dlq_context);
    tracing::info!(providers = %events.dlq_provider, "Dead-letter queue configured");

    // --- Event bus, task registry, dispatcher ---
    let bus = Arc::new(EventBus::new(events.bus_capacity).with_dead_letters(Arc::clone(&dead_letters)));
    let registry = Arc::new(TaskRegistry::new());
    tasks::register_forum_tasks(&registry);
    tracing::info!(tasks = ?registry.names(), "Task types registered");

    let dispatcher = Arc::new(
        TaskDispatcher::new(Arc::clone(&registry), Arc::clone(&bus), Arc::clone(&dead_letters))
            .with_enricher(Arc::new(AuthorEnricher::new(store.clone()))),
    );

    // --- Workers ---
    let cancel = CancellationToken::new();
    let mut workers = WorkerSet::new(cancel.clone(), Arc::clone(&dead_letters), PanicPolicy::Exit);

    let notifier = Notifier::new(
        store.clone(),
        Arc::new(tasks::forum_templates()),
        Arc::clone(&bus),
        Arc::clone(&dead_letters),
        events.notifier(),
    );
    workers.spawn(
        "notifier",
        notifier.run(bus.subscribe(MessageKind::Task, "notifier"), cancel.clone()),
    );

    let email_queue = EmailQueue::new(
        store.clone(),
        mailer,
        Arc::clone(&dead_letters),
        events.email_queue(),
    );
    workers.spawn(
        "email-queue",
        email_queue.run(
            Some(bus.subscribe(MessageKind::EmailQueued, "email-queue")),
            cancel.clone(),
        ),
    );

    let purger = RetentionPurger::new(store.clone(), events.purge_interval, events.retention());
    workers.spawn("purger", purger.run(cancel.clone()));

    workers.spawn(
        "audit",
        run_task_worker(
            AuditWorker::new(store.clone()),
            bus.subscribe(MessageKind::Task, "audit"),
            cancel.clone(),
        ),
    );
    workers.spawn(
        "search",
        run_task_worker(
            SearchWorker::new(store.clone()),
            bus.subscribe(MessageKind::Task, "search"),
            cancel.clone(),
        ),
    );
    workers.spawn(
        "content-rollup",
        run_task_worker(
            ContentRollupWorker::new(store.clone()),
            bus.subscribe(MessageKind::Task, "content-rollup"),
            cancel.clone(),
        ),
    );

    let reporter = BusStatsReporter::new(Arc::clone(&bus), events.bus_stats_interval);
    workers.spawn("bus-stats", reporter.run(cancel.clone()));

    tracing::info!(count = workers.len(), "Workers started");

    // --- App ---
    let state = AppState {
        config: Arc::new(config.clone()),
        pool: Some(pool),
        bus: Arc::clone(&bus),
        dispatcher: Arc::clone(&dispatcher),
    };
    // Forum pages mount here; the task-event middleware wraps them.
    let app = build_app(state, Router::new());

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    bus.shutdown();
    let dropped = dispatcher.drain_to_dead_letters().await;
    if dropped > 0 {
        tracing::warn!(dropped, "Deferred task events recorded as dead letters");
    }

    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    if let Err(e) = workers.shutdown(grace).await {
        tracing::error!(error = %e, "Workers did not shut down cleanly");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT, SIGTERM, or the worker set cancelling itself.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
        () = cancel.cancelled() => {
            tracing::warn!("Workers cancelled, starting graceful shutdown");
        }
    }
}
