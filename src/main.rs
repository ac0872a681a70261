use anyhow::Result;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use study_companion::{
    api::{create_router, AppState},
    config::{Config, LoggingConfig},
    log_system_event, LLMProviderFactory, SqliteStore, StudyCompanion, StudyModuleGenerator,
    StudyStore, TimerTrigger,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _guard = setup_logging(&config.logging)?;
    config.log_configuration_summary();
    config.validate()?;

    log_system_event!(startup, component = "server", "Starting study companion");

    let backend = SqliteStore::new(&config.storage.url).await?;
    let store = StudyStore::new(Arc::new(backend));
    info!("Database initialized successfully");

    let (trigger, mut fired) = TimerTrigger::new();

    let provider = LLMProviderFactory::create_provider(
        config.llm.provider,
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
    );
    info!(
        provider = ?config.llm.provider,
        model = %provider.model_name(),
        "Initialized generation service"
    );

    let generator = StudyModuleGenerator::new(Arc::new(provider)).with_timeout(config.llm.timeout);
    let companion = Arc::new(StudyCompanion::new(generator, store, Arc::new(trigger)));

    let reviews = companion.clone();
    tokio::spawn(async move {
        while let Some(item_id) = fired.recv().await {
            match reviews.review_due(&item_id).await {
                Ok(Some((item, due))) => info!(
                    item_id = %item_id,
                    title = %item.title,
                    interval_days = due.schedule.interval_days,
                    repetitions = due.schedule.repetitions,
                    "Review is due"
                ),
                Ok(None) => warn!(item_id = %item_id, "Review fired for an item no longer scheduled"),
                Err(e) => warn!(item_id = %item_id, error = %e, "Could not resolve due review"),
            }
        }
    });

    let restored = companion.scheduler().restore_triggers().await?;
    info!(count = restored, "Review timers restored");

    let app = create_router(AppState::shared(companion))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = config.server.address();
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log_system_event!(shutdown, component = "server", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use std::fs;
    use tracing_subscriber::fmt;

    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = config.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
    });

    let mut guard = None;
    let file_layer = if config.file_enabled {
        fs::create_dir_all(&config.log_directory).unwrap_or_else(|e| {
            eprintln!("Warning: Could not create logs directory: {}", e);
        });

        // Daily rotation; files without ANSI colors
        let file_appender = tracing_appender::rolling::daily(&config.log_directory, "study-companion.log");
        let (non_blocking_file, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        Some(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(non_blocking_file),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        console = config.console_enabled,
        file = config.file_enabled,
        directory = %config.log_directory,
        "Logging initialized"
    );

    Ok(guard)
}
