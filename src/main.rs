use anyhow::Result;
use study_assistant::{
    api::{cors_layer, create_router, AppState},
    config::{Config, LoggingConfig},
    log_system_event,
    LLMService,
};
use tower::ServiceBuilder;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _guard = setup_logging(&config.logging)?;

    config.log_configuration_summary();
    config.validate()?;

    log_system_event!(startup, component = "server", "Starting study assistant server");

    let llm_service = LLMService::from_config(&config.llm)?;
    info!(
        provider = llm_service.provider_name(),
        model = llm_service.model_name(),
        "Initialized LLM service"
    );

    let state = AppState::new(llm_service, &config.storage, config.generation);
    state.documents.ensure_upload_dir().await?;

    let app = create_router(state).layer(
        ServiceBuilder::new().layer(cors_layer(config.server.allowed_origins.as_deref())),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
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
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt;

    let env_filter = EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| EnvFilter::new("info,study_assistant=debug"));

    let console_layer = config.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
    });

    // File output with daily rotation (no ANSI colors for files)
    let (file_layer, guard) = if config.file_enabled {
        std::fs::create_dir_all(&config.log_directory).unwrap_or_else(|e| {
            eprintln!("Warning: Could not create logs directory: {}", e);
        });

        let file_appender = tracing_appender::rolling::daily(&config.log_directory, "study-assistant.log");
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

        let layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(non_blocking_file);

        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    info!(
        log_directory = %config.log_directory,
        file_enabled = config.file_enabled,
        console_enabled = config.console_enabled,
        "Logging initialized"
    );

    Ok(guard)
}
