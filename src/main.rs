use anyhow::Result;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use grading_webhook::{
    api::{create_router, AppState, GatewaySettings},
    BatchService, Config, DeliveryService, GradingEngineFactory, GradingService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging with file output before anything else logs
    let _guard = setup_logging()?;

    let config = Config::from_env()?;
    config.validate()?;

    info!("Starting Grading Webhook Server...");

    // Construct the grading engine once and thread it through explicitly
    let engine = GradingEngineFactory::create_engine(
        config.llm.provider,
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
    );
    info!(
        provider = engine.provider_name(),
        model = engine.model_name(),
        "Initialized grading engine"
    );

    let grading_service = GradingService::new(engine, config.grading_settings());
    let delivery_service = DeliveryService::new(config.delivery_settings());
    let batch_service = BatchService::new(
        grading_service,
        delivery_service,
        config.grading.max_parallel_tasks,
    );

    let state = AppState {
        batch_service,
        settings: GatewaySettings {
            callback_url: config.webhook.callback_url.clone(),
            max_parallel_tasks: config.grading.max_parallel_tasks,
            max_retries: config.grading.max_retries,
        },
    };

    let app = create_router(state).layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn setup_logging() -> Result<WorkerGuard> {
    use std::fs;
    use tracing_subscriber::fmt;

    // Create logs directory if it doesn't exist
    fs::create_dir_all("logs").unwrap_or_else(|e| {
        eprintln!("Warning: Could not create logs directory: {}", e);
    });

    // Configure log level from environment variable
    let default_log_level = "info,grading_webhook=debug";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_log_level));

    // Set up file appender with daily rotation
    let file_appender = tracing_appender::rolling::daily("logs", "grading-webhook.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true);

    // No ANSI colors for files
    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(non_blocking_file);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized - writing to logs/grading-webhook.log with daily rotation");

    Ok(guard)
}
