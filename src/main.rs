use index_price_collector::database::{establish_connection_pool, get_conn, run_migrations};
use index_price_collector::{
    create_router, DeribitClient, FetchAndPersistPipeline, PriceObservationRepository,
    RecurringTaskTrigger, Settings,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_cron_scheduler::JobScheduler;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "index_price_collector=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;

    tracing::info!("🗄️  Initializing PostgreSQL connection...");
    let pool = establish_connection_pool(&settings.database)?;
    let applied = run_migrations(&pool)?;
    tracing::info!("✅ Database ready ({} migrations applied)", applied);

    // Wire components explicitly: client -> repository -> pipeline -> trigger
    let client = Arc::new(DeribitClient::new(&settings.provider)?);

    let pool_clone = pool.clone();
    let repository = Arc::new(PriceObservationRepository::new(move || get_conn(&pool_clone)));

    let pipeline = Arc::new(
        FetchAndPersistPipeline::new(client, repository)
            .with_max_concurrency(settings.fetch.max_concurrency),
    );

    let trigger = Arc::new(RecurringTaskTrigger::new(
        pipeline,
        settings.fetch.instruments.clone(),
        settings.schedule,
    ));

    let mut scheduler = initialize_scheduler(Arc::clone(&trigger)).await?;

    let app = create_router(trigger);
    let listener = tokio::net::TcpListener::bind(settings.bind_addr.as_str()).await?;

    tracing::info!("🚀 Index price collector running on http://{}", settings.bind_addr);
    tracing::info!("📊 Health check: http://{}/api/v1/health", settings.bind_addr);
    tracing::info!("📚 Swagger UI: http://{}/swagger-ui", settings.bind_addr);
    tracing::info!("   Provider: {}", settings.provider.base_url);
    tracing::info!("   Instruments: {:?}", settings.fetch.instruments);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down scheduler...");
    scheduler.shutdown().await?;

    Ok(())
}

/// Initialize the cron scheduler with the recurring fetch job
async fn initialize_scheduler(
    trigger: Arc<RecurringTaskTrigger>,
) -> Result<JobScheduler, Box<dyn std::error::Error>> {
    tracing::info!("⏰ Initializing scheduler...");

    let scheduler = JobScheduler::new().await?;
    trigger.register(&scheduler).await?;
    scheduler.start().await?;

    tracing::info!("✅ Scheduler started");

    Ok(scheduler)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
