//! FireWatch wildfire risk service - Backend Server

use std::{net::SocketAddr, sync::Arc};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wildfire_risk_backend::{
    create_app,
    external::{ImageryClient, WeatherClient},
    services::{PipelineSettings, RiskPipeline},
    AppState, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "firewatch_server=debug,wildfire_risk_backend=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting FireWatch Wildfire Risk Server");
    tracing::info!("Environment: {}", config.environment);

    // One-time catalog handshake; every run reuses the established client
    tracing::info!("Connecting to imagery catalog...");
    let imagery = ImageryClient::connect(&config.imagery).await?;
    let session = Arc::new(imagery.session().clone());

    let weather = WeatherClient::new(&config.weather)?;

    let pipeline = RiskPipeline::new(
        Arc::new(imagery),
        Arc::new(weather),
        PipelineSettings::from_config(&config),
    );

    // Create application state
    let state = AppState {
        config: Arc::new(config.clone()),
        pipeline: Arc::new(pipeline),
        imagery_session: Some(session),
    };

    // Build application
    let app = create_app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
