use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use rust_listing_scrapper::{
    config::Config,
    api::routes::create_router,
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rust_listing_scrapper=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let server_addr = config.server_addr;
    tracing::info!(
        fetch_strategy = ?config.fetch_strategy,
        synth_contract = ?config.synth_contract,
        remote_extractor = config.api_base_url.is_some(),
        "configuration loaded"
    );

    let app_state = AppState::from_config(&config)?;
    let app = create_router(app_state);

    let listener = TcpListener::bind(server_addr).await?;
    tracing::info!("Listening on {}", server_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
