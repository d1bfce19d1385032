use anyhow::Result;
use taskdeck_web_service::build_router;
use taskdeck_web_service::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let bind_addr = config.bind_addr;
    let app = build_router(config);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "taskdeck web service listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
