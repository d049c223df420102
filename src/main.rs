use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let settings = carebridge::config::Settings::from_env()?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "server",
        "carebridge starting: RUST_LOG='{}', http_port={}, session_ttl={}s, cookie='{}', header='{}', sweep_interval={}s",
        rust_log, settings.http_port, settings.session_ttl_secs, settings.cookie_name, settings.header_name, settings.sweep_interval_secs
    );

    carebridge::server::run(settings).await
}
