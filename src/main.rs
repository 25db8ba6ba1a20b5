use anyhow::Context;
use oh_data_source::{AppState, Config, JsonFileMemberRepository};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // LOG_FORMAT=json for production, pretty (or unset) for development
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "oh_data_source=info,tower_http=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(log_format = %log_format, "Starting Open Humans data source");

    let config = Arc::new(Config::from_env_or_file().context("Failed to load configuration")?);
    info!(
        platform = %config.platform_base_url,
        delete_policy = ?config.delete_policy,
        "Configuration loaded"
    );

    let repository = JsonFileMemberRepository::open(&config.member_store_path)
        .await
        .context("Failed to open member store")?;

    let state = AppState::new(config, Arc::new(repository))?;
    oh_data_source::run_server(state).await?;

    Ok(())
}
