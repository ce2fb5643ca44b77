use anyhow::Result;
use relay_panel::config::AppConfig;
use relay_panel::model::DeviceConfig;
use relay_panel::web::{self, AppState};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = AppConfig::from_env();
    let device = DeviceConfig::default();

    tracing::info!(
        "Starting relay panel on {} (mode: {})",
        config.http_bind,
        device.sys.mode
    );

    let state = AppState::new(config, device);
    {
        let sys = state.device.read().await.sys.clone();
        state.runner.start(&sys).await;
    }

    web::serve(state.clone()).await?;

    state.runner.stop().await;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let _ = fmt().with_env_filter(env_filter).try_init();
}
