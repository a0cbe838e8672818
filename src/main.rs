use anyhow::Result;
use cms_edge_proxy::config::Settings;
use cms_edge_proxy::infrastructure::{init_tracing, log_messages};
use cms_edge_proxy::Application;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;
    init_tracing(&settings.logging);

    info!(
        environment = %settings.application.environment,
        "{}",
        log_messages::application::STARTING
    );

    let app = Application::build(settings)?;
    app.run().await?;

    Ok(())
}
