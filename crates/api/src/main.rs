use std::sync::Arc;

use anyhow::Context as _;

use tether_infra::Settings;
use tether_integrations::Catalog;
use tether_integrations::registry::global;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tether_observability::init();

    let settings = Settings::from_env().context("failed to load settings")?;
    let registry = settings
        .build_registry(&Catalog::builtin())
        .context("failed to build the integration registry")?;
    let registry = global::init(registry).context("failed to install the integration registry")?;
    tracing::info!(integrations = registry.len(), "integration registry ready");

    let services = tether_api::app::services::build_services(&settings, registry)
        .await
        .context("failed to set up storage")?;
    let app = tether_api::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
