use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use tether_infra::config::{DATABASE_URL_VAR, INSTALLED_INTEGRATIONS_VAR, TARGET_LABEL_VAR};
use tether_infra::{InMemoryStore, IntegrationService, PostgresStore, Settings};
use tether_integrations::{Catalog, Registry};

#[derive(Debug, Parser)]
#[command(name = "tether")]
#[command(about = "Integration registry maintenance")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings shared by every command; flags override the environment.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Comma-separated catalog identifiers of the installed integrations.
    #[arg(long, env = INSTALLED_INTEGRATIONS_VAR, default_value = "")]
    pub installed_integrations: String,

    /// Label of the target key in installation forms.
    #[arg(long, env = TARGET_LABEL_VAR)]
    pub target_label: Option<String>,

    /// Postgres connection string. In-memory stores are used without it.
    #[arg(long, env = DATABASE_URL_VAR)]
    pub database_url: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create or approve the internal application of every non-local
    /// integration and revoke those no longer registered.
    SyncRegistry,
    /// Print the catalog identifiers that can be installed.
    ListCatalog,
    /// Print an internal-only token for a non-local integration.
    InternalToken {
        /// Integration name, e.g. `shopify`.
        integration: String,
    },
}

impl ConfigArgs {
    fn settings(&self) -> anyhow::Result<Settings> {
        Settings::from_lookup(|key| match key {
            k if k == INSTALLED_INTEGRATIONS_VAR => Some(self.installed_integrations.clone()),
            k if k == TARGET_LABEL_VAR => self.target_label.clone(),
            k if k == DATABASE_URL_VAR => self.database_url.clone(),
            _ => None,
        })
        .context("invalid settings")
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::ListCatalog => {
            for id in Catalog::builtin().ids() {
                println!("{id}");
            }
            Ok(())
        }
        Command::SyncRegistry => {
            let service = service(&cli.config).await?;
            let report = service
                .sync_with_registry()
                .context("registry sync failed")?;
            info!(
                created = report.created.len(),
                updated = report.updated.len(),
                revoked = report.revoked.len(),
                "registry synced"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::InternalToken { integration } => {
            let settings = cli.config.settings()?;
            if settings.database_url.is_none() {
                bail!("{DATABASE_URL_VAR} is required to issue a usable token");
            }
            let service = service(&cli.config).await?;
            let application = service
                .get_by_internal_integration(integration.as_str())
                .with_context(|| format!("no internal application for {integration}"))?;
            let token = service
                .create_internal_token(&application)
                .context("failed to issue the internal token")?;
            println!("{}", token.token);
            Ok(())
        }
    }
}

async fn service(config: &ConfigArgs) -> anyhow::Result<IntegrationService> {
    let settings = config.settings()?;
    let registry = Arc::new(registry(&settings)?);

    let service = match &settings.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url)
                .await
                .context("failed to connect to postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to create the schema")?;
            IntegrationService::with_store(registry, Arc::new(store))
        }
        None => {
            warn!("{DATABASE_URL_VAR} not set; changes will not be persisted");
            IntegrationService::with_store(registry, InMemoryStore::arc())
        }
    };
    Ok(service.with_target_label(settings.target_label))
}

fn registry(settings: &Settings) -> anyhow::Result<Registry> {
    settings
        .build_registry(&Catalog::builtin())
        .context("failed to build the integration registry")
}
