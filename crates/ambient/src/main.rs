//! # ambient
//!
//! Orchestrator binary. One process per component:
//!
//! - `ambient api`: the Session Lifecycle API
//! - `ambient controller`: the reconciliation controller
//! - `ambient content`: a tenant's content service
//!
//! `ambient api --in-memory` runs all three in one process against an
//! in-memory cluster for local development.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ambient_cluster::{ClusterConnector, InMemoryCluster, RestConnector};
use ambient_controller::{Controller, ControllerContext};
use ambient_core::logging::init_subscriber;
use ambient_server::{AppState, ShutdownCoordinator};
use ambient_settings::{AmbientSettings, load_settings_from_path, settings_path};
use ambient_tenancy::bootstrap::ensure_cluster_roles;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

/// Agentic session orchestrator.
#[derive(Parser, Debug)]
#[command(name = "ambient", version, about = "Agentic session orchestrator")]
struct Cli {
    /// Settings file (defaults to `~/.ambient/settings.json`).
    #[arg(long, global = true, env = "AMBIENT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the Session Lifecycle API.
    Api(ApiArgs),
    /// Run the reconciliation controller.
    Controller,
    /// Serve one tenant's content root.
    Content(ContentArgs),
}

#[derive(Args, Debug)]
struct ApiArgs {
    /// Bind host (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Use an in-memory cluster and run the controller and content service
    /// in this process.
    #[arg(long)]
    in_memory: bool,

    /// Bearer token accepted in in-memory mode.
    #[arg(long, default_value = "dev-token")]
    dev_token: String,

    /// User the dev token authenticates as.
    #[arg(long, default_value = "developer")]
    dev_user: String,

    /// Content service port in in-memory mode.
    #[arg(long, default_value_t = 8081)]
    content_port: u16,

    /// Content root in in-memory mode (overrides settings).
    #[arg(long)]
    root: Option<String>,
}

#[derive(Args, Debug)]
struct ContentArgs {
    /// Bind host (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Directory to serve (overrides settings).
    #[arg(long)]
    root: Option<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<AmbientSettings> {
        let path = self.config.clone().unwrap_or_else(settings_path);
        let mut settings =
            load_settings_from_path(&path).with_context(|| format!("failed to load settings from {}", path.display()))?;
        match &self.command {
            Command::Api(args) => {
                if let Some(host) = &args.host {
                    settings.server.host.clone_from(host);
                }
                if let Some(port) = args.port {
                    settings.server.port = port;
                }
                if args.in_memory {
                    settings.content.host = "127.0.0.1".to_string();
                    settings.content.port = args.content_port;
                    // one local root serves every tenant
                    settings.content.url_template = format!("http://127.0.0.1:{}", args.content_port);
                    if let Some(root) = &args.root {
                        settings.content.root.clone_from(root);
                    }
                }
            }
            Command::Content(args) => {
                if let Some(host) = &args.host {
                    settings.content.host.clone_from(host);
                }
                if let Some(port) = args.port {
                    settings.content.port = port;
                }
                if let Some(root) = &args.root {
                    settings.content.root.clone_from(root);
                }
            }
            Command::Controller => {}
        }
        Ok(settings)
    }
}

fn spawn_controller(
    coordinator: &mut ShutdownCoordinator,
    service: Arc<dyn ambient_cluster::ObjectStore>,
    settings: &AmbientSettings,
) {
    let ctx = ControllerContext::new(service, settings, coordinator.token());
    coordinator.track("controller", tokio::spawn(Controller::new(ctx).run()));
}

fn connect(settings: &AmbientSettings) -> Result<Arc<dyn ClusterConnector>> {
    let connector = RestConnector::from_settings(&settings.cluster).context("failed to configure cluster client")?;
    Ok(Arc::new(connector))
}

async fn start_api(args: &ApiArgs, settings: AmbientSettings, coordinator: &mut ShutdownCoordinator) -> Result<()> {
    let connector: Arc<dyn ClusterConnector> = if args.in_memory {
        let cluster = InMemoryCluster::new();
        cluster.register_user(&args.dev_token, &args.dev_user, &[]);
        warn!(user = %args.dev_user, "in-memory cluster: state is lost on exit");

        let content = settings.content.clone();
        let token = coordinator.token();
        coordinator.spawn("content", async move {
            ambient_content::service::serve(&content, token).await
        });
        spawn_controller(coordinator, cluster.service(), &settings);
        Arc::new(cluster)
    } else {
        connect(&settings)?
    };

    ensure_cluster_roles(connector.service())
        .await
        .context("failed to install project cluster roles")?;

    let state = AppState::new(connector, settings);
    let token = coordinator.token();
    coordinator.spawn("api", ambient_server::serve(state, token));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    init_subscriber(&settings.logging.level, settings.logging.json);
    info!(version = ambient_core::constants::VERSION, command = ?cli.command, "starting");

    let mut coordinator = ShutdownCoordinator::new();
    let shutdown = coordinator.token();
    let drain = Duration::from_secs(settings.server.shutdown_timeout_secs);

    match &cli.command {
        Command::Api(args) => start_api(args, settings, &mut coordinator).await?,
        Command::Controller => {
            let connector = connect(&settings)?;
            spawn_controller(&mut coordinator, connector.service(), &settings);
        }
        Command::Content(_) => {
            let token = coordinator.token();
            coordinator.spawn("content", async move {
                ambient_content::service::serve(&settings.content, token).await
            });
        }
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("shutdown requested");
        }
        () = shutdown.cancelled() => warn!("a component stopped, shutting down"),
    }
    let aborted = coordinator.graceful_shutdown(Some(drain)).await;
    if !aborted.is_empty() {
        warn!(?aborted, "exiting with components still running");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn api_overrides_apply() {
        let path = missing_settings_path();
        let cli = Cli::try_parse_from([
            "ambient",
            "--config",
            path.as_str(),
            "api",
            "--port",
            "9000",
            "--in-memory",
            "--content-port",
            "9001",
        ])
        .unwrap();
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.content.port, 9001);
        assert_eq!(settings.content.url_template, "http://127.0.0.1:9001");
    }

    #[test]
    fn content_overrides_apply() {
        let path = missing_settings_path();
        let cli = Cli::try_parse_from(["ambient", "content", "--root", "/srv/team", "--config", path.as_str()]).unwrap();
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.content.root, "/srv/team");
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["ambient"]).is_err());
    }

    /// A settings path that does not exist, so defaults load.
    fn missing_settings_path() -> String {
        std::env::temp_dir()
            .join(format!("ambient-missing-{}.json", std::process::id()))
            .to_string_lossy()
            .into_owned()
    }
}
