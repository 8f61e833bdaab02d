//! # Shareport Server
//!
//! Ad-hoc HTTP file sharing server.
//!
//! Provides:
//! - One or more HTTP/HTTPS listeners, all serving the same share table
//! - A JSON file API (list, download, upload, delete, mkdir, move, copy)
//!   plus a minimal HTML browsing UI
//! - Drain-then-force graceful shutdown on Ctrl-C/SIGTERM
//!
//! # Configuration
//!
//! Point `--config` (or the `SHAREPORT_CONFIG` env var) at a
//! `shareport.toml`; without one the server uses defaults plus
//! `SHAREPORT_*` env overrides.
//!
//! # CLI Usage
//!
//! ```bash
//! # Share a single directory on port 8080 (quick-share mode)
//! shareport_server /srv/files
//!
//! # Quick-share readonly on a custom port
//! shareport_server /srv/files -p 9000 --readonly
//!
//! # Full configuration
//! shareport_server --config shareport.toml
//!
//! # Generate an example config file with inline documentation
//! shareport_server --init-config
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use shareport_config::{ListenerConfig, ShareConfig, ShareportConfig};
use shareport_core::ShareRegistry;

use shareport_server::handlers;
use shareport_server::listener::{ListenerSet, ListenerSpec};
use shareport_server::openapi::ApiDoc;
use shareport_server::router::{self, CustomHandler};
use shareport_server::shutdown::ShutdownCoordinator;
use shareport_server::state::AppState;

/// Shareport file sharing server.
#[derive(Parser, Debug)]
#[command(name = "shareport_server")]
#[command(about = "Shareport — share directories over HTTP for ad-hoc file exchange")]
#[command(version)]
struct Cli {
    /// Directory (or single file) to share in quick-share mode.
    /// Registered as the share "shared".
    rootdir: Option<PathBuf>,

    /// Port for quick-share mode. Replaces the configured listener set.
    #[arg(short, long)]
    port: Option<u16>,

    /// Make the quick-share readonly.
    #[arg(long)]
    readonly: bool,

    /// Path to shareport.toml config file.
    /// Can also be set via SHAREPORT_CONFIG env var.
    #[arg(short, long, env = "SHAREPORT_CONFIG")]
    config: Option<String>,

    /// Generate an example shareport.toml with documentation and exit.
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle --init-config: print example config and exit.
    if cli.init_config {
        print!("{}", ShareportConfig::example_toml_commented());
        return Ok(());
    }

    // Load configuration from file or defaults, then apply env overrides
    // and the quick-share CLI shortcuts.
    let mut config = if let Some(path) = &cli.config {
        ShareportConfig::from_file(path)?
    } else {
        let mut cfg = ShareportConfig::default();
        cfg.apply_env_overrides();
        cfg
    };
    if let Some(rootdir) = &cli.rootdir {
        config.shares.push(ShareConfig {
            name: "shared".to_string(),
            path: rootdir.to_string_lossy().into_owned(),
            hidden: false,
            readonly: cli.readonly,
            listable: true,
        });
    }
    if let Some(port) = cli.port {
        config.listeners = vec![ListenerConfig {
            port,
            ..ListenerConfig::default()
        }];
    }
    config.validate()?;

    init_logging(&config);

    tracing::info!(
        "Shareport {} starting ({} listener(s), drain wait {}s)",
        env!("CARGO_PKG_VERSION"),
        config.listeners.len(),
        config.server.drain_wait_secs,
    );

    // Build the share registry from config.
    let registry = Arc::new(ShareRegistry::new());
    for share in &config.shares {
        registry
            .add(
                &share.name,
                Path::new(&share.path),
                share.hidden,
                share.readonly,
                share.listable,
            )
            .with_context(|| format!("Failed to register share '{}'", share.name))?;
    }
    tracing::info!("List of share(s):");
    for share in &config.shares {
        tracing::info!(
            "{}: {}{}{}{}",
            share.name,
            share.path,
            if share.hidden { " [hidden]" } else { "" },
            if share.readonly { " [readonly]" } else { "" },
            if share.listable { "" } else { " [no listing]" },
        );
    }

    run_server(config, registry).await
}

/// Serve until a shutdown signal or listener failure, then drain.
///
/// The drain always runs before this returns, on every exit path, so the
/// caller gets back a process with no live connections.
async fn run_server(config: ShareportConfig, registry: Arc<ShareRegistry>) -> anyhow::Result<()> {
    let drain_wait = Duration::from_secs(config.server.drain_wait_secs);

    let coordinator = ShutdownCoordinator::new();
    let state = Arc::new(AppState::new(registry, config.clone(), coordinator.clone()));

    // Built-in health endpoint, registered through the same custom-handler
    // API that embedders use. Hidden from the index.
    state.register_handler(
        "healthz",
        Arc::new(HealthHandler {
            state: Arc::downgrade(&state),
        }),
        true,
    )?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::app(state.clone())
        // Swagger UI serves the OpenAPI JSON at the URL passed to .url()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Bind everything before serving anything: partial startup is a
    // startup failure.
    let specs = build_listener_specs(&config).await?;
    let listeners = ListenerSet::bind(specs)?;

    let mut tasks = listeners.serve(app, &coordinator);

    let result = tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
        res = wait_for_listener_exit(&mut tasks) => res,
    };

    coordinator.shutdown(drain_wait).await;
    result
}

/// Resolve listener configs into bindable specs, loading TLS contexts.
async fn build_listener_specs(config: &ShareportConfig) -> anyhow::Result<Vec<ListenerSpec>> {
    let mut specs = Vec::new();
    for listener in &config.listeners {
        let tls = match (&listener.tls_cert, &listener.tls_key) {
            (Some(cert), Some(key)) => Some(
                RustlsConfig::from_pem_file(cert, key).await.with_context(|| {
                    format!(
                        "Failed to load TLS cert/key for {}:{}",
                        listener.address, listener.port
                    )
                })?,
            ),
            _ => None,
        };
        specs.push(ListenerSpec {
            address: listener.address.clone(),
            port: listener.port,
            tls,
        });
    }
    Ok(specs)
}

/// Resolve when any listener task exits. A listener dying while the server
/// runs is a fatal error; exiting cleanly means shutdown is in progress.
async fn wait_for_listener_exit(
    tasks: &mut Vec<tokio::task::JoinHandle<std::io::Result<()>>>,
) -> anyhow::Result<()> {
    let (result, _index, _remaining) =
        futures_util::future::select_all(tasks.drain(..)).await;
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(anyhow::anyhow!("Listener failed: {}", e)),
        Err(e) => Err(anyhow::anyhow!("Listener task panicked: {}", e)),
    }
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Initialize tracing from config. `RUST_LOG` wins when set.
fn init_logging(config: &ShareportConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.server.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Health endpoint served through the custom-handler interface.
struct HealthHandler {
    state: std::sync::Weak<AppState>,
}

#[async_trait]
impl CustomHandler for HealthHandler {
    async fn handle(&self, _request: Request<Body>) -> Response {
        match self.state.upgrade() {
            Some(state) => Json(handlers::health(&state)).into_response(),
            None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        }
    }
}
