pub mod api;
pub mod config;
pub mod constants;
pub mod db;
pub mod entities;
pub mod scheduler;
pub mod security;
pub mod services;
pub mod state;

use std::sync::Arc;
use tokio::signal;

use anyhow::Context;
pub use config::Config;
use scheduler::Scheduler;
use state::SharedState;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(handle)
    } else {
        None
    };

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let (layer, task) = tracing_loki::builder()
            .label("app", "keyhaven")?
            .extra_field("env", config.security.environment.clone())?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    if prometheus_handle.is_some() {
        info!("Prometheus metrics recorder initialized");
    }

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "serve" | "daemon" | "-d" | "--daemon" => run_daemon(config, prometheus_handle).await,

        "sweep" => run_sweep(config).await,

        "init" | "--init" => {
            Config::create_default_if_missing()?;
            println!("✓ Config file created. Edit config.toml and run again.");
            Ok(())
        }

        "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }

        _ => {
            println!("Unknown command: {}", args[1]);
            println!();
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("Keyhaven - LLM API credential manager");
    println!();
    println!("USAGE:");
    println!("  keyhaven <COMMAND>");
    println!();
    println!("COMMANDS:");
    println!("  serve             Run the web backend (alias: daemon)");
    println!("  sweep             Run the membership expiry sweep once and exit");
    println!("  init              Create default config file");
    println!("  help              Show this help message");
    println!();
    println!("CONFIG:");
    println!("  Edit config.toml for server and scheduler settings.");
    println!("  Secrets come from the environment (or a .env file):");
    println!("    KEYHAVEN_ENV               development | production");
    println!("    KEYHAVEN_MASTER_SECRET     token signing & key derivation secret");
    println!("    KEYHAVEN_ENCRYPTION_SALT   16-byte KDF salt");
    println!("    KEYHAVEN_WEBHOOK_TOKEN     payment webhook shared token");
}

async fn run_daemon(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        "Keyhaven v{} starting in server mode...",
        env!("CARGO_PKG_VERSION")
    );

    let shared = Arc::new(SharedState::new(config.clone()).await?);

    // First-run discovery of the dynamic admin path happens here, on the
    // operator's console. Every later discovery goes through the
    // authenticated /api/admin-path endpoint.
    info!(
        "Admin console available at {}",
        shared
            .admin_path
            .console_url(&config.server.public_base_url)
    );

    let scheduler = Scheduler::new(Arc::clone(&shared), config.scheduler.clone());
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.start().await {
            error!("Scheduler error: {}", e);
        }
    });

    let api_state = api::create_app_state(shared, prometheus_handle);
    let app = api::router(api_state).await;

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Web server running at http://{addr}");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Web server error: {}", e);
        }
    });

    info!("Server running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    scheduler_handle.abort();
    server_handle.abort();
    info!("Server stopped");

    Ok(())
}

async fn run_sweep(config: Config) -> anyhow::Result<()> {
    info!("Running membership sweep...");

    let shared = Arc::new(SharedState::new(config.clone()).await?);
    let scheduler = Scheduler::new(shared, config.scheduler);
    let downgraded = scheduler.run_once().await?;

    println!("Sweep complete. {downgraded} memberships downgraded.");
    Ok(())
}
