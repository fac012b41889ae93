use std::{path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use composer_proxy::{
    adapters::{HttpHandler, router},
    config::{ServerConfigValidator, compile_routes, load_config, loader::SAMPLE_CONFIG},
    tracing_setup,
    utils::graceful_shutdown::GracefulShutdown,
};

const DEFAULT_CONFIG: &str = "composer.toml";

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = DEFAULT_CONFIG)]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },
    /// Start the composer (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config),
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;

    tracing_setup::init_for_environment(&config.environment)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    ServerConfigValidator::validate(&config).map_err(|e| eyre!("Invalid configuration:\n{}", e))?;

    let handler = Arc::new(HttpHandler::from_config(&config).await?);
    let app = router(handler);

    let addr = config
        .socket_addr()
        .context("Failed to parse listen address")?;
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(eyre!("Port {} requires elevated privileges", addr.port()));
        }
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            return Err(eyre!("Port {} is already in use", addr.port()));
        }
        Err(e) => return Err(e).context("Failed to bind to address"),
    };

    tracing::info!(
        "composer-proxy listening on {} (environment: {}, routes: {}, origin: {})",
        addr,
        config.environment,
        config.routes.len(),
        config.default_backend_url
    );

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        signal_handler_shutdown.run_signal_handler().await;
    });

    let shutdown = graceful_shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = shutdown.wait_for_shutdown_signal().await;
            tracing::info!("Shutdown signal received: {:?}", reason);
        })
        .await
        .context("Server error")?;

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate configuration file and exit
fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path) {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = ServerConfigValidator::validate(&config) {
        eprintln!("❌ Configuration validation failed:");
        eprintln!("{e}");
        println!();
        println!("💡 Common fixes:");
        println!("   • Ensure all URLs start with http:// or https://");
        println!("   • Give every route at least one fragment or a redirect");
        println!("   • Verify listen address format (e.g., '127.0.0.1:3000')");
        std::process::exit(1);
    }

    match compile_routes(&config) {
        Ok(registry) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Environment: {}", config.environment);
            println!("   • Origin: {}", config.default_backend_url);
            println!("   • Routes: {}", registry.len());
            println!("   • Proxy Base Path: {}", config.proxy.base_path);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Route compilation failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    tokio::fs::write(path, SAMPLE_CONFIG)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'composer serve --config {config_path}' to start the server");
    Ok(())
}
