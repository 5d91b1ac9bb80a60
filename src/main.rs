mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use mg_core::config::Config;
use mg_engine::catalog::media_info;
use mg_engine::{MediaEngine, ToolRegistry, YtDlpEngine};
use mg_server::pool::WorkerPool;

async fn start_server(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let mut config = Config::load_or_default(config_path);

    // CLI flags win over the config file.
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!(
        "Starting mediagrab on {}:{} (downloads in {})",
        config.server.host,
        config.server.port,
        config.downloads.dir.display()
    );

    mg_server::start(config).await?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise use defaults based on the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediagrab=trace,mg_server=trace,mg_engine=trace,mg_core=debug,tower_http=debug".to_string()
        } else {
            "mediagrab=debug,mg_server=debug,mg_engine=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Info { url } => run_inspect(&url, cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mediagrab {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Drive [`inspect_url`] on its own runtime. A timed-out inspection leaves
/// the engine call running on a blocking thread, so the runtime is shut down
/// without waiting for it.
fn run_inspect(url: &str, config_path: Option<&Path>) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(inspect_url(url, config_path));
    rt.shutdown_background();
    result
}

/// Inspect `url` through the same pool and timeout the server uses.
async fn inspect_url(url: &str, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    let engine: Arc<dyn MediaEngine> = Arc::new(YtDlpEngine::new(tools));
    let pool = WorkerPool::new(1);

    let target = url.to_string();
    let metadata = pool
        .run_with_timeout("inspection", config.workers.inspect_timeout(), move || {
            engine.inspect(&target)
        })
        .await?
        .with_context(|| format!("failed to inspect {url}"))?;

    println!("{}", serde_json::to_string_pretty(&media_info(metadata))?);
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install yt-dlp and ffmpeg to enable downloads.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!(
        "  Downloads: {} (kept {}s)",
        config.downloads.dir.display(),
        config.downloads.max_age_secs
    );
    println!(
        "  Workers: {} (inspection timeout {}s)",
        config.workers.capacity, config.workers.inspect_timeout_secs
    );

    let warnings = config.validate();
    for warning in &warnings {
        println!("  ⚠ {warning}");
    }

    Ok(())
}
