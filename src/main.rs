mod cli;

use relaycast::{acquisition::transcode, config, server, sources::SourceResolver};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

async fn start_server(
    host: String,
    port: u16,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    config.server.host = host;
    config.server.port = port;
    config::validate_config(&config)?;

    tracing::info!("Starting relaycast server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    server::start_server(config).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "relaycast=trace,relaycast_store=trace,relaycast_common=debug,tower_http=debug"
                .to_string()
        } else {
            "relaycast=debug,relaycast_store=debug,tower_http=info".to_string()
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
        Commands::Resolve { query, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(resolve_query(&query, json, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("relaycast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn resolve_query(
    query: &str,
    json: bool,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let resolver = SourceResolver::from_config(&config.sources, server::http_client()?);

    let source = resolver.resolve(query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&source)?);
    } else {
        println!("Provider: {}", source.provider);
        println!("Title: {}", source.title);
        println!("Codec: {} ({})", source.codec, source.mime_type);
        if source.bitrate > 0 {
            println!("Bitrate: {} kbps", source.bitrate / 1000);
        }
        println!("URL: {}", source.stream_url);
    }

    Ok(())
}

fn check_tools(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    println!("Checking external tools...\n");

    let tools = transcode::check_tools(&config.transcode);
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
            print!(" ({})", version);
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
        println!("ffmpeg is missing. Acquired audio will be stored without transcoding.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Store: {:?}", config.store.kind);
            if let Some(ref url) = config.store.base_url {
                println!("    Base URL: {}", url);
            }
            println!("    Max connections: {}", config.store.max_connections);
            println!(
                "  Fallback instances: {}",
                config.sources.fallback_instances.len()
            );
            println!("  Transcode enabled: {}", config.transcode.enabled);
            if let Some(ref dest) = config.acquisition.default_destination {
                println!("  Default destination: {}", dest);
            }
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
