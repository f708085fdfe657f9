mod cli;

use mp3relay::{server, video_id};
use mp3relay_core::Config;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mp3relay=trace,mp3relay_core=trace,tower_http=debug".to_string()
        } else {
            "mp3relay=debug,mp3relay_core=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = Config::resolve(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(server::start_server(config))?;
            Ok(())
        }
        Commands::Validate => validate_config(cli.config.as_deref()),
        Commands::ExtractId { url } => {
            println!("{}", video_id::extract_video_id(&url)?);
            Ok(())
        }
        Commands::Version => {
            println!("mp3relay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = Config::resolve(path)?;

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Upstream: {} ({})", config.upstream.api_url, config.upstream.contract);
    println!("  Credentials: {}", config.upstream.api_keys.len());
    println!(
        "  Jobs: ttl {}s, max {}",
        config.jobs.ttl_secs, config.jobs.max_entries
    );
    for warning in config.warnings() {
        println!("  ! {warning}");
    }

    Ok(())
}
