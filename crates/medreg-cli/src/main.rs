use anyhow::Result;
use clap::Parser;

use medreg_cli::cli::{Cli, Commands};
use medreg_cli::commands::{self, open_registry};
use medreg_cli::config::AppConfig;
use medreg_cli::config::loader::load_config;
use medreg_cli::observability;
use medreg_cli::output::print_error;

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    let cli = Cli::parse();

    // Initialize tracing early with the default level
    observability::init_tracing();

    let cfg = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            print_error(&format!("Configuration error: {e}"));
            std::process::exit(2);
        }
    };
    observability::apply_logging_level(&cfg.logging.level);
    tracing::debug!(
        path = cli.config.as_deref().unwrap_or(medreg_cli::config::loader::DEFAULT_CONFIG_PATH),
        backend = ?cfg.storage.backend,
        "Configuration loaded"
    );

    if let Err(e) = run(&cli, &cfg).await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, cfg: &AppConfig) -> Result<()> {
    let format = cli.format.unwrap_or_default();

    match &cli.command {
        Commands::Migrate => commands::migrate::run(cfg).await,
        Commands::Allocate(args) => {
            let registry = open_registry(cfg).await?;
            commands::sequence::allocate(&registry, &args.prefix, format).await
        }
        Commands::Register(args) => {
            let registry = open_registry(cfg).await?;
            commands::patient::register(&registry, args, format).await
        }
        Commands::Get(args) => {
            let registry = open_registry(cfg).await?;
            commands::patient::get(&registry, args.id, format).await
        }
        Commands::List => {
            let registry = open_registry(cfg).await?;
            commands::patient::list(&registry, format).await
        }
        Commands::Update(args) => {
            let registry = open_registry(cfg).await?;
            commands::patient::update(&registry, args, format).await
        }
        Commands::Counters => {
            let registry = open_registry(cfg).await?;
            commands::sequence::counters(&registry, format).await
        }
    }
}
