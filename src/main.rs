//! nettest - main entry point

use nettest::cli::{Cli, Commands};
use nettest::commands;
use nettest::process_guard::Interrupt;
use tracing::{debug, error, warn};

/// Initialize the logger; `RUST_LOG` overrides the default `info` level
fn init_logger() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logger();

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed");

    let code = match cli.command {
        Commands::Ping(args) => commands::ping(&args),
        Commands::Validate { config } => commands::validate(&config),
        Commands::Roundtrip(args) => {
            // Handlers only raise the flag; the driver runs cleanup itself
            let interrupt = Interrupt::install().unwrap_or_else(|e| {
                warn!("Failed to initialize signal handlers: {}", e);
                Interrupt::new()
            });
            match commands::roundtrip(&args, interrupt) {
                Ok(code) => code,
                Err(e) => {
                    error!("{:#}", e);
                    eprintln!("[roundtrip] {:#}", e);
                    1
                }
            }
        }
    };

    std::process::exit(code);
}
