mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

use callerid::error::JsonError;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config_path = cli.config_path();
    let result = match &cli.command {
        Commands::Config { command } => cli::config::run(command, &config_path, cli.json),

        Commands::Check {
            users,
            principal,
            password,
            repeat,
        } => cli::check::run(
            &config_path,
            users,
            principal.as_deref(),
            password.clone(),
            *repeat,
            cli.json,
        ),

        Commands::Stampede {
            users,
            principal,
            password,
            threads,
            locking,
            delay_ms,
        } => cli::stampede::run(
            &config_path,
            users,
            principal,
            password.clone(),
            *threads,
            locking.as_deref(),
            *delay_ms,
            cli.json,
        ),
    };

    if let Err(e) = result {
        if cli.json {
            let body = JsonError::from_error(&e);
            match serde_json::to_string(&body) {
                Ok(s) => eprintln!("{}", s),
                Err(_) => eprintln!("Error: {}", e),
            }
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(e.exit_code());
    }
}
