mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use devstack::Error as DevstackError;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(error) = e.downcast_ref::<DevstackError>() {
            eprintln!("Error: {}", error);
            if let Some(suggestion) = error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Run {
            files,
            remote_env,
            timeout,
            proxy_port,
            probe_all,
            dry_run,
        } => {
            let options = commands::RunOptions {
                files,
                remote_env,
                timeout,
                proxy_port,
                probe_all,
                dry_run,
            };
            commands::run_topology(options, &output::CliOutput).await
        }
        Commands::Validate { files } => commands::run_validate(files, &output::CliOutput),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
