use clap::{Parser, Subcommand};
use devstack::config::parse_duration_arg;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "devstack")]
#[command(about = "devstack - Run a local development topology behind one reverse proxy")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile the topology, start it and wait until it is healthy
    Run {
        /// Config files to merge, in order (defaults to devstack.yaml)
        #[arg(short = 'f', long = "file")]
        files: Vec<PathBuf>,

        /// Resolve remote runners against this environment instead of
        /// starting services locally
        #[arg(long, value_name = "ENV")]
        remote_env: Option<String>,

        /// How long to wait for health checks (e.g. 90s, 5m)
        #[arg(long, value_parser = parse_duration_arg, default_value = "5m")]
        timeout: Duration,

        /// Port the ingress proxy listens on
        #[arg(long, default_value_t = devstack::ingress::DEFAULT_PROXY_PORT)]
        proxy_port: u16,

        /// Also wait for local HTTP services that declare no health check
        #[arg(long)]
        probe_all: bool,

        /// Show the compiled topology without writing or starting anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate configuration files
    Validate {
        /// Config files to merge, in order (defaults to devstack.yaml)
        #[arg(short = 'f', long = "file")]
        files: Vec<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "devstack",
            "run",
            "-f",
            "a.yaml",
            "--file",
            "b.yaml",
            "--remote-env",
            "dev",
            "--timeout",
            "90s",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                files,
                remote_env,
                timeout,
                dry_run,
                ..
            } => {
                assert_eq!(files, vec![PathBuf::from("a.yaml"), PathBuf::from("b.yaml")]);
                assert_eq!(remote_env.as_deref(), Some("dev"));
                assert_eq!(timeout, Duration::from_secs(90));
                assert!(dry_run);
            }
            Commands::Validate { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn rejects_bad_timeout() {
        assert!(Cli::try_parse_from(["devstack", "run", "--timeout", "soon"]).is_err());
    }
}
