//! CLI command handling.
//!
//! Provides subcommands for:
//! - Starting a throwaway instance and holding it until Ctrl-C (`up`)
//! - Printing a generated password (`password`)

mod up;

pub use up::{UpArgs, run_up_command};

use clap::{ColorChoice, Parser, Subcommand};
use secrecy::ExposeSecret;

use crate::postgres::random_password;

#[derive(Parser, Debug)]
#[command(name = "sqltestbox")]
#[command(about = "Throwaway PostgreSQL containers for test suites")]
#[command(
    long_about = "sqltestbox starts disposable PostgreSQL containers. Use 'sqltestbox <subcommand> --help' for details.\nExamples:\n  sqltestbox up --migrations ./migrations  # Start, migrate, wait for Ctrl-C\n  sqltestbox password  # Print a generated password"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an instance and keep it until interrupted
    #[command(
        about = "Start a PostgreSQL instance",
        long_about = "Starts a container, optionally applies migrations and a scenario, prints the connection string, and tears everything down on Ctrl-C.\nExample: sqltestbox up --version 16 --scenario fixtures.yml"
    )]
    Up(UpArgs),

    /// Print one generated password
    #[command(
        about = "Generate a password",
        long_about = "Prints a random 32-letter password of the kind used for instances.\nExample: sqltestbox password"
    )]
    Password,
}

/// Print a freshly generated password on stdout.
pub fn run_password_command() -> anyhow::Result<()> {
    let password = random_password()?;
    println!("{}", password.expose_secret());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::CommandFactory;

    use super::*;
    use crate::postgres::SslMode;

    #[test]
    fn test_command_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_version() {
        let cmd = Cli::command();
        assert_eq!(
            cmd.get_version().unwrap_or("unknown"),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_parse_up() {
        let cli = Cli::try_parse_from([
            "sqltestbox",
            "up",
            "--version",
            "16",
            "--migrations",
            "db/migrations",
            "--sslmode",
            "prefer",
        ])
        .unwrap();

        let Command::Up(args) = cli.command else {
            panic!("expected up");
        };
        assert_eq!(args.pg_version.as_deref(), Some("16"));
        assert_eq!(args.migrations, Some(PathBuf::from("db/migrations")));
        assert_eq!(args.sslmode, Some(SslMode::Prefer));
        assert!(args.scenario.is_none());
    }

    #[test]
    fn test_parse_rejects_bad_sslmode() {
        let result = Cli::try_parse_from(["sqltestbox", "up", "--sslmode", "sometimes"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["sqltestbox"]).is_err());
    }
}
