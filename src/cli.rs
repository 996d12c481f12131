//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Default configuration file location.
pub const DEFAULT_CONFIG: &str = "/etc/snmp-inventory/config.json";

/// Polls SNMP devices and keeps one snapshot file per host.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "snmp-inventory")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Poll every configured host and replace the snapshot directory.
    Run,
    /// Find working credentials for one host and print its snapshot.
    Test(TestArgs),
    /// Print the loaded configuration.
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct TestArgs {
    /// Hostname or address; it does not have to be in the host list.
    #[arg(long)]
    pub host: String,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ConfigArgs {
    /// Print the host list.
    #[arg(long)]
    pub hosts: bool,

    /// Print credential groups, secrets masked.
    #[arg(long)]
    pub snmp_auth: bool,
}

impl ConfigArgs {
    /// With neither flag given, both sections are printed.
    pub fn sections(&self) -> (bool, bool) {
        if self.hosts || self.snmp_auth {
            (self.hosts, self.snmp_auth)
        } else {
            (true, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_with_defaults() {
        let cli = Cli::try_parse_from(["snmp-inventory", "run"]).unwrap();
        assert_eq!(cli.command, Command::Run);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "snmp-inventory",
            "test",
            "--host",
            "10.0.0.1",
            "--config",
            "poller.json",
            "-v",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Command::Test(TestArgs {
                host: "10.0.0.1".into()
            })
        );
        assert_eq!(cli.config, PathBuf::from("poller.json"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_test_requires_host() {
        assert!(Cli::try_parse_from(["snmp-inventory", "test"]).is_err());
    }

    #[test]
    fn test_config_sections() {
        let cli = Cli::try_parse_from(["snmp-inventory", "config"]).unwrap();
        let Command::Config(args) = cli.command else {
            panic!("expected config command");
        };
        assert_eq!(args.sections(), (true, true));

        let cli = Cli::try_parse_from(["snmp-inventory", "config", "--snmp-auth"]).unwrap();
        let Command::Config(args) = cli.command else {
            panic!("expected config command");
        };
        assert_eq!(args.sections(), (false, true));
    }
}
