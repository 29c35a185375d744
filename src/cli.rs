//! CLI argument parsing with clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "pidns")]
#[command(author, version, about = "Ad-blocking list manager for dnsmasq")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (for cron/systemd timer)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Refresh every enabled block list and reload dnsmasq
    Update,

    /// Manage block list sources
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Manage the whitelist (always allowed domains)
    Whitelist {
        #[command(subcommand)]
        action: ListAction,
    },

    /// Manage the blacklist (always blocked domains)
    Blacklist {
        #[command(subcommand)]
        action: ListAction,
    },

    /// Check whether domains are blocked and why
    Check {
        /// Domains to check
        #[arg(required = true)]
        domains: Vec<String>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Delete expired list entries and orphaned list files
    Cleanup,

    /// Regenerate the dnsmasq configuration from cached lists
    Generate,

    /// Control the dnsmasq service
    Resolver {
        #[command(subcommand)]
        action: ResolverAction,
    },

    /// Show block list and override statistics
    Stats {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run the scheduled refresh and cleanup jobs until stopped
    Daemon,

    /// Show version
    Version,
}

#[derive(Subcommand)]
pub enum SourcesAction {
    /// List block list sources
    List {
        /// Only show this category
        #[arg(long)]
        category: Option<String>,
        /// Only show enabled sources
        #[arg(long)]
        enabled: bool,
    },
    /// Add a block list by URL and fetch it
    Add {
        /// http(s) URL of the list
        url: String,
        /// Display name (defaults to the URL)
        #[arg(long, default_value = "")]
        name: String,
        /// Category (ads, trackers, malware, phishing, social, adult, custom)
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Change name, category or description of a block list
    Update {
        id: u64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Remove a user-added block list
    Remove {
        id: u64,
    },
    Enable {
        id: u64,
    },
    Disable {
        id: u64,
    },
    /// Flip a block list between enabled and disabled
    Toggle {
        id: u64,
    },
    /// Fetch a single block list now
    Refresh {
        id: u64,
    },
    /// Parse the last download of a block list again without fetching it
    Reparse {
        id: u64,
    },
    /// Show cache and freshness status of every block list
    Status,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryArgs {
    /// Category for the entry
    #[arg(long)]
    pub category: Option<String>,
    /// Expiry (RFC 3339 timestamp or YYYY-MM-DD)
    #[arg(long)]
    pub expires: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Subcommand)]
pub enum ListAction {
    /// Add a domain
    Add {
        domain: String,
        #[command(flatten)]
        entry: EntryArgs,
    },
    /// Remove an entry by id
    Del {
        id: u64,
    },
    /// Change category, expiry or notes of an entry
    Update {
        id: u64,
        #[command(flatten)]
        entry: EntryArgs,
        /// Remove the expiry
        #[arg(long, conflicts_with = "expires")]
        no_expiry: bool,
    },
    /// List entries
    List {
        #[arg(long)]
        category: Option<String>,
        /// Include expired entries
        #[arg(long)]
        all: bool,
    },
    /// Import entries from a JSON array or a plain list of domains
    Import {
        file: PathBuf,
    },
    /// Export entries as JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ResolverAction {
    /// Show whether dnsmasq is active
    Status,
    /// Test the configuration, then reload dnsmasq
    Reload,
    Restart,
    /// Archive the dnsmasq configuration directory
    Backup,
    /// Restore a backup archive and reload
    Restore {
        file: PathBuf,
    },
    /// Show systemd state of the dnsmasq unit
    Info,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_config_path() {
        let cli = Cli::try_parse_from(["pidns", "update"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/pidns/config.yaml"));
        assert!(!cli.quiet);
        assert!(!cli.verbose);
        assert!(matches!(cli.command, Commands::Update));
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["pidns", "generate", "-q", "--config", "/tmp/p.yaml"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.config, PathBuf::from("/tmp/p.yaml"));
    }

    #[test]
    fn test_cli_sources_add() {
        let cli = Cli::try_parse_from([
            "pidns",
            "sources",
            "add",
            "https://lists.example.org/hosts",
            "--name",
            "Mine",
            "--category",
            "ads",
        ])
        .unwrap();
        match cli.command {
            Commands::Sources {
                action:
                    SourcesAction::Add {
                        url,
                        name,
                        category,
                        description,
                    },
            } => {
                assert_eq!(url, "https://lists.example.org/hosts");
                assert_eq!(name, "Mine");
                assert_eq!(category.as_deref(), Some("ads"));
                assert!(description.is_empty());
            }
            _ => panic!("Expected Sources Add command"),
        }
    }

    #[test]
    fn test_cli_sources_toggle() {
        let cli = Cli::try_parse_from(["pidns", "sources", "toggle", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sources {
                action: SourcesAction::Toggle { id: 3 }
            }
        ));
    }

    #[test]
    fn test_cli_sources_reparse() {
        let cli = Cli::try_parse_from(["pidns", "sources", "reparse", "2"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sources {
                action: SourcesAction::Reparse { id: 2 }
            }
        ));
    }

    #[test]
    fn test_cli_whitelist_add() {
        let cli = Cli::try_parse_from([
            "pidns",
            "whitelist",
            "add",
            "cdn.example.com",
            "--expires",
            "2030-01-01",
        ])
        .unwrap();
        match cli.command {
            Commands::Whitelist {
                action: ListAction::Add { domain, entry },
            } => {
                assert_eq!(domain, "cdn.example.com");
                assert_eq!(entry.expires.as_deref(), Some("2030-01-01"));
                assert!(entry.category.is_none());
            }
            _ => panic!("Expected Whitelist Add command"),
        }
    }

    #[test]
    fn test_cli_blacklist_update_no_expiry() {
        let cli =
            Cli::try_parse_from(["pidns", "blacklist", "update", "7", "--no-expiry"]).unwrap();
        match cli.command {
            Commands::Blacklist {
                action: ListAction::Update { id, no_expiry, .. },
            } => {
                assert_eq!(id, 7);
                assert!(no_expiry);
            }
            _ => panic!("Expected Blacklist Update command"),
        }
    }

    #[test]
    fn test_cli_update_expiry_conflict() {
        let result = Cli::try_parse_from([
            "pidns",
            "blacklist",
            "update",
            "7",
            "--no-expiry",
            "--expires",
            "2030-01-01",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_check_multiple() {
        let cli =
            Cli::try_parse_from(["pidns", "check", "a.example.com", "b.example.com", "--json"])
                .unwrap();
        match cli.command {
            Commands::Check { domains, json } => {
                assert_eq!(domains, vec!["a.example.com", "b.example.com"]);
                assert!(json);
            }
            _ => panic!("Expected Check command"),
        }
    }

    #[test]
    fn test_cli_check_requires_domain() {
        assert!(Cli::try_parse_from(["pidns", "check"]).is_err());
    }

    #[test]
    fn test_cli_resolver_restore() {
        let cli =
            Cli::try_parse_from(["pidns", "resolver", "restore", "/tmp/backup.tar.gz"]).unwrap();
        match cli.command {
            Commands::Resolver {
                action: ResolverAction::Restore { file },
            } => assert_eq!(file, PathBuf::from("/tmp/backup.tar.gz")),
            _ => panic!("Expected Resolver Restore command"),
        }
    }

    #[test]
    fn test_cli_invalid_command() {
        assert!(Cli::try_parse_from(["pidns", "frobnicate"]).is_err());
    }
}
