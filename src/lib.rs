//! # pidns - DNS ad-block manager for dnsmasq
//!
//! Downloads public block lists, merges them with local whitelist and
//! blacklist entries, and writes dnsmasq configuration fragments that
//! sinkhole the blocked domains. dnsmasq itself does the resolving.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         pidns                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap) / Daemon (Scheduler)                            │
//! │    └── Commands: update, sources, whitelist, check...       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ListPipeline (manager)                                     │
//! │    ├── Reconciler: fetch, parse, cache per-source files     │
//! │    ├── ListManager: whitelist / blacklist entries           │
//! │    └── ConfigWriter: adblock/whitelist/blacklist .conf      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Store (serde_json)        Fetcher (reqwest + rustls)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ResolverController (CommandExecutor trait)                 │
//! │    └── dnsmasq --test, systemctl reload/restart, backups    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use pidns::config::Config;
//! use pidns::manager::ListPipeline;
//! use pidns::signal::ShutdownToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_or_default("/etc/pidns/config.yaml")?;
//!     let pipeline = ListPipeline::from_config(&config)?;
//!     pipeline.seed().await?;
//!
//!     let summary = pipeline.refresh_all(&ShutdownToken::new()).await?;
//!     println!("{} domains blocked", summary.regeneration.blocked);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cache`] - Per-source domain files on disk
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - External command execution seam
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`dnsmasq`] - dnsmasq configuration rendering and writing
//! - [`fetcher`] - HTTP client for downloading block lists
//! - [`lists`] - Whitelist and blacklist management
//! - [`lock`] - File locking for concurrent execution prevention
//! - [`manager`] - The list pipeline tying everything together
//! - [`membership`] - Combined block set and domain verdicts
//! - [`parser`] - Hosts and domain list parsing
//! - [`reconciler`] - Source refresh and combined list rebuild
//! - [`resolver`] - dnsmasq service control and backups
//! - [`scheduler`] - Periodic refresh and cleanup for the daemon
//! - [`signal`] - Graceful shutdown signal handling
//! - [`stats`] - Statistics rendering
//! - [`store`] - Persistent source and entry records
//! - [`utils`] - Common utility functions (formatting, atomic writes)
//! - [`validation`] - Input validation for domains, URLs and intervals

pub mod cache;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod dnsmasq;
pub mod error;
pub mod fetcher;
pub mod lists;
pub mod lock;
pub mod manager;
pub mod membership;
pub mod model;
pub mod parser;
pub mod presets;
pub mod reconciler;
pub mod resolver;
pub mod scheduler;
pub mod signal;
pub mod stats;
pub mod store;
pub mod utils;
pub mod validation;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use manager::ListPipeline;
