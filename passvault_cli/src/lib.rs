//! # PassVault CLI
//!
//! Terminal front end for `passvault-core`, storing ciphertext in a
//! PocketBase server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     PASSVAULT CLI                        │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │  SUBCOMMANDS│  │  SHELL      │  │  SIGNALS        │  │
//! │  │  (clap)     │  │  menu loop  │  │  SIGINT/SIGTERM │  │
//! │  └──────┬──────┘  └──────┬──────┘  └────────┬────────┘  │
//! │         │                │                   │           │
//! │  ┌──────┴────────────────┴───────────────────┴────────┐ │
//! │  │                 PASSVAULT-CORE VAULT                │ │
//! │  │   Argon2id → AES-256-GCM, session, rotation         │ │
//! │  └──────────────────────────┬──────────────────────────┘ │
//! │                             │                            │
//! │  ┌──────────────────────────┴──────────────────────────┐ │
//! │  │            POCKETBASE RECORD STORE (HTTP)           │ │
//! │  └─────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - The store only ever receives ciphertext tokens
//! - Master password never written to disk
//! - Ctrl+C and SIGTERM lock the vault before exit
//! - Copied secrets are cleared from the clipboard after a timeout

pub mod clipboard;
pub mod commands;
pub mod config;
pub mod error;
pub mod pocketbase;
pub mod shell;
pub mod shutdown;
pub mod ui;

pub use config::LocalConfig;
pub use error::{CliError, CliResult};
pub use pocketbase::PocketBaseStore;

/// PassVault CLI version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
