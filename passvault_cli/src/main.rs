//! PassVault - CLI
//!
//! Command-line interface for the password vault.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use tracing_subscriber::EnvFilter;

use passvault::commands::{self, AddOptions};
use passvault::config::{LocalConfig, CONFIG_ENV};
use passvault::{shell, ui, CliResult};

#[derive(Parser)]
#[command(name = "passvault")]
#[command(version = passvault::VERSION)]
#[command(about = "PassVault - zero-knowledge password manager")]
struct Cli {
    /// Local config file
    #[arg(short, long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a record store and create (or join) a vault
    Init,

    /// Add a credential
    Add {
        #[arg(short, long)]
        title: String,

        #[arg(short, long, default_value = "")]
        username: String,

        /// Password (prompted when omitted)
        #[arg(short, long, conflicts_with = "generate")]
        password: Option<String>,

        /// Generate a random password
        #[arg(short, long)]
        generate: bool,

        /// Generated password length (config default when omitted)
        #[arg(short, long)]
        length: Option<usize>,

        #[arg(long, default_value = "")]
        url: String,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        category: Option<String>,
    },

    /// Show a credential
    Get {
        /// Credential ID
        #[arg(short, long)]
        id: String,

        /// Reveal password and notes
        #[arg(short, long)]
        show: bool,

        /// Copy the password to the clipboard until the clipboard timeout
        #[arg(short, long)]
        copy: bool,
    },

    /// List credentials
    List {
        /// Substring match on title, username, URL or category
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Delete a credential
    Delete {
        /// Credential ID
        #[arg(short, long)]
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Generate a random password (no vault needed)
    Generate {
        /// Config default when omitted
        #[arg(short, long)]
        length: Option<usize>,

        /// Letters and digits only
        #[arg(long)]
        no_symbols: bool,

        /// Copy to the clipboard until the clipboard timeout
        #[arg(short, long)]
        copy: bool,
    },

    /// Change the master password, re-encrypting every credential
    Rotate,

    /// Interactive menu
    Shell,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        tracing::debug!(error = %e, "command failed");
        ui::error(&e.user_message());
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "passvault=debug,passvault_core=debug,warn" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> CliResult<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => LocalConfig::default_path()?,
    };
    let mut config = LocalConfig::load(&config_path)?;

    match cli.command {
        Commands::Init => commands::init(&config_path, config),

        Commands::Generate {
            length,
            no_symbols,
            copy,
        } => {
            let length = length.unwrap_or(config.password_length);
            let symbols = config.include_symbols && !no_symbols;
            let password = commands::generate(length, symbols)?;
            if copy {
                let lease = commands::copy_to_clipboard(
                    "Password",
                    password.expose_secret(),
                    config.clipboard_timeout(),
                )?;
                commands::hold_clipboard(lease);
            }
            Ok(())
        }

        Commands::Add {
            title,
            username,
            password,
            generate,
            length,
            url,
            notes,
            category,
        } => {
            let vault = commands::open_vault(&config)?;
            let opts = AddOptions {
                title,
                username,
                password: password.map(SecretString::from),
                generate,
                length: length.unwrap_or(config.password_length),
                symbols: config.include_symbols,
                url,
                notes,
                category: category.or_else(|| Some(config.default_category.clone())),
            };
            commands::with_session(&vault, |v| commands::add(v, opts).map(|_| ()))
        }

        Commands::Get { id, show, copy } => {
            let vault = commands::open_vault(&config)?;
            let timeout = config.clipboard_timeout();
            let lease = commands::with_session(&vault, |v| {
                let credential = commands::show(v, &id, show)?;
                if !copy {
                    return Ok(None);
                }
                let secret = credential.password.expose_secret();
                commands::copy_to_clipboard("Password", secret, timeout).map(Some)
            })?;
            // Vault is already locked; only the clipboard copy remains.
            if let Some(lease) = lease {
                commands::hold_clipboard(lease);
            }
            Ok(())
        }

        Commands::List { search } => {
            let vault = commands::open_vault(&config)?;
            commands::with_session(&vault, |v| commands::list(v, search.as_deref()))
        }

        Commands::Delete { id, yes } => {
            let vault = commands::open_vault(&config)?;
            commands::with_session(&vault, |v| commands::delete(v, &id, yes))
        }

        Commands::Rotate => {
            let vault = commands::open_vault(&config)?;
            commands::with_session(&vault, |v| commands::rotate(v).map(|_| ()))
        }

        Commands::Shell => {
            let vault = commands::open_vault(&config)?;
            commands::with_session(&vault, |v| shell::run(v, &mut config, &config_path))
        }
    }
}
