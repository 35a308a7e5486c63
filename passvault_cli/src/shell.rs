//! PassVault CLI - Interactive shell
//!
//! Menu loop over an unlocked vault. When the session times out the next
//! action asks for the master password again.

use std::path::Path;
use std::str::FromStr;

use passvault_core::{CredentialUpdate, Vault, VaultError};
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use crate::clipboard::ClipboardLease;
use crate::commands::{self, AddOptions};
use crate::config::LocalConfig;
use crate::error::{CliError, CliResult};
use crate::ui;

/// Menu entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Add,
    List,
    Search,
    Get,
    Edit,
    Generate,
    Delete,
    ChangeMaster,
    Lock,
    Status,
    Settings,
    Exit,
}

impl Action {
    const MENU: [(&'static str, Action, &'static str); 12] = [
        ("1", Action::Add, "Add credential"),
        ("2", Action::List, "List credentials"),
        ("3", Action::Search, "Search"),
        ("4", Action::Get, "Show credential"),
        ("5", Action::Edit, "Edit credential"),
        ("6", Action::Generate, "Generate password"),
        ("7", Action::Delete, "Delete credential"),
        ("8", Action::ChangeMaster, "Change master password"),
        ("9", Action::Lock, "Lock vault"),
        ("s", Action::Status, "Status"),
        ("c", Action::Settings, "Settings"),
        ("0", Action::Exit, "Exit"),
    ];

    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim().to_lowercase();
        match input.as_str() {
            "q" | "quit" | "exit" => return Some(Action::Exit),
            "" => return None,
            _ => {}
        }
        Self::MENU
            .iter()
            .find(|(key, _, _)| *key == input)
            .map(|(_, action, _)| *action)
    }

    /// Whether the action needs the vault unlocked
    pub fn needs_unlock(self) -> bool {
        !matches!(
            self,
            Action::Generate | Action::Lock | Action::Status | Action::Settings | Action::Exit
        )
    }
}

/// Entries of the settings submenu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Setting {
    SessionTimeout,
    ClipboardTimeout,
    DefaultCategory,
    PasswordLength,
    IncludeSymbols,
    Back,
}

impl Setting {
    fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(Setting::SessionTimeout),
            "2" => Some(Setting::ClipboardTimeout),
            "3" => Some(Setting::DefaultCategory),
            "4" => Some(Setting::PasswordLength),
            "5" => Some(Setting::IncludeSymbols),
            "6" | "" => Some(Setting::Back),
            _ => None,
        }
    }
}

/// Run the menu until the user exits. The caller locks the vault on error.
pub fn run(vault: &Vault, config: &mut LocalConfig, config_path: &Path) -> CliResult<()> {
    let mut shell = Shell {
        vault,
        config,
        config_path,
        clipboard: None,
    };
    let result = shell.run();
    shell.release_clipboard();
    result
}

struct Shell<'a> {
    vault: &'a Vault,
    config: &'a mut LocalConfig,
    config_path: &'a Path,
    clipboard: Option<ClipboardLease>,
}

impl Shell<'_> {
    fn run(&mut self) -> CliResult<()> {
        ui::banner();

        loop {
            self.print_menu();
            let choice = ui::prompt("Choose")?;
            let Some(action) = Action::parse(&choice) else {
                ui::warn("Unknown option");
                continue;
            };

            if action == Action::Exit {
                self.vault.lock();
                ui::success("Vault locked. Bye.");
                return Ok(());
            }

            if action.needs_unlock() && !self.vault.is_unlocked() {
                ui::warn("Session locked. Enter the master password to continue.");
                commands::unlock_interactive(self.vault)?;
            }

            match self.dispatch(action) {
                Ok(()) => {}
                Err(CliError::Cancelled) => ui::info("Cancelled"),
                Err(e) if e.is_recoverable() => ui::error(&e.user_message()),
                Err(e) => {
                    warn!(error = %e, "leaving shell after fatal error");
                    return Err(e);
                }
            }
        }
    }

    fn print_menu(&self) {
        ui::section(if self.vault.is_unlocked() {
            "Menu (unlocked)"
        } else {
            "Menu (locked)"
        });
        for (key, _, label) in Action::MENU {
            println!("  [{}] {}", key, label);
        }
    }

    fn dispatch(&mut self, action: Action) -> CliResult<()> {
        let vault = self.vault;
        match action {
            Action::Add => self.add(),
            Action::List => commands::list(vault, None),
            Action::Search => {
                let term = ui::prompt("Search")?;
                commands::list(vault, Some(&term))
            }
            Action::Get => self.get(),
            Action::Edit => edit(vault),
            Action::Generate => {
                let length = prompt_number("Length", self.config.password_length)?;
                let symbols = ui::confirm_default("Include symbols?", self.config.include_symbols)?;
                let password = commands::generate(length, symbols)?;
                if ui::confirm("Copy to clipboard?")? {
                    self.copy("Password", password.expose_secret())?;
                }
                Ok(())
            }
            Action::Delete => {
                let id = required("Credential ID")?;
                commands::delete(vault, &id, false)
            }
            Action::ChangeMaster => commands::rotate(vault).map(|_| ()),
            Action::Lock => {
                if vault.lock() {
                    ui::success("Vault locked");
                } else {
                    ui::info("Vault was already locked");
                }
                Ok(())
            }
            Action::Status => commands::status(vault, &*self.config),
            Action::Settings => self.settings(),
            Action::Exit => Ok(()),
        }
    }

    fn add(&mut self) -> CliResult<()> {
        ui::section("Add credential");
        let title = required("Title")?;
        let username = ui::prompt("Username")?;
        let url = ui::prompt("URL")?;
        let category = ui::prompt_default("Category", &self.config.default_category)?;
        let generate = ui::confirm("Generate a password?")?;
        let password = if generate {
            None
        } else {
            Some(ui::prompt_required_secret("Password")?)
        };
        let notes = ui::prompt("Notes")?;

        let stored = commands::add(
            self.vault,
            AddOptions {
                title,
                username,
                password,
                generate,
                length: self.config.password_length,
                symbols: self.config.include_symbols,
                url,
                notes: Some(notes).filter(|n| !n.is_empty()),
                category: Some(category),
            },
        )?;
        if ui::confirm("Copy password to clipboard?")? {
            self.copy("Password", stored.expose_secret())?;
        }
        Ok(())
    }

    fn get(&mut self) -> CliResult<()> {
        let id = required("Credential ID")?;
        let reveal = ui::confirm("Reveal password?")?;
        let credential = commands::show(self.vault, &id, reveal)?;

        let choice = ui::prompt("Copy [p]assword, [u]sername, Enter to skip")?;
        match choice.to_lowercase().as_str() {
            "p" | "password" => self.copy("Password", credential.password.expose_secret()),
            "u" | "username" => self.copy("Username", &credential.username),
            _ => Ok(()),
        }
    }

    fn copy(&mut self, what: &str, secret: &str) -> CliResult<()> {
        self.release_clipboard();
        let lease = commands::copy_to_clipboard(what, secret, self.config.clipboard_timeout())?;
        self.clipboard = Some(lease);
        Ok(())
    }

    fn release_clipboard(&mut self) {
        if let Some(lease) = self.clipboard.take() {
            lease.clear_now();
        }
    }

    fn settings(&mut self) -> CliResult<()> {
        loop {
            ui::section("Settings");
            let c = &*self.config;
            println!("  [1] Session timeout: {} minutes", c.session_timeout_minutes);
            println!("  [2] Clipboard timeout: {} seconds", c.clipboard_timeout_seconds);
            println!("  [3] Default category: {}", c.default_category);
            println!("  [4] Default password length: {}", c.password_length);
            println!("  [5] Include symbols by default: {}", c.include_symbols);
            println!("  [6] Back");

            let Some(setting) = Setting::parse(&ui::prompt("Choose")?) else {
                ui::warn("Unknown option");
                continue;
            };

            let mut updated = self.config.clone();
            match setting {
                Setting::SessionTimeout => {
                    updated.session_timeout_minutes =
                        prompt_number("Session timeout (minutes)", c.session_timeout_minutes)?
                }
                Setting::ClipboardTimeout => {
                    updated.clipboard_timeout_seconds =
                        prompt_number("Clipboard timeout (seconds)", c.clipboard_timeout_seconds)?
                }
                Setting::DefaultCategory => {
                    updated.default_category =
                        ui::prompt_default("Default category", &c.default_category)?
                }
                Setting::PasswordLength => {
                    updated.password_length =
                        prompt_number("Default password length", c.password_length)?
                }
                Setting::IncludeSymbols => {
                    updated.include_symbols =
                        ui::confirm_default("Include symbols by default?", c.include_symbols)?
                }
                Setting::Back => return Ok(()),
            }

            match commands::update_settings(self.vault, self.config, updated, self.config_path) {
                Ok(()) => ui::success("Setting updated"),
                Err(e @ CliError::Config(_)) => ui::error(&e.user_message()),
                Err(e) => return Err(e),
            }
        }
    }
}

fn edit(vault: &Vault) -> CliResult<()> {
    let id = required("Credential ID")?;
    ui::info("Leave a field empty to keep it");

    let update = CredentialUpdate {
        title: optional(ui::prompt("Title")?),
        username: optional(ui::prompt("Username")?),
        url: optional(ui::prompt("URL")?),
        category: optional(ui::prompt("Category")?),
        password: if ui::confirm("Change password?")? {
            Some(ui::prompt_required_secret("New password")?)
        } else {
            None
        },
        notes: if ui::confirm("Change notes?")? {
            Some(SecretString::from(ui::prompt("Notes (empty clears)")?))
        } else {
            None
        },
    };
    commands::edit(vault, &id, update)
}

fn required(label: &str) -> CliResult<String> {
    let value = ui::prompt(label)?;
    if value.is_empty() {
        return Err(CliError::Cancelled);
    }
    Ok(value)
}

fn optional(value: String) -> Option<String> {
    Some(value).filter(|v| !v.is_empty())
}

fn prompt_number<T>(label: &str, current: T) -> CliResult<T>
where
    T: FromStr + ToString,
{
    let raw = ui::prompt_default(label, &current.to_string())?;
    parse_number(&raw)
}

fn parse_number<T: FromStr>(raw: &str) -> CliResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| VaultError::Validation(format!("not a number: {}", raw)).into())
}
