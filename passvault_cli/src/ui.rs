//! PassVault CLI - Terminal rendering and prompts

use console::{style, Term};
use passvault_core::{Credential, RevealedCredential};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{CliError, CliResult};

const DIVIDER_WIDTH: usize = 60;
const MASK: &str = "••••••••••••";

pub fn banner() {
    println!();
    println!("  {}", style("🔐 PassVault").cyan().bold());
    println!(
        "  {}",
        style(format!(
            "v{} - encrypted locally, stored remotely",
            passvault_core::VERSION
        ))
        .dim()
    );
    println!();
}

pub fn section(title: &str) {
    println!();
    println!("{}", style(format!("▶ {}", title)).cyan().bold());
    divider();
}

pub fn divider() {
    println!("{}", style("─".repeat(DIVIDER_WIDTH)).dim());
}

pub fn success(msg: &str) {
    println!("{} {}", style("✅").green(), msg);
}

pub fn info(msg: &str) {
    println!("{} {}", style("ℹ").blue(), msg);
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", style("⚠️").yellow(), style(msg).yellow());
}

pub fn error(msg: &str) {
    eprintln!("{} {}", style("❌").red(), style(msg).red());
}

pub fn key_value(key: &str, value: &str) {
    println!("  {:<15} {}", style(format!("{}:", key)).dim(), value);
}

/// Shorten to `max` characters, marking the cut with `...`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

pub fn credential_table(records: &[Credential]) {
    if records.is_empty() {
        info("No credentials found");
        return;
    }

    println!(
        "  {:<16} {:<24} {:<24} {:<12}",
        style("ID").bold(),
        style("TITLE").bold(),
        style("USERNAME").bold(),
        style("CATEGORY").bold()
    );
    divider();
    for record in records {
        println!(
            "  {:<16} {:<24} {:<24} {:<12}",
            truncate(&record.id, 16),
            truncate(&record.title, 24),
            truncate(&record.username, 24),
            truncate(&record.category, 12)
        );
    }
    divider();
    println!("  {} credential(s)", records.len());
}

pub fn credential_card(credential: &RevealedCredential, reveal: bool) {
    section(&credential.title);
    key_value("ID", &credential.id);
    key_value("Username", &credential.username);
    key_value("URL", &credential.url);
    key_value("Category", &credential.category);

    if reveal {
        key_value(
            "Password",
            &style(credential.password.expose_secret()).green().to_string(),
        );
        if let Some(notes) = &credential.notes {
            key_value("Notes", notes.expose_secret());
        }
    } else {
        key_value("Password", &style(MASK).yellow().to_string());
        if credential.notes.is_some() {
            key_value("Notes", &style("(hidden, use --show)").dim().to_string());
        }
    }
    if let Some(updated) = &credential.updated {
        key_value("Updated", updated);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROMPTS
// ═══════════════════════════════════════════════════════════════════════════

/// Read a line from the terminal, trimmed.
pub fn prompt(label: &str) -> CliResult<String> {
    let term = Term::stdout();
    term.write_str(&format!("{} ", style(format!("{}:", label)).bold()))?;
    Ok(term.read_line()?.trim().to_string())
}

/// Like [`prompt`], falling back to `default` on empty input.
pub fn prompt_default(label: &str, default: &str) -> CliResult<String> {
    let value = prompt(&format!("{} [{}]", label, default))?;
    Ok(if value.is_empty() {
        default.to_string()
    } else {
        value
    })
}

/// Read a secret without echo.
pub fn prompt_secret(label: &str) -> CliResult<SecretString> {
    let value = rpassword::prompt_password(format!("{}: ", label))?;
    Ok(SecretString::from(value))
}

/// Read a secret that must not be empty.
pub fn prompt_required_secret(label: &str) -> CliResult<SecretString> {
    let value = prompt_secret(label)?;
    if value.expose_secret().is_empty() {
        return Err(CliError::Cancelled);
    }
    Ok(value)
}

pub fn confirm(question: &str) -> CliResult<bool> {
    let answer = prompt(&format!("{} [y/N]", question))?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
}

/// Yes/no question where an empty answer picks `default`.
pub fn confirm_default(question: &str, default: bool) -> CliResult<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    let answer = prompt(&format!("{} {}", question, hint))?;
    Ok(match answer.to_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
        assert_eq!(truncate("a much longer title", 10), "a much ...");
        assert_eq!(truncate("żółćżółćżółć", 6), "żół...");
    }
}
