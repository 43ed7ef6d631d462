//! Colored console output
//!
//! Uses owo-colors for terminal colors. Warnings and errors go to stderr so
//! that piped stdout stays readable.

use owo_colors::OwoColorize;

/// Print an action header (blue, bold)
/// Example: "==> Pulling alpine:3.18"
pub fn action(message: &str) {
    println!("{} {}", "==>".blue().bold(), message.bold());
}

/// Print an action with a batch counter
/// Example: "(1/3) Acquiring lodash"
pub fn action_numbered(current: usize, total: usize, message: &str) {
    println!(
        "{} {}",
        format!("({}/{})", current, total).cyan(),
        message.bold()
    );
}

/// Print a detail line (dimmed)
/// Example: "     downloading lodash-4.17.21.tgz"
pub fn detail(message: &str) {
    println!("     {}", message.dimmed());
}

/// Print a success message (green)
pub fn success(message: &str) {
    println!("{} {}", "==>".green().bold(), message.green());
}

/// Print an info message (cyan)
pub fn info(message: &str) {
    println!("{} {}", "::".cyan(), message);
}

/// Print a warning message (yellow)
pub fn warning(message: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), message.yellow());
}

/// Print an error message (red)
pub fn error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message.red());
}

/// Print a skip message (dimmed)
/// Example: "==> lodash-4.17.21.tgz already present, skipping"
pub fn skip(message: &str) {
    println!("{} {}", "==>".dimmed(), message.dimmed());
}

/// Print one entry of a listing
pub fn list_item(name: &str, note: &str) {
    println!("  {} {}", name.green(), note.dimmed());
}
