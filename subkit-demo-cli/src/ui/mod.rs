//! Terminal output helpers
//!
//! Colours are dropped automatically when stdout is not a terminal or
//! `NO_COLOR` is set.

use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Errors go to stderr
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn header(text: &str) {
    println!("\n{}", text.bold().underline());
}

pub fn key_value(key: &str, value: &str) {
    println!("  {}: {}", key.cyan(), value);
}

/// Subscription or payment status, coloured by how healthy it is
pub fn status(label: &str) -> ColoredString {
    match label {
        "active" | "approved" => label.green(),
        "trial" | "pending" => label.yellow(),
        "rejected" | "expired" => label.red(),
        _ => label.dimmed(),
    }
}

/// Steady-tick spinner on stderr; indicatif hides it off-terminal
pub fn spinner(message: &str) -> ProgressBar {
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let pb = ProgressBar::new_spinner().with_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

pub fn separator() {
    println!("{}", "─".repeat(60).dimmed());
}

pub fn json(value: &serde_json::Value) {
    if let Ok(pretty) = serde_json::to_string_pretty(value) {
        println!("{}", pretty);
    }
}
