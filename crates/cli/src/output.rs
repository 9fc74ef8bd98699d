//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a probability as a percentage
pub fn format_probability(p: f64) -> String {
    format!("{:.1}%", p * 100.0)
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ready" => status.green().to_string(),
        "degraded" | "not ready" => status.yellow().to_string(),
        "unhealthy" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color a prediction label; churn is highlighted
pub fn color_label(label: &str) -> String {
    if label.eq_ignore_ascii_case("churn") {
        label.red().bold().to_string()
    } else {
        label.green().to_string()
    }
}

/// Color a churn probability by risk band
pub fn color_churn_probability(p: f64) -> String {
    let formatted = format_probability(p);
    if p >= 0.5 {
        formatted.red().to_string()
    } else if p >= 0.25 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.to_string()
    }
}
