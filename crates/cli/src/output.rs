//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use iku_lib::{health::ComponentStatus, Category, Regime};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Two-column row for key/value summaries
#[derive(Tabled)]
pub struct FieldRow {
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl FieldRow {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Pretty-print any serializable value as JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Print rows as a rounded table
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a section heading
pub fn print_heading(title: &str) {
    println!("\n{}", title.bold());
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format an IKU value with two decimals
pub fn format_iku(value: f64) -> String {
    format!("{:.2}", value)
}

/// Format an optional metric, `-` when absent
pub fn format_optional(value: Option<f64>) -> String {
    value.map(format_iku).unwrap_or_else(|| "-".to_string())
}

/// Format a ratio as a percentage
pub fn format_percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// Color a category from green (Sangat Baik) to red (Sangat Kurang)
pub fn color_category(category: Category) -> String {
    let label = category.as_str();
    match category {
        Category::SangatBaik => label.green().bold().to_string(),
        Category::Baik => label.green().to_string(),
        Category::Sedang => label.yellow().to_string(),
        Category::Kurang => label.red().to_string(),
        Category::SangatKurang => label.red().bold().to_string(),
    }
}

/// Color the regime by how far the input lies from the training data
pub fn color_regime(regime: Regime) -> String {
    match regime {
        Regime::Ensemble => regime.as_str().green().to_string(),
        Regime::Blended => regime.as_str().yellow().to_string(),
        Regime::Linear => regime.as_str().red().to_string(),
    }
}

/// Color status based on value
pub fn color_status(status: ComponentStatus) -> String {
    match status {
        ComponentStatus::Healthy => "healthy".green().to_string(),
        ComponentStatus::Degraded => "degraded".yellow().to_string(),
        ComponentStatus::Unhealthy => "unhealthy".red().to_string(),
    }
}
