// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use kairo_core::domain::config::EngineConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output path (default: ./kairo-config.yaml)
        #[arg(short, long, default_value = "./kairo-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        for (index, path) in EngineConfigManifest::search_paths().iter().enumerate() {
            let marker = if path.exists() { "found".green() } else { "missing".dimmed() };
            println!("  {}. {} [{}]", index + 2, path.display(), marker);
        }
        println!();
    }

    let config = EngineConfigManifest::load_or_default(config_override).context("Failed to load configuration")?;
    let spec = &config.spec;

    println!("{} {}", "Current configuration:".bold(), config.metadata.name);
    println!();

    println!("{}", "Resource Pool:".bold());
    println!("  Memory: {} MiB", spec.pool.max_memory_bytes / (1024 * 1024));
    println!("  CPU: {}%", spec.pool.max_cpu_percent);
    println!("  Concurrent tasks: {}", spec.pool.max_concurrent_tasks);
    println!();

    println!("{}", "Scheduler:".bold());
    println!("  Dispatch interval: {}ms", spec.scheduler.dispatch_interval_ms);
    println!(
        "  Priority penalty: degraded -{}, failing -{}",
        spec.scheduler.degraded_priority_penalty, spec.scheduler.failing_priority_penalty
    );
    println!();

    println!("{}", "Classifier:".bold());
    println!(
        "  Thresholds: admission {}, decisive {}",
        spec.classifier.admission_threshold, spec.classifier.decisive_threshold
    );
    println!("  Default agent: {}", spec.classifier.default_agent);
    println!(
        "  Health discount: degraded ×{}, failing ×{}",
        spec.classifier.degraded_discount, spec.classifier.failing_discount
    );
    println!();

    println!("{}", "Health:".bold());
    println!(
        "  Window: {} outcomes (min {} before rating)",
        spec.health.window_size, spec.health.min_observations
    );
    println!(
        "  Failing below {:.0}% success or above {}ms average",
        spec.health.failing_success_rate * 100.0,
        2 * spec.health.duration_ceiling_ms
    );
    println!(
        "  Degraded below {:.0}% success or above {}ms average",
        spec.health.degraded_success_rate * 100.0,
        spec.health.duration_ceiling_ms
    );
    println!();

    println!("{}", "Budgets:".bold());
    for (name, budget) in [
        ("low", spec.budgets.low),
        ("medium", spec.budgets.medium),
        ("high", spec.budgets.high),
    ] {
        println!(
            "  {:<7} {} MiB, {}% cpu",
            name,
            budget.memory_bytes / (1024 * 1024),
            budget.cpu_percent
        );
    }

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = EngineConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    EngineConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
