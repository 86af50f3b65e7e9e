// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `kairo classify` - show the routing decision for a request

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use kairo_core::domain::classifier::{AffinityClassifier, Classification};
use kairo_core::domain::config::EngineConfigManifest;

#[derive(Args)]
pub struct ClassifyArgs {
    /// Request text (multiple words are joined with spaces)
    #[arg(value_name = "TEXT", required = true, num_args = 1..)]
    pub text: Vec<String>,

    /// Print the classification as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn handle_command(args: ClassifyArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = EngineConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    let classifier = AffinityClassifier::new(config.spec.classifier);
    let text = args.text.join(" ");
    let classification = classifier.classify(&text);

    if args.json {
        let json = serde_json::to_string_pretty(&classification).context("Failed to serialize classification")?;
        println!("{}", json);
    } else {
        print_classification(&text, &classification);
    }
    Ok(())
}

pub fn print_classification(text: &str, classification: &Classification) {
    let assignment = &classification.assignment;
    let affinity = &classification.affinity;

    println!("{} {}", "Request:".bold(), text);
    let fallback = if assignment.fallback {
        " (default, no agent met the threshold)".yellow().to_string()
    } else {
        String::new()
    };
    println!("{} {}{}", "Primary agent:".bold(), assignment.primary.as_str().cyan().bold(), fallback);
    if !assignment.supporting.is_empty() {
        let supporting: Vec<&str> = assignment.supporting.iter().map(|a| a.as_str()).collect();
        println!("{} {}", "Supporting:".bold(), supporting.join(", "));
    }
    println!("{} {}%", "Confidence:".bold(), affinity.confidence);
    println!("{} {}", "Complexity:".bold(), affinity.complexity);
    println!(
        "{} {}",
        "Multiple agents:".bold(),
        if assignment.needs_multiple_agents { "yes" } else { "no" }
    );
    println!("{} {}", "Actions:".bold(), assignment.suggested_actions.join(" → "));

    println!();
    println!("{}", "Scores:".bold());
    for (agent, score) in &affinity.scores {
        if *score <= 0.0 {
            continue;
        }
        let evidence = affinity
            .evidence
            .get(agent)
            .map(|terms| terms.join(", "))
            .unwrap_or_default();
        println!("  {:<14} {:>5.1}  {}", agent.as_str(), score, evidence.dimmed());
    }
}
