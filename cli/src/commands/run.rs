// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `kairo run` - execute requests in-process with a simulated handler

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use kairo_core::domain::task::TaskRequest;
use kairo_core::infrastructure::event_bus::EventBusError;
use kairo_core::infrastructure::repositories::JsonLinesOutcomeSink;

use crate::embedded::{print_event, print_report, EmbeddedEngine};
use crate::simulation::{simulated_handler, SimulationProfile};

#[derive(Args)]
pub struct RunArgs {
    /// Requests to run, one per argument
    #[arg(value_name = "TEXT", required = true, num_args = 1..)]
    pub requests: Vec<String>,

    /// Share of tasks the simulated handler fails (0.0 - 1.0)
    #[arg(long, default_value = "0.0")]
    pub fail_rate: f64,

    /// Give up waiting after this many seconds and cancel what is left
    #[arg(long, default_value = "30")]
    pub wait_secs: u64,

    /// Append terminal task records to this JSON-lines file
    #[arg(long, value_name = "FILE")]
    pub record: Option<PathBuf>,

    /// Only print the final report
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn handle_command(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    if !(0.0..=1.0).contains(&args.fail_rate) {
        anyhow::bail!("--fail-rate must be between 0.0 and 1.0, got {}", args.fail_rate);
    }

    let mut engine = EmbeddedEngine::new(config_path)?;
    if let Some(path) = &args.record {
        engine.attach_sink(Arc::new(JsonLinesOutcomeSink::new(path)));
    }

    let coordinator = engine.coordinator().clone();
    let printer = (!args.quiet).then(|| {
        let mut events = coordinator.event_bus().subscribe();
        let stopped = coordinator.scheduler().stopped();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped.cancelled() => {
                        while let Ok(event) = events.try_recv() {
                            print_event(&event);
                        }
                        break;
                    }
                    event = events.recv() => match event {
                        Ok(event) => print_event(&event),
                        Err(EventBusError::Lagged(n)) => warn!(skipped = n, "Event printer fell behind"),
                        Err(_) => break,
                    }
                }
            }
        })
    });

    let handler = simulated_handler(SimulationProfile {
        fail_rate: args.fail_rate,
        ..SimulationProfile::default()
    });

    let mut task_ids = Vec::with_capacity(args.requests.len());
    for text in &args.requests {
        let submission = coordinator
            .submit_request(TaskRequest::new(text.clone()).with_context("source", "cli"), handler.clone())
            .with_context(|| format!("Failed to submit {:?}", text))?;
        if !args.quiet {
            let assignment = &submission.classification.assignment;
            println!(
                "{} {:?} → {} (confidence {}%, {}, priority {})",
                "routed   ".bold(),
                text,
                assignment.primary.as_str().cyan().bold(),
                submission.classification.affinity.confidence,
                submission.classification.affinity.complexity,
                submission.priority
            );
        }
        task_ids.push(submission.task_id);
    }

    let waits = futures::future::join_all(task_ids.iter().map(|id| coordinator.wait_for_terminal(*id)));
    if tokio::time::timeout(Duration::from_secs(args.wait_secs), waits).await.is_err() {
        eprintln!(
            "{}",
            format!("Timed out after {}s, cancelling unfinished tasks", args.wait_secs).yellow()
        );
        for id in &task_ids {
            if coordinator.status(*id).map(|t| !t.is_terminal()).unwrap_or(false) {
                let _ = coordinator.cancel(*id);
            }
        }
    }

    let report = engine.shutdown().await?;
    if let Some(printer) = printer {
        printer.await.context("Event printer panicked")?;
    }
    print_report(&report);

    if let Some(path) = &args.record {
        println!();
        println!("{}", format!("✓ Task records appended to {}", path.display()).green());
    }
    Ok(())
}
