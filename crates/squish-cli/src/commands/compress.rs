//! Compress command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use squish_core::compress::{CompressionOutcome, CompressionReport, Engine};

use super::CompressArgs;
use crate::ui::{format_bytes, rule, truncate};

/// Run the compress command.
pub async fn run(args: CompressArgs, config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let engine = Engine::new(config.compression);

    tokio::fs::create_dir_all(&args.output)
        .await
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let mut reports = Vec::with_capacity(args.files.len());
    let mut failures = Vec::new();

    for file in &args.files {
        match engine.compress_file(file, &args.output).await {
            Ok(report) => reports.push((file.display().to_string(), report)),
            Err(e) => {
                tracing::debug!(file = %file.display(), error = %e, "Compression failed");
                failures.push((file.display().to_string(), e));
            }
        }
    }

    if args.json {
        let output = serde_json::json!({
            "results": reports.iter().map(|(file, report)| serde_json::json!({
                "file": file,
                "report": report,
                "savings_percent": report.savings_percent(),
            })).collect::<Vec<_>>(),
            "errors": failures.iter().map(|(file, e)| serde_json::json!({
                "file": file,
                "code": e.code(),
                "message": e.to_string(),
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        display_reports(&reports);
        for (file, e) in &failures {
            eprintln!("  {}: {}", file, e);
            if let Some(hint) = e.suggestion() {
                eprintln!("    {}", hint.replace('\n', "\n    "));
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} of {} files failed", failures.len(), args.files.len())
    }
}

fn display_reports(reports: &[(String, CompressionReport)]) {
    if reports.is_empty() {
        return;
    }

    println!();
    rule(78);
    println!(
        "  {:28}  {:14}  {:10}  {:10}  {:6}",
        "File", "Setting", "Before", "After", "Saved"
    );
    rule(78);

    let mut before = 0;
    let mut after = 0;
    for (file, report) in reports {
        before += report.original_size;
        after += report.output_size;

        let saved = match report.outcome {
            CompressionOutcome::Compressed => format!("{:.0}%", report.savings_percent()),
            CompressionOutcome::KeptOriginal => "kept".to_string(),
        };
        println!(
            "  {:28}  {:14}  {:10}  {:10}  {:6}",
            truncate(file, 28),
            report.parameter.to_string(),
            format_bytes(report.original_size),
            format_bytes(report.output_size),
            saved
        );
    }

    rule(78);
    println!(
        "  {:28}  {:14}  {:10}  {:10}",
        format!("{} files", reports.len()),
        "",
        format_bytes(before),
        format_bytes(after)
    );
    println!();
}
