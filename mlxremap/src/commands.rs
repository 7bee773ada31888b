use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use mlxremap_core::{
    fetch_checkpoint, verify_dir, FetchOptions, MissingKeyPolicy, RemapJob, RemapReport,
    VerificationReport,
};

/// Missing keys listed before the rest are summarised.
const MISSING_KEYS_SHOWN: usize = 10;

const REMAP_USAGE: &str = "Usage: mlxremap remap [SOURCE] [--output-dir DIR] [--strict]";

pub fn remap(source: PathBuf, output_dir: PathBuf, strict: bool) -> ExitCode {
    let policy = if strict {
        MissingKeyPolicy::Strict
    } else {
        MissingKeyPolicy::BestEffort
    };
    let job = RemapJob::new(source, output_dir).with_policy(policy);

    match run_remap(&job) {
        Ok(report) => {
            print_remap_summary(&job, &report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("\n✗ Error: {e:#}");
            println!("\n{REMAP_USAGE}");
            ExitCode::FAILURE
        }
    }
}

fn run_remap(job: &RemapJob) -> anyhow::Result<RemapReport> {
    job.run()
        .with_context(|| format!("remapping {}", job.source.display()))
}

fn print_remap_summary(job: &RemapJob, report: &RemapReport) {
    let meta = &report.metadata;
    println!("\n✓ Conversion complete");
    println!("  Output:        {}", job.output_dir.display());
    println!("  Layers:        {}", meta.num_layers);
    println!("  Experts:       {}", meta.num_experts);
    println!(
        "  Intermediate:  {} (routed {}, shared {})",
        meta.unified_intermediate_size,
        meta.routed_intermediate_size,
        meta.shared_intermediate_size
    );
    println!(
        "  Tensors:       {} mapped of {} source ({:.1}%)",
        report.stats.mapped,
        report.stats.source_tensors,
        report.stats.mapping_rate()
    );
    if !report.stats.skipped.is_empty() {
        println!(
            "  Skipped:       {} keys (run `mlxremap verify` for details)",
            report.stats.skipped.len()
        );
    }
}

pub fn verify(output_dir: &Path) -> ExitCode {
    let report = match verify_dir(output_dir)
        .with_context(|| format!("verifying {}", output_dir.display()))
    {
        Ok(report) => report,
        Err(e) => {
            println!("\n✗ Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    for line in verification_lines(&report) {
        println!("{line}");
    }
    if report.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn verification_lines(report: &VerificationReport) -> Vec<String> {
    if report.is_complete() {
        return vec![format!(
            "✓ All required weights present ({} tensors)",
            report.total
        )];
    }

    let mut lines = vec![format!(
        "✗ Missing {} weights ({} tensors present):",
        report.missing.len(),
        report.total
    )];
    lines.extend(
        report
            .missing
            .iter()
            .take(MISSING_KEYS_SHOWN)
            .map(|key| format!("  - {key}")),
    );
    if report.missing.len() > MISSING_KEYS_SHOWN {
        lines.push(format!(
            "  ... and {} more",
            report.missing.len() - MISSING_KEYS_SHOWN
        ));
    }
    lines
}

pub fn fetch(repo_id: String, filename: String, local_dir: PathBuf) -> ExitCode {
    let options = FetchOptions {
        repo_id,
        filename,
        local_dir,
    };
    if fetch_checkpoint(&options) {
        println!("✓ Checkpoint at {}", options.target_path().display());
        ExitCode::SUCCESS
    } else {
        println!("✗ Download failed");
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(missing: usize) -> VerificationReport {
        VerificationReport {
            total: 40,
            missing: (0..missing).map(|i| format!("key.{i}")).collect(),
        }
    }

    #[test]
    fn test_complete_report_is_one_line() {
        let lines = verification_lines(&report(0));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("40 tensors"));
    }

    #[test]
    fn test_missing_keys_are_truncated() {
        let lines = verification_lines(&report(13));
        // header, ten keys, remainder
        assert_eq!(lines.len(), 12);
        assert_eq!(lines[1], "  - key.0");
        assert_eq!(lines[10], "  - key.9");
        assert_eq!(lines[11], "  ... and 3 more");
    }

    #[test]
    fn test_missing_keys_without_remainder() {
        let lines = verification_lines(&report(10));
        assert_eq!(lines.len(), 11);
        assert!(!lines.iter().any(|l| l.contains("more")));
    }

    #[test]
    fn test_missing_source_fails() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let code = remap(dir.path().join("absent.pt"), dir.path().join("out"), false);
        assert_eq!(code, ExitCode::FAILURE);
        assert!(!dir.path().join("out").exists());
        Ok(())
    }

    #[test]
    fn test_verify_without_weights_fails() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("config.json"), r#"{"num_hidden_layers": 1}"#)?;
        assert_eq!(verify(dir.path()), ExitCode::FAILURE);
        Ok(())
    }
}
