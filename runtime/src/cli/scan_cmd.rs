//! `catalog scan <site>`: discover, learn, extract, and persist one full run.

use crate::audit::logger::{ProductLog, ProductSink};
use crate::cli::output::{self, Styled};
use crate::cli::progress::PhaseProgress;
use crate::config::PipelineConfig;
use crate::pipeline::progress::TracingProgress;
use crate::pipeline::report::RunReport;
use crate::pipeline::Pipeline;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Run the scan command.
pub async fn run(site: &str, config: PipelineConfig, output_path: Option<PathBuf>) -> Result<()> {
    let s = Styled::new();
    let interactive = !output::is_quiet() && !output::is_json();

    let pipeline = Pipeline::new(&output::normalize_site(site), config)
        .with_context(|| format!("cannot scan {site}"))?;

    let bar = interactive.then(|| Arc::new(PhaseProgress::new()));
    let pipeline = match &bar {
        Some(bar) => pipeline.with_progress(bar.clone()),
        None => pipeline.with_progress(Arc::new(TracingProgress::default())),
    };

    // Ctrl-C stops new work; every pending URL is still reported
    let token = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, letting in-flight requests finish");
            token.cancel();
        }
    });

    if interactive {
        output::print_header(&s);
        eprintln!("  Scanning {}", s.cyan(pipeline.base_url().as_str()));
        eprintln!();
    }

    let report = pipeline.run().await;
    if let Some(bar) = &bar {
        bar.finish();
    }

    let path = output_path.unwrap_or_else(|| ProductLog::default_path(report.run_id));
    let mut log = ProductLog::open(&path)?;
    log.persist(&report.products, &report)?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "report": report,
            "output": path.display().to_string(),
        }));
        return Ok(());
    }

    if !output::is_quiet() {
        print_summary(&s, &report);
        eprintln!();
        eprintln!("  Products written to {}", s.dim(&path.display().to_string()));
    }
    Ok(())
}

fn print_summary(s: &Styled, report: &RunReport) {
    let stats = &report.stats;
    eprintln!();
    output::print_section(s, "Discovery");
    output::print_field(
        "sitemap",
        report.sitemap.as_deref().unwrap_or("none"),
    );
    output::print_field("candidates", &report.discovered.to_string());
    if report.used_fallback_discovery {
        output::print_field("fallback", "homepage and category pages");
    }

    output::print_section(s, "Learning");
    match &report.pattern {
        Some(p) => output::print_field(
            "pattern",
            &format!(
                "{} ({:.0}% of {} samples)",
                p.template, p.confidence_percent, p.sample_size
            ),
        ),
        None => output::print_field("pattern", "none"),
    }
    if let Some(mode) = report.learn_mode {
        output::print_field("mode", &format!("{mode:?}"));
    }
    output::print_field("validated", &report.validations.to_string());

    output::print_section(s, "Extraction");
    let ok = stats.succeeded.to_string();
    output::print_check(s.ok_sym(), "succeeded", &s.green(&ok));
    if stats.incomplete > 0 {
        output::print_check(s.warn_sym(), "incomplete", &s.yellow(&stats.incomplete.to_string()));
    }
    let hard_failures = stats.failed - stats.incomplete - stats.cancelled;
    if hard_failures > 0 {
        output::print_check(s.fail_sym(), "failed", &s.red(&hard_failures.to_string()));
    }
    if stats.cancelled > 0 {
        output::print_check(s.warn_sym(), "cancelled", &stats.cancelled.to_string());
    }
    if output::is_verbose() {
        for (kind, count) in &stats.errors {
            output::print_field(kind, &count.to_string());
        }
        for (source, count) in &stats.sources {
            output::print_field(source, &count.to_string());
        }
    }

    output::print_section(s, "HTTP");
    output::print_field("requests", &stats.http_requests.to_string());
    let throttled = stats.rate_limited_responses.to_string();
    if stats.rate_limited_responses > 0 {
        output::print_field("rate limited", &s.yellow(&throttled));
    } else {
        output::print_field("rate limited", &throttled);
    }
    output::print_field("elapsed", &output::format_duration(report.elapsed));
}
