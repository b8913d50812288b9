//! `catalog learn <site>`: discover candidates and learn the product URL
//! pattern without running extraction.

use crate::cli::output::{self, Styled};
use crate::cli::progress::PhaseProgress;
use crate::config::PipelineConfig;
use crate::pipeline::Pipeline;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;

/// Run the learn command. `show` sample product URLs are listed.
pub async fn run(site: &str, config: PipelineConfig, show: usize) -> Result<()> {
    let s = Styled::new();
    let start = Instant::now();
    let interactive = !output::is_quiet() && !output::is_json();

    let mut pipeline = Pipeline::new(&output::normalize_site(site), config)
        .with_context(|| format!("cannot learn {site}"))?;
    let bar = interactive.then(|| Arc::new(PhaseProgress::new()));
    if let Some(bar) = &bar {
        pipeline = pipeline.with_progress(bar.clone());
    }

    let discovery = pipeline.discover().await;
    let selection = pipeline.select(&discovery).await;
    if let Some(bar) = &bar {
        bar.finish();
    }
    let learned = &selection.learned;

    if output::is_json() {
        let sample: Vec<&str> = learned
            .filtered
            .iter()
            .take(show)
            .map(|c| c.url.as_str())
            .collect();
        output::print_json(&serde_json::json!({
            "site": pipeline.base_url().as_str(),
            "sitemap": discovery.sitemap,
            "discovered": selection.discovered,
            "used_fallback_discovery": selection.used_fallback,
            "pattern": learned.pattern,
            "mode": learned.mode,
            "validations": learned.validations,
            "validated_products": learned.validated_products,
            "matched": learned.filtered.len(),
            "sample": sample,
            "http_requests": pipeline.client().requests_sent(),
            "duration_ms": start.elapsed().as_millis() as u64,
        }));
        return Ok(());
    }

    if output::is_quiet() {
        for candidate in &learned.filtered {
            println!("{}", candidate.url);
        }
        return Ok(());
    }

    eprintln!();
    output::print_section(&s, pipeline.base_url().as_str());
    output::print_field("sitemap", discovery.sitemap.as_deref().unwrap_or("none"));
    output::print_field("candidates", &selection.discovered.to_string());
    match &learned.pattern {
        Some(p) => {
            output::print_check(s.ok_sym(), "pattern", &s.green(&p.template));
            output::print_field("regex", p.regex.as_str());
            output::print_field(
                "confidence",
                &format!("{:.0}% (precision {:.0}%)", p.confidence_percent, p.precision_percent),
            );
        }
        None => output::print_check(s.warn_sym(), "pattern", &s.yellow("none")),
    }
    output::print_field("mode", &format!("{:?}", learned.mode));
    output::print_field(
        "validated",
        &format!("{} ({} products)", learned.validations, learned.validated_products),
    );
    output::print_field("matched", &learned.filtered.len().to_string());
    output::print_field("elapsed", &output::format_duration(start.elapsed()));

    if show > 0 && !learned.filtered.is_empty() {
        eprintln!();
        for candidate in learned.filtered.iter().take(show) {
            eprintln!("    {}", s.dim(&candidate.url));
        }
        if learned.filtered.len() > show {
            eprintln!("    {}", s.dim(&format!("... {} more", learned.filtered.len() - show)));
        }
    }
    Ok(())
}
