//! `catalog extract <url>`: fetch one page and print the cascaded record.

use crate::cli::output::{self, Styled};
use crate::cli::progress::create_spinner;
use crate::config::PipelineConfig;
use crate::error::ErrorKind;
use crate::pipeline::Pipeline;
use crate::types::ExtractedProduct;
use anyhow::{Context, Result};

/// Run the extract command.
pub async fn run(url: &str, config: PipelineConfig) -> Result<()> {
    let s = Styled::new();
    let url = output::normalize_site(url);
    let pipeline = Pipeline::new(&url, config).with_context(|| format!("cannot fetch {url}"))?;

    let spinner = (!output::is_quiet() && !output::is_json()).then(|| create_spinner("Fetching"));
    let product = pipeline.extract_url(&url).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if output::is_json() {
        output::print_json(&serde_json::to_value(&product)?);
        return Ok(());
    }

    print_product(&s, &product);
    Ok(())
}

fn print_product(s: &Styled, p: &ExtractedProduct) {
    let status = match &p.error {
        None => s.ok_sym(),
        Some(ErrorKind::ExtractionIncomplete) => s.warn_sym(),
        Some(_) => s.fail_sym(),
    };
    eprintln!();
    output::print_check(status, "url", &p.url);
    output::print_field("name", p.name.as_deref().unwrap_or("-"));
    output::print_field("price", &output::format_price(p.price, p.currency.as_deref()));
    if p.original_price.is_some() {
        output::print_field(
            "original price",
            &output::format_price(p.original_price, p.currency.as_deref()),
        );
    }
    output::print_field("brand", p.brand.as_deref().unwrap_or("-"));
    output::print_field("sku", p.sku.as_deref().unwrap_or("-"));
    if let Some(gtin) = &p.gtin {
        output::print_field("gtin", gtin);
    }
    let availability = match p.availability.as_bool() {
        Some(true) => "in stock",
        Some(false) => "out of stock",
        None => "unknown",
    };
    output::print_field("availability", availability);
    if let Some(source) = p.extraction_source {
        output::print_field("source", &format!("{source:?}"));
    }
    for (i, image) in p.images.iter().enumerate() {
        let label = if i == 0 { "images" } else { "" };
        output::print_field(label, &s.dim(image));
    }
    if let Some(error) = &p.error {
        output::print_field("error", &s.red(&error.to_string()));
    }
}
