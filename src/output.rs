use crate::error::AssocError;
use crate::types::{Variant, VariantResult};
use anyhow::Result;
use csv::Writer;
use std::io::Write;
use std::path::Path;

/// Pair each test outcome with the identity of its variant.
pub fn pair_results(variants: &[Variant], outcomes: &[Result<f64, AssocError>]) -> Vec<VariantResult> {
    variants
        .iter()
        .zip(outcomes)
        .map(|(v, outcome)| match outcome {
            Ok(p) => VariantResult {
                chrom: v.chrom.clone(),
                pos: v.pos,
                p_value: Some(*p),
                note: String::new(),
            },
            Err(e) => VariantResult {
                chrom: v.chrom.clone(),
                pos: v.pos,
                p_value: None,
                note: e.to_string(),
            },
        })
        .collect()
}

pub fn write_results(results: &[VariantResult], path: &Path) -> Result<()> {
    let wtr = Writer::from_path(path)?;
    write_results_to(results, wtr)
}

pub fn write_results_to<W: Write>(results: &[VariantResult], mut wtr: Writer<W>) -> Result<()> {
    wtr.write_record(["chrom", "pos", "p_value", "note"])?;

    for result in results {
        let p_value = result
            .p_value
            .map(|p| format!("{:.6e}", p))
            .unwrap_or_default();
        wtr.write_record([
            result.chrom.as_str(),
            result.pos.to_string().as_str(),
            p_value.as_str(),
            result.note.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
