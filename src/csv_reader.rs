use crate::types::{Group, SampleInfo, Variant};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// Leading columns of the dosage table before the per-sample columns.
const DOSAGE_FIXED_COLUMNS: [&str; 5] = ["chrom", "pos", "p_aa", "p_ab", "p_bb"];

/// Read the sample sheet: `sample_id,phenotype[,group][,high_depth]`.
pub fn load_samples(path: &Path) -> Result<Vec<SampleInfo>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open sample sheet: {}", path.display()))?;
    read_samples(file).with_context(|| format!("Failed to read sample sheet: {}", path.display()))
}

pub fn read_samples<R: Read>(reader: R) -> Result<Vec<SampleInfo>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let column = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
    let id_col = column("sample_id").context("sample sheet has no 'sample_id' column")?;
    let pheno_col = column("phenotype").context("sample sheet has no 'phenotype' column")?;
    let group_col = column("group");
    let depth_col = column("high_depth");

    let mut samples = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse sample row {}", i + 1))?;
        let ctx = || format!("sample row {}", i + 1);

        let id = record.get(id_col).with_context(ctx)?.trim().to_string();
        let is_case = parse_flag(record.get(pheno_col).with_context(ctx)?)
            .with_context(|| format!("invalid phenotype for sample '{}'", id))?;
        let group = group_col
            .and_then(|c| record.get(c))
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty());
        let high_depth = match depth_col.and_then(|c| record.get(c)) {
            Some(v) if !v.trim().is_empty() => {
                parse_flag(v).with_context(|| format!("invalid high_depth for sample '{}'", id))?
            }
            _ => false,
        };

        samples.push(SampleInfo {
            id,
            is_case,
            group,
            high_depth,
        });
    }

    if samples.is_empty() {
        anyhow::bail!("sample sheet contains no samples");
    }
    Ok(samples)
}

/// Phenotype vector and groups in sample-sheet order.
///
/// Groups are numbered by first appearance of their label. When no sample
/// carries a group label the group list is empty and all samples are tested
/// together. A group is high read depth if any of its samples is.
pub fn build_design(samples: &[SampleInfo]) -> (Vec<bool>, Vec<Group>) {
    let phenotypes = samples.iter().map(|s| s.is_case).collect();
    if samples.iter().all(|s| s.group.is_none()) {
        return (phenotypes, Vec::new());
    }

    let mut index_of: HashMap<&str, usize> = HashMap::new();
    let mut labels: Vec<&str> = Vec::new();
    let mut assignment = Vec::with_capacity(samples.len());
    let mut high_depth: HashMap<usize, bool> = HashMap::new();

    for s in samples {
        let label = s.group.as_deref().unwrap_or("");
        let k = *index_of.entry(label).or_insert_with(|| {
            labels.push(label);
            labels.len() - 1
        });
        assignment.push(k);
        *high_depth.entry(k).or_insert(false) |= s.high_depth;
    }

    // every label has at least one sample, so group k is labels[k]
    let mut groups = Group::from_assignment(&assignment, &high_depth);
    for (group, label) in groups.iter_mut().zip(&labels) {
        group.id = label.to_string();
    }
    (phenotypes, groups)
}

/// Read the dosage table and align its sample columns to `samples`.
pub fn load_dosages(path: &Path, samples: &[SampleInfo]) -> Result<Vec<Variant>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open dosage table: {}", path.display()))?;
    read_dosages(file, samples).with_context(|| format!("Failed to read dosage table: {}", path.display()))
}

/// Parse `chrom,pos,p_aa,p_ab,p_bb,<sample ids...>`.
///
/// Empty, `NA` and `.` cells are missing dosages.
pub fn read_dosages<R: Read>(reader: R, samples: &[SampleInfo]) -> Result<Vec<Variant>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    for (i, expected) in DOSAGE_FIXED_COLUMNS.iter().enumerate() {
        match headers.get(i) {
            Some(h) if h.trim().eq_ignore_ascii_case(expected) => {}
            found => anyhow::bail!(
                "dosage table column {} should be '{}', found {:?}",
                i + 1,
                expected,
                found
            ),
        }
    }

    let columns: Vec<usize> = samples
        .iter()
        .map(|s| {
            headers
                .iter()
                .skip(DOSAGE_FIXED_COLUMNS.len())
                .position(|h| h.trim() == s.id)
                .map(|c| c + DOSAGE_FIXED_COLUMNS.len())
                .with_context(|| format!("sample '{}' has no column in the dosage table", s.id))
        })
        .collect::<Result<_>>()?;

    let mut variants = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse dosage row {}", i + 1))?;
        let ctx = || format!("dosage row {}", i + 1);

        let chrom = record.get(0).with_context(ctx)?.trim().to_string();
        let pos: u64 = record.get(1).with_context(ctx)?.trim().parse().with_context(ctx)?;
        let mut genotype_freqs = [0.0; 3];
        for (k, freq) in genotype_freqs.iter_mut().enumerate() {
            *freq = record.get(2 + k).with_context(ctx)?.trim().parse().with_context(ctx)?;
        }
        let total: f64 = genotype_freqs.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            anyhow::bail!("{}: genotype frequencies sum to {}, expected 1", ctx(), total);
        }

        let dosages = columns
            .iter()
            .map(|&c| parse_dosage(record.get(c).with_context(ctx)?).with_context(ctx))
            .collect::<Result<Vec<_>>>()?;

        variants.push(Variant::new(chrom, pos, dosages, genotype_freqs));
    }
    Ok(variants)
}

fn parse_dosage(cell: &str) -> Result<Option<f64>> {
    let cell = cell.trim();
    if cell.is_empty() || cell == "." || cell.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    let value: f64 = cell
        .parse()
        .with_context(|| format!("invalid dosage '{}'", cell))?;
    if !value.is_finite() {
        return Ok(None);
    }
    Ok(Some(value))
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "case" | "true" | "yes" => Ok(true),
        "0" | "control" | "false" | "no" => Ok(false),
        other => anyhow::bail!("expected 1/0, case/control or true/false, found '{}'", other),
    }
}
