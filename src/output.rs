use std::io::{self, Write};

use camino::Utf8Path;
use serde::Serialize;
use tracing::info;

use crate::app::{CacheListing, ProgressEvent, ProgressSink, RunResult};
use crate::blast::BLAST_COLUMNS;
use crate::domain::{ConsensusRow, Hit, SequenceIndex, TaxonomyRecord};
use crate::error::LctrError;
use crate::store::Store;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_cache(listing: &CacheListing) -> io::Result<()> {
        Self::print_json(listing)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

pub fn write_taxonomy_table(path: &Utf8Path, records: &[TaxonomyRecord]) -> Result<(), LctrError> {
    let rows = records.iter().map(|record| {
        vec![
            record.taxon_id.to_string(),
            opt_str(&record.scientific_name),
            opt_str(&record.rank),
            opt_str(&record.lineage),
        ]
    });
    write_table(path, &["TaxID", "ScientificName", "Rank", "Lineage"], rows)
}

pub fn write_merged_table(path: &Utf8Path, hits: &[Hit]) -> Result<(), LctrError> {
    let header = hit_header(false);
    write_table(path, &header, hits.iter().map(hit_row))
}

pub fn write_best_hits_table(
    path: &Utf8Path,
    hits: &[Hit],
    sequences: &SequenceIndex,
) -> Result<(), LctrError> {
    let header = hit_header(true);
    let rows = hits.iter().map(|hit| {
        let mut row = hit_row(hit);
        row.push(sequences.get(&hit.query_id).cloned().unwrap_or_default());
        row
    });
    write_table(path, &header, rows)
}

pub fn write_consensus_table(path: &Utf8Path, rows: &[ConsensusRow]) -> Result<(), LctrError> {
    let rows = rows.iter().map(|row| {
        vec![
            row.query_id.clone(),
            opt_str(&row.sequence),
            row.result.final_taxon.clone(),
            row.result.explanation.clone(),
        ]
    });
    write_table(path, &["ASV", "ASV_sequence", "Final_Taxon", "Explanation"], rows)
}

pub fn write_ranked_table(path: &Utf8Path, rows: &[ConsensusRow]) -> Result<(), LctrError> {
    let rows = rows.iter().map(|row| {
        vec![
            row.query_id.clone(),
            opt_str(&row.sequence),
            row.result.final_taxon.clone(),
            opt_str(&row.result.rank),
            row.result.explanation.clone(),
        ]
    });
    write_table(
        path,
        &["ASV", "ASV_sequence", "Final_Taxon", "Final_Taxon_Rank", "Explanation"],
        rows,
    )
}

fn write_table<I>(path: &Utf8Path, header: &[&str], rows: I) -> Result<(), LctrError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());
    writer
        .write_record(header)
        .map_err(|err| LctrError::TableWrite(err.to_string()))?;
    let mut count = 0usize;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|err| LctrError::TableWrite(err.to_string()))?;
        count += 1;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| LctrError::TableWrite(err.to_string()))?;
    Store::write_bytes_atomic(path, &bytes)?;
    info!(path = %path, rows = count, "saved table");
    Ok(())
}

fn hit_header(with_sequence: bool) -> Vec<&'static str> {
    let mut header: Vec<&'static str> = BLAST_COLUMNS.to_vec();
    header.extend(["ScientificName", "Rank", "Lineage"]);
    if with_sequence {
        header.push("ASV_sequence");
    }
    header
}

fn hit_row(hit: &Hit) -> Vec<String> {
    let detail = &hit.detail;
    vec![
        hit.query_id.clone(),
        opt_f64(hit.query_coverage),
        hit.subject_id.clone(),
        opt_f64(hit.percent_identity),
        opt_u64(detail.length),
        opt_u64(detail.query_length),
        opt_u64(detail.subject_length),
        opt_u64(detail.mismatches),
        opt_u64(detail.gap_opens),
        opt_u64(detail.query_start),
        opt_u64(detail.query_end),
        opt_u64(detail.subject_start),
        opt_u64(detail.subject_end),
        opt_f64(hit.e_value),
        opt_f64(hit.bitscore),
        opt_str(&detail.subject_title),
        opt_str(&hit.scientific_name),
        opt_str(&detail.blast_names),
        opt_str(&detail.common_names),
        hit.taxon_id
            .as_ref()
            .map(|taxon_id| taxon_id.to_string())
            .unwrap_or_default(),
        opt_str(&hit.taxonomy_name),
        opt_str(&hit.rank),
        opt_str(&hit.lineage),
    ]
}

fn opt_str(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn opt_u64(value: Option<u64>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

fn opt_f64(value: Option<f64>) -> String {
    value.map(format_f64).unwrap_or_default()
}

pub fn format_f64(value: f64) -> String {
    let magnitude = value.abs();
    if value != 0.0 && !(1e-4..1e15).contains(&magnitude) {
        format!("{value:e}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_scores_like_blast() {
        assert_eq!(format_f64(1e-40), "1e-40");
        assert_eq!(format_f64(99.5), "99.5");
        assert_eq!(format_f64(100.0), "100");
        assert_eq!(format_f64(0.0), "0");
    }

    #[test]
    fn hit_rows_match_header_width() {
        assert_eq!(hit_row(&Hit::default()).len(), hit_header(false).len());
    }
}
