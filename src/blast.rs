use std::collections::BTreeSet;
use std::io::BufRead;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::domain::{AlignmentDetail, BlastRecord, TaxId, non_empty};
use crate::error::LctrError;
use crate::fs_util::open_text;

pub const BLAST_COLUMNS: [&str; 20] = [
    "qseqid",
    "qcovs",
    "sseqid",
    "pident",
    "length",
    "qlen",
    "slen",
    "mismatch",
    "gapopen",
    "qstart",
    "qend",
    "sstart",
    "send",
    "evalue",
    "bitscore",
    "stitle",
    "sscinames",
    "sblastnames",
    "scomnames",
    "TaxID",
];

#[derive(Debug, Default)]
pub struct BlastTable {
    pub records: Vec<BlastRecord>,
    pub skipped_rows: usize,
}

pub fn read_blast(path: &Path) -> Result<BlastTable, LctrError> {
    let reader = open_text(path)?;
    let table = parse_blast(reader)?;
    info!(
        path = %path.display(),
        hits = table.records.len(),
        skipped = table.skipped_rows,
        "read BLAST results"
    );
    Ok(table)
}

// Malformed rows are skipped with a warning; only read failures abort.
pub fn parse_blast<R: BufRead>(reader: R) -> Result<BlastTable, LctrError> {
    let mut table = BlastTable::default();
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|err| LctrError::Filesystem(err.to_string()))?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_row(line, line_no) {
            Ok(record) => table.records.push(record),
            Err(err) => {
                warn!(line = line_no, error = %err, "skipping BLAST row");
                table.skipped_rows += 1;
            }
        }
    }
    Ok(table)
}

fn parse_row(line: &str, line_no: usize) -> Result<BlastRecord, LctrError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < BLAST_COLUMNS.len() {
        return Err(LctrError::BlastParse {
            line: line_no,
            message: format!(
                "expected {} columns, found {}",
                BLAST_COLUMNS.len(),
                fields.len()
            ),
        });
    }
    let query_id = fields[0].trim();
    if query_id.is_empty() {
        return Err(LctrError::BlastParse {
            line: line_no,
            message: "empty query id".to_string(),
        });
    }

    // staxids may hold several ids; only a single numeric id joins to taxonomy.
    let taxon_id = fields[19].parse::<TaxId>().ok();
    if taxon_id.is_none() && !fields[19].trim().is_empty() {
        debug!(line = line_no, value = fields[19], "ignoring non-numeric taxid");
    }

    Ok(BlastRecord {
        query_id: query_id.to_string(),
        subject_id: fields[2].trim().to_string(),
        query_coverage: parse_f64(fields[1]),
        percent_identity: parse_f64(fields[3]),
        e_value: parse_f64(fields[13]),
        bitscore: parse_f64(fields[14]),
        scientific_names: non_empty(fields[16]),
        taxon_id,
        detail: AlignmentDetail {
            length: parse_u64(fields[4]),
            query_length: parse_u64(fields[5]),
            subject_length: parse_u64(fields[6]),
            mismatches: parse_u64(fields[7]),
            gap_opens: parse_u64(fields[8]),
            query_start: parse_u64(fields[9]),
            query_end: parse_u64(fields[10]),
            subject_start: parse_u64(fields[11]),
            subject_end: parse_u64(fields[12]),
            subject_title: non_empty(fields[15]),
            blast_names: non_empty(fields[17]),
            common_names: non_empty(fields[18]),
        },
    })
}

pub fn collect_taxids(records: &[BlastRecord]) -> BTreeSet<TaxId> {
    records
        .iter()
        .filter_map(|record| record.taxon_id.clone())
        .collect()
}

fn parse_f64(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
