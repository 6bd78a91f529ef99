use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LctrError;

pub const UNRESOLVED: &str = "unresolved";
pub const NOT_FOUND: &str = "not_found";
pub const LOOKUP_ERROR: &str = "lookup_error";
pub const SPECIES: &str = "species";
pub const UNKNOWN_RANK: &str = "unknown";

pub type SequenceIndex = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaxId(String);

impl TaxId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxId {
    type Err = LctrError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty() && normalized.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(LctrError::InvalidTaxId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentDetail {
    pub length: Option<u64>,
    pub query_length: Option<u64>,
    pub subject_length: Option<u64>,
    pub mismatches: Option<u64>,
    pub gap_opens: Option<u64>,
    pub query_start: Option<u64>,
    pub query_end: Option<u64>,
    pub subject_start: Option<u64>,
    pub subject_end: Option<u64>,
    pub subject_title: Option<String>,
    pub blast_names: Option<String>,
    pub common_names: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlastRecord {
    pub query_id: String,
    pub subject_id: String,
    pub query_coverage: Option<f64>,
    pub percent_identity: Option<f64>,
    pub e_value: Option<f64>,
    pub bitscore: Option<f64>,
    pub scientific_names: Option<String>,
    pub taxon_id: Option<TaxId>,
    pub detail: AlignmentDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyRecord {
    pub taxon_id: TaxId,
    pub scientific_name: Option<String>,
    pub rank: Option<String>,
    pub lineage: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hit {
    pub query_id: String,
    pub subject_id: String,
    pub percent_identity: Option<f64>,
    pub bitscore: Option<f64>,
    pub e_value: Option<f64>,
    pub query_coverage: Option<f64>,
    pub taxon_id: Option<TaxId>,
    pub scientific_name: Option<String>,
    pub rank: Option<String>,
    pub lineage: Option<String>,
    pub taxonomy_name: Option<String>,
    pub detail: AlignmentDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsensusResult {
    pub final_taxon: String,
    pub explanation: String,
    pub rank: Option<String>,
}

impl ConsensusResult {
    pub fn is_unresolved(&self) -> bool {
        self.final_taxon == UNRESOLVED
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsensusRow {
    pub query_id: String,
    pub sequence: Option<String>,
    pub result: ConsensusResult,
}

pub fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "N/A" {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_taxid_valid() {
        let id: TaxId = " 562 ".parse().unwrap();
        assert_eq!(id.as_str(), "562");
    }

    #[test]
    fn parse_taxid_rejects_multi_value() {
        let err = "562;564".parse::<TaxId>().unwrap_err();
        assert_matches!(err, LctrError::InvalidTaxId(_));
    }

    #[test]
    fn placeholders_are_absent() {
        assert_eq!(non_empty("N/A"), None);
        assert_eq!(non_empty("  "), None);
        assert_eq!(non_empty("Escherichia coli"), Some("Escherichia coli".to_string()));
    }
}
