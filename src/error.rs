use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LctrError {
    #[error("invalid taxonomy id: {0}")]
    InvalidTaxId(String),

    #[error("missing config file kira-lctr.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("input file not found: {0}")]
    MissingInput(String),

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("failed to decode NCBI response: {0}")]
    NcbiDecode(String),

    #[error("malformed BLAST row at line {line}: {message}")]
    BlastParse { line: usize, message: String },

    #[error("malformed FASTA input: {0}")]
    FastaParse(String),

    #[error("query group contains no hits")]
    EmptyHitGroup,

    #[error("failed to read rank cache: {0}")]
    CacheParse(String),

    #[error("failed to write table: {0}")]
    TableWrite(String),

    #[error("failed to start lookup workers: {0}")]
    WorkerPool(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
