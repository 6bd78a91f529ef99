use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::LctrError;

pub const CONFIG_FILE: &str = "kira-lctr.json";
pub const DEFAULT_NCBI_BASE_URL: &str = "https://api.ncbi.nlm.nih.gov/datasets/v2";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub fasta: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub rank_cache: Option<String>,
    #[serde(default)]
    pub min_query_coverage: Option<f64>,
    #[serde(default)]
    pub ncbi: NcbiEntry,
    #[serde(default)]
    pub lookup: LookupEntry,
    #[serde(default)]
    pub taxonomy: TaxonomyEntry,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NcbiEntry {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LookupEntry {
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TaxonomyEntry {
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub batch_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub project: Option<String>,
    pub input: Option<String>,
    pub fasta: Option<String>,
    pub output_dir: Option<String>,
    pub rank_cache: Option<String>,
    pub workers: Option<usize>,
    pub min_query_coverage: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NcbiSettings {
    pub api_key: Option<String>,
    pub email: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: usize,
}

impl Default for NcbiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            email: None,
            base_url: DEFAULT_NCBI_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupSettings {
    pub workers: usize,
    pub min_interval: Duration,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            min_interval: Duration::from_millis(350),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxonomySettings {
    pub batch_size: usize,
    pub batch_interval: Duration,
}

impl Default for TaxonomySettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            batch_interval: Duration::from_millis(400),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub project: String,
    pub input: Utf8PathBuf,
    pub fasta: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub rank_cache: Option<Utf8PathBuf>,
    pub min_query_coverage: f64,
    pub ncbi: NcbiSettings,
    pub lookup: LookupSettings,
    pub taxonomy: TaxonomySettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, LctrError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            if overrides.input.is_none() {
                return Err(LctrError::MissingConfig);
            }
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| LctrError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| LctrError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, LctrError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let project = overrides
            .project
            .or(config.project)
            .unwrap_or_else(|| "kira-lctr".to_string());
        if project.trim().is_empty() || project.contains(['/', '\\']) {
            return Err(LctrError::InvalidConfig(format!(
                "project name must be a non-empty file name prefix: {project:?}"
            )));
        }

        let input = overrides
            .input
            .or(config.input)
            .ok_or_else(|| LctrError::InvalidConfig("input BLAST file is required".to_string()))?;
        let fasta = overrides
            .fasta
            .or(config.fasta)
            .ok_or_else(|| LctrError::InvalidConfig("query FASTA file is required".to_string()))?;
        let output_dir = overrides
            .output_dir
            .or(config.output_dir)
            .unwrap_or_else(|| ".".to_string());
        let rank_cache = overrides.rank_cache.or(config.rank_cache);

        let min_query_coverage = overrides
            .min_query_coverage
            .or(config.min_query_coverage)
            .unwrap_or(100.0);
        if !(0.0..=100.0).contains(&min_query_coverage) {
            return Err(LctrError::InvalidConfig(format!(
                "min_query_coverage must be within 0..=100, got {min_query_coverage}"
            )));
        }

        let ncbi = resolve_ncbi(config.ncbi);

        let defaults = LookupSettings::default();
        let workers = overrides
            .workers
            .or(config.lookup.workers)
            .unwrap_or(defaults.workers);
        if workers == 0 {
            return Err(LctrError::InvalidConfig(
                "lookup.workers must be at least 1".to_string(),
            ));
        }
        let lookup = LookupSettings {
            workers,
            min_interval: config
                .lookup
                .min_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_interval),
        };

        let defaults = TaxonomySettings::default();
        let batch_size = config.taxonomy.batch_size.unwrap_or(defaults.batch_size);
        if !(1..=1000).contains(&batch_size) {
            return Err(LctrError::InvalidConfig(format!(
                "taxonomy.batch_size must be within 1..=1000, got {batch_size}"
            )));
        }
        let taxonomy = TaxonomySettings {
            batch_size,
            batch_interval: config
                .taxonomy
                .batch_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.batch_interval),
        };

        Ok(ResolvedConfig {
            schema_version,
            project,
            input: Utf8PathBuf::from(input),
            fasta: Utf8PathBuf::from(fasta),
            output_dir: Utf8PathBuf::from(output_dir),
            rank_cache: rank_cache.map(Utf8PathBuf::from),
            min_query_coverage,
            ncbi,
            lookup,
            taxonomy,
        })
    }
}

fn resolve_ncbi(entry: NcbiEntry) -> NcbiSettings {
    let defaults = NcbiSettings::default();
    NcbiSettings {
        api_key: non_blank(entry.api_key).or_else(|| env_value("NCBI_API_KEY")),
        email: non_blank(entry.email).or_else(|| env_value("NCBI_EMAIL")),
        base_url: non_blank(entry.base_url).unwrap_or(defaults.base_url),
        timeout: entry
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout),
        max_retries: entry.max_retries.unwrap_or(defaults.max_retries),
    }
}

fn env_value(key: &str) -> Option<String> {
    non_blank(std::env::var(key).ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
