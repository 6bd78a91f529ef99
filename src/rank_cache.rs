use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dispatch::LookupDispatcher;
use crate::domain::{ConsensusRow, LOOKUP_ERROR, NOT_FOUND, UNKNOWN_RANK, UNRESOLVED};
use crate::error::LctrError;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankLookup {
    Found(String),
    NotFound,
}

pub trait RankResolver: Send + Sync {
    fn lookup_rank(&self, name: &str) -> Result<RankLookup, LctrError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolveSummary {
    pub requested: usize,
    pub cached: usize,
    pub looked_up: usize,
    pub not_found: usize,
    pub lookup_errors: usize,
}

#[derive(Debug, Deserialize)]
struct CacheRow {
    #[serde(rename = "Taxon")]
    taxon: String,
    #[serde(rename = "Rank")]
    rank: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankCache {
    entries: BTreeMap<String, String>,
}

impl RankCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Utf8Path) -> Self {
        if !path.as_std_path().exists() {
            info!(path = %path, "no rank cache found; starting empty");
            return Self::new();
        }
        match Self::try_load(path) {
            Ok(cache) => {
                info!(path = %path, entries = cache.len(), "loaded rank cache");
                cache
            }
            Err(err) => {
                warn!(path = %path, error = %err, "could not load rank cache; starting empty");
                Self::new()
            }
        }
    }

    pub fn try_load(path: &Utf8Path) -> Result<Self, LctrError> {
        let file = File::open(path.as_std_path())
            .map_err(|err| LctrError::CacheParse(format!("open {path}: {err}")))?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(file);
        let mut entries = BTreeMap::new();
        for row in reader.deserialize::<CacheRow>() {
            let row = row.map_err(|err| LctrError::CacheParse(err.to_string()))?;
            entries.insert(row.taxon, row.rank);
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, rank)| (name.as_str(), rank.as_str()))
    }

    pub fn resolve<I, S, R>(
        &mut self,
        names: I,
        resolver: &R,
        dispatcher: &LookupDispatcher,
    ) -> ResolveSummary
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        R: RankResolver + ?Sized,
    {
        let requested: BTreeSet<String> = names
            .into_iter()
            .map(|name| name.as_ref().to_string())
            .filter(|name| !name.is_empty() && name != UNRESOLVED)
            .collect();
        let uncached: Vec<String> = requested
            .iter()
            .filter(|name| !self.entries.contains_key(name.as_str()))
            .cloned()
            .collect();

        let mut summary = ResolveSummary {
            requested: requested.len(),
            cached: requested.len() - uncached.len(),
            ..ResolveSummary::default()
        };
        if uncached.is_empty() {
            info!(cached = summary.cached, "no new taxa to look up; using cached ranks only");
            return summary;
        }

        info!(
            taxa = uncached.len(),
            workers = dispatcher.workers(),
            min_interval_ms = dispatcher.min_interval().as_millis() as u64,
            "looking up taxonomic ranks"
        );
        let resolved = dispatcher.map(&uncached, |name| {
            let rank = rank_from_lookup(name, resolver.lookup_rank(name));
            (name.clone(), rank)
        });

        // Merged on the calling thread once every lookup has returned.
        for (name, rank) in resolved {
            summary.looked_up += 1;
            match rank.as_str() {
                NOT_FOUND => summary.not_found += 1,
                LOOKUP_ERROR => summary.lookup_errors += 1,
                _ => {}
            }
            debug!(taxon = %name, rank = %rank, "resolved rank");
            self.entries.insert(name, rank);
        }
        summary
    }

    pub fn rank_of<'a>(&'a self, name: &str) -> &'a str {
        if name == UNRESOLVED {
            return UNRESOLVED;
        }
        self.get(name).unwrap_or(NOT_FOUND)
    }

    pub fn persist(&self, path: &Utf8Path) -> Result<(), LctrError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(Vec::new());
        writer
            .write_record(["Taxon", "Rank"])
            .map_err(|err| LctrError::TableWrite(err.to_string()))?;
        for (name, rank) in &self.entries {
            writer
                .write_record([name, rank])
                .map_err(|err| LctrError::TableWrite(err.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| LctrError::TableWrite(err.to_string()))?;
        Store::write_bytes_atomic(path, &bytes)?;
        info!(path = %path, entries = self.len(), "saved rank cache");
        Ok(())
    }
}

impl FromIterator<(String, String)> for RankCache {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

pub fn apply_ranks(rows: &mut [ConsensusRow], cache: &RankCache) {
    for row in rows {
        row.result.rank = Some(cache.rank_of(&row.result.final_taxon).to_string());
    }
}

fn rank_from_lookup(name: &str, lookup: Result<RankLookup, LctrError>) -> String {
    match lookup {
        Ok(RankLookup::Found(rank)) if rank.trim().is_empty() => UNKNOWN_RANK.to_string(),
        Ok(RankLookup::Found(rank)) => rank,
        Ok(RankLookup::NotFound) => NOT_FOUND.to_string(),
        Err(err) => {
            warn!(taxon = %name, error = %err, "rank lookup failed");
            LOOKUP_ERROR.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    struct FixedResolver;

    impl RankResolver for FixedResolver {
        fn lookup_rank(&self, name: &str) -> Result<RankLookup, LctrError> {
            match name {
                "Escherichia" => Ok(RankLookup::Found("genus".to_string())),
                "Blank" => Ok(RankLookup::Found(String::new())),
                "Broken" => Err(LctrError::NcbiHttp("connection reset".to_string())),
                _ => Ok(RankLookup::NotFound),
            }
        }
    }

    #[test]
    fn lookups_degrade_to_sentinels() {
        let dispatcher = LookupDispatcher::new(2, Duration::ZERO).unwrap();
        let mut cache = RankCache::new();
        let summary = cache.resolve(
            ["Escherichia", "Broken", "Nowhere", "Blank", UNRESOLVED],
            &FixedResolver,
            &dispatcher,
        );
        assert_eq!(summary.requested, 4);
        assert_eq!(summary.looked_up, 4);
        assert_eq!(summary.not_found, 1);
        assert_eq!(summary.lookup_errors, 1);
        assert_eq!(cache.rank_of("Escherichia"), "genus");
        assert_eq!(cache.rank_of("Broken"), LOOKUP_ERROR);
        assert_eq!(cache.rank_of("Nowhere"), NOT_FOUND);
        assert_eq!(cache.rank_of("Blank"), UNKNOWN_RANK);
        assert!(!cache.contains(UNRESOLVED));
    }

    #[test]
    fn unresolved_passes_through() {
        let cache = RankCache::new();
        assert_eq!(cache.rank_of(UNRESOLVED), UNRESOLVED);
        assert_eq!(cache.rank_of("Anything"), NOT_FOUND);
    }
}
