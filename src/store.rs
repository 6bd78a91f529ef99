use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use tempfile::Builder;

use crate::error::LctrError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTable {
    Taxonomy,
    Merged,
    BestHits,
    Consensus,
    RankedConsensus,
}

impl OutputTable {
    fn suffix(self) -> &'static str {
        match self {
            OutputTable::Taxonomy => "taxonomy",
            OutputTable::Merged => "merged",
            OutputTable::BestHits => "best_hits",
            OutputTable::Consensus => "lctr",
            OutputTable::RankedConsensus => "lctr_ranked",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    output_root: Utf8PathBuf,
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new(output_root: Utf8PathBuf) -> Result<Self, LctrError> {
        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("kira-lctr")).ok()
            })
            .ok_or_else(|| LctrError::Filesystem("unable to resolve cache directory".to_string()))?;

        Ok(Self {
            output_root,
            cache_root,
        })
    }

    pub fn new_with_paths(output_root: Utf8PathBuf, cache_root: Utf8PathBuf) -> Self {
        Self {
            output_root,
            cache_root,
        }
    }

    pub fn output_root(&self) -> &Utf8Path {
        &self.output_root
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn table_path(&self, project: &str, table: OutputTable) -> Utf8PathBuf {
        self.output_root
            .join(format!("{project}_{}.tsv", table.suffix()))
    }

    pub fn default_rank_cache_path(&self) -> Utf8PathBuf {
        self.cache_root.join("rank_cache.tsv")
    }

    pub fn ensure_output_root(&self) -> Result<(), LctrError> {
        fs::create_dir_all(self.output_root.as_std_path())
            .map_err(|err| LctrError::Filesystem(err.to_string()))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), LctrError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| LctrError::Filesystem(err.to_string()))?;
        let temp = Builder::new()
            .prefix("kira-lctr-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| LctrError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content).map_err(|err| LctrError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| LctrError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_paths(
            Utf8PathBuf::from("results"),
            Utf8PathBuf::from("/tmp/kira-lctr-cache"),
        );
        let path = store.table_path("reef", OutputTable::RankedConsensus);
        assert!(path.ends_with("results/reef_lctr_ranked.tsv"));
        assert!(store.default_rank_cache_path().ends_with("kira-lctr-cache/rank_cache.tsv"));
    }

    #[test]
    fn atomic_write_overwrites() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("nested").join("out.tsv")).unwrap();
        Store::write_bytes_atomic(&path, b"first").unwrap();
        Store::write_bytes_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(path.as_std_path()).unwrap(), b"second");
    }
}
