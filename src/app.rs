use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Serialize;
use tracing::{info, warn};

use crate::annotate::{filter_by_coverage, join_taxonomy};
use crate::blast::{collect_taxids, read_blast};
use crate::config::{ResolvedConfig, TaxonomySettings};
use crate::dispatch::{LookupDispatcher, RateGate};
use crate::domain::{SPECIES, TaxId, TaxonomyRecord};
use crate::error::LctrError;
use crate::fasta::read_sequences;
use crate::lctr::resolve_all;
use crate::ncbi::TaxonomyClient;
use crate::output::{
    write_best_hits_table, write_consensus_table, write_merged_table, write_ranked_table,
    write_taxonomy_table,
};
use crate::rank_cache::{RankCache, RankResolver, ResolveSummary, apply_ranks};
use crate::ranking::best_hits;
use crate::store::{OutputTable, Store};

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub project: String,
    pub input_hits: usize,
    pub skipped_blast_rows: usize,
    pub unique_taxids: usize,
    pub taxonomy_records: usize,
    pub failed_taxonomy_batches: usize,
    pub hits_passing_coverage: usize,
    pub queries: usize,
    pub species_level: usize,
    pub unresolved: usize,
    pub rank_lookup: ResolveSummary,
    pub rank_cache: String,
    pub rank_cache_saved: bool,
    pub outputs: OutputPaths,
    pub elapsed_ms: u64,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputPaths {
    pub taxonomy: String,
    pub merged: String,
    pub best_hits: String,
    pub consensus: String,
    pub ranked_consensus: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheListing {
    pub path: String,
    pub entries: Vec<CacheEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub taxon: String,
    pub rank: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: TaxonomyClient + RankResolver> {
    store: Store,
    client: C,
}

impl<C: TaxonomyClient + RankResolver> App<C> {
    pub fn new(store: Store, client: C) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn run(
        &self,
        config: &ResolvedConfig,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, LctrError> {
        let started = Instant::now();
        self.store.ensure_output_root()?;
        let outputs = self.output_paths(&config.project);

        phase(sink, format!("phase=Read; BLAST results {}", config.input));
        let table = read_blast(config.input.as_std_path())?;
        let skipped_blast_rows = table.skipped_rows;
        let records = table.records;
        let input_hits = records.len();
        let taxids = collect_taxids(&records);
        info!(taxids = taxids.len(), "found unique taxonomy ids");

        phase(sink, format!("phase=Taxonomy; fetching {} taxonomy ids", taxids.len()));
        let fetch_started = Instant::now();
        let (taxonomy, failed_taxonomy_batches) = self.fetch_taxonomy(&taxids, &config.taxonomy);
        sink.event(ProgressEvent {
            message: format!("taxonomy.response records={}", taxonomy.len()),
            elapsed: Some(fetch_started.elapsed()),
        });
        write_taxonomy_table(Utf8Path::new(&outputs.taxonomy), &taxonomy)?;
        let taxonomy_records = taxonomy.len();
        let index: HashMap<TaxId, TaxonomyRecord> = taxonomy
            .into_iter()
            .map(|record| (record.taxon_id.clone(), record))
            .collect();

        phase(sink, "phase=Merge; joining hits with taxonomy".to_string());
        let hits = join_taxonomy(records, &index);
        write_merged_table(Utf8Path::new(&outputs.merged), &hits)?;

        phase(sink, format!("phase=Read; query sequences {}", config.fasta));
        let sequences = read_sequences(config.fasta.as_std_path())?;

        phase(
            sink,
            format!("phase=Filter; query coverage >= {}", config.min_query_coverage),
        );
        let hits = filter_by_coverage(hits, config.min_query_coverage);
        let hits_passing_coverage = hits.len();

        phase(sink, "phase=BestHits; selecting best hit per query".to_string());
        let best = best_hits(&hits);
        write_best_hits_table(Utf8Path::new(&outputs.best_hits), &best, &sequences)?;

        phase(sink, "phase=Consensus; lowest common taxonomic rank".to_string());
        let mut rows = resolve_all(&hits, &sequences)?;
        write_consensus_table(Utf8Path::new(&outputs.consensus), &rows)?;

        phase(sink, "phase=Ranks; resolving taxonomic ranks".to_string());
        let cache_path = config
            .rank_cache
            .clone()
            .unwrap_or_else(|| self.store.default_rank_cache_path());
        let mut cache = RankCache::load(&cache_path);
        let dispatcher = LookupDispatcher::new(config.lookup.workers, config.lookup.min_interval)?;
        let lookup_started = Instant::now();
        let rank_lookup = cache.resolve(
            rows.iter().map(|row| row.result.final_taxon.as_str()),
            &self.client,
            &dispatcher,
        );
        sink.event(ProgressEvent {
            message: format!(
                "ranks.resolved cached={} looked_up={}",
                rank_lookup.cached, rank_lookup.looked_up
            ),
            elapsed: Some(lookup_started.elapsed()),
        });
        let rank_cache_saved = match cache.persist(&cache_path) {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %cache_path, error = %err, "could not save rank cache");
                false
            }
        };
        apply_ranks(&mut rows, &cache);
        write_ranked_table(Utf8Path::new(&outputs.ranked_consensus), &rows)?;

        let species_level = rows
            .iter()
            .filter(|row| row.result.rank.as_deref() == Some(SPECIES))
            .count();
        let unresolved = rows.iter().filter(|row| row.result.is_unresolved()).count();
        phase(
            sink,
            format!(
                "phase=Done; {} queries, {species_level} at species level, {unresolved} unresolved",
                rows.len()
            ),
        );

        Ok(RunResult {
            project: config.project.clone(),
            input_hits,
            skipped_blast_rows,
            unique_taxids: taxids.len(),
            taxonomy_records,
            failed_taxonomy_batches,
            hits_passing_coverage,
            queries: rows.len(),
            species_level,
            unresolved,
            rank_lookup,
            rank_cache: cache_path.to_string(),
            rank_cache_saved,
            outputs,
            elapsed_ms: started.elapsed().as_millis() as u64,
            generated_at: iso_timestamp(),
        })
    }

    fn fetch_taxonomy(
        &self,
        taxids: &BTreeSet<TaxId>,
        settings: &TaxonomySettings,
    ) -> (Vec<TaxonomyRecord>, usize) {
        let ids: Vec<TaxId> = taxids.iter().cloned().collect();
        let gate = RateGate::new(settings.batch_interval);
        let mut records = Vec::new();
        let mut failed = 0usize;
        for batch in ids.chunks(settings.batch_size) {
            gate.wait();
            match self.client.fetch_taxonomy(batch) {
                Ok(found) => records.extend(found),
                Err(err) => {
                    failed += 1;
                    let ids = batch.iter().map(TaxId::as_str).collect::<Vec<_>>().join(",");
                    warn!(ids = %ids, error = %err, "skipping taxonomy batch");
                }
            }
        }
        (records, failed)
    }

    fn output_paths(&self, project: &str) -> OutputPaths {
        let path = |table| self.store.table_path(project, table).to_string();
        OutputPaths {
            taxonomy: path(OutputTable::Taxonomy),
            merged: path(OutputTable::Merged),
            best_hits: path(OutputTable::BestHits),
            consensus: path(OutputTable::Consensus),
            ranked_consensus: path(OutputTable::RankedConsensus),
        }
    }
}

pub fn list_rank_cache(path: &Utf8Path) -> CacheListing {
    let cache = RankCache::load(path);
    CacheListing {
        path: path.to_string(),
        entries: cache
            .entries()
            .map(|(taxon, rank)| CacheEntry {
                taxon: taxon.to_string(),
                rank: rank.to_string(),
            })
            .collect(),
    }
}

fn phase(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
