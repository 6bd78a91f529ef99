use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_lctr::app::{App, ProgressEvent, ProgressSink, list_rank_cache};
use kira_lctr::config::{
    Config, ConfigLoader, ConfigOverrides, LookupEntry, ResolvedConfig, TaxonomyEntry,
};
use kira_lctr::domain::{TaxId, TaxonomyRecord};
use kira_lctr::error::LctrError;
use kira_lctr::ncbi::TaxonomyClient;
use kira_lctr::rank_cache::{RankLookup, RankResolver};
use kira_lctr::store::Store;

const ENTERO: &str = "Bacteria; Pseudomonadota; Gammaproteobacteria; Enterobacterales; Enterobacteriaceae";

struct MockNcbi {
    taxonomy: HashMap<String, TaxonomyRecord>,
    ranks: HashMap<String, String>,
    taxonomy_calls: AtomicUsize,
    rank_calls: Mutex<Vec<String>>,
}

impl MockNcbi {
    fn new() -> Self {
        let taxonomy = [
            ("562", "Escherichia coli", "Escherichia; Escherichia coli"),
            ("623", "Shigella flexneri", "Shigella; Shigella flexneri"),
        ]
        .into_iter()
        .map(|(id, name, tail)| {
            (
                id.to_string(),
                TaxonomyRecord {
                    taxon_id: id.parse().unwrap(),
                    scientific_name: Some(name.to_string()),
                    rank: Some("species".to_string()),
                    lineage: Some(format!("{ENTERO}; {tail}")),
                },
            )
        })
        .collect();
        let ranks = [
            ("Escherichia coli", "species"),
            ("Enterobacteriaceae", "family"),
        ]
        .into_iter()
        .map(|(name, rank)| (name.to_string(), rank.to_string()))
        .collect();
        Self {
            taxonomy,
            ranks,
            taxonomy_calls: AtomicUsize::new(0),
            rank_calls: Mutex::new(Vec::new()),
        }
    }
}

impl TaxonomyClient for MockNcbi {
    fn fetch_taxonomy(&self, taxids: &[TaxId]) -> Result<Vec<TaxonomyRecord>, LctrError> {
        self.taxonomy_calls.fetch_add(1, Ordering::SeqCst);
        Ok(taxids
            .iter()
            .filter_map(|taxid| self.taxonomy.get(taxid.as_str()).cloned())
            .collect())
    }
}

impl RankResolver for MockNcbi {
    fn lookup_rank(&self, name: &str) -> Result<RankLookup, LctrError> {
        self.rank_calls.lock().unwrap().push(name.to_string());
        Ok(match self.ranks.get(name) {
            Some(rank) => RankLookup::Found(rank.clone()),
            None => RankLookup::NotFound,
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

fn blast_row(query: &str, coverage: &str, pident: &str, bitscore: &str, name: &str, taxid: &str) -> String {
    [
        query, coverage, "NR_000001.1", pident, "253", "253", "1480", "0", "0", "1", "253", "1",
        "253", "1e-130", bitscore, "16S ribosomal RNA", name, "enterobacteria", "N/A", taxid,
    ]
    .join("\t")
}

struct Fixture {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let blast = [
            blast_row("asv1", "100", "100", "468", "Escherichia coli", "562"),
            blast_row("asv1", "100", "100", "468", "Escherichia coli", "562"),
            blast_row("asv1", "100", "97.2", "440", "Shigella flexneri", "623"),
            blast_row("asv2", "100", "99.6", "460", "Escherichia coli", "562"),
            blast_row("asv2", "100", "99.6", "460", "Shigella flexneri", "623"),
            blast_row("asv3", "85", "100", "300", "Escherichia coli", "562"),
            "asv4\t100\tNR_000009.1".to_string(),
        ]
        .join("\n");
        std::fs::write(root.join("blast.tsv").as_std_path(), format!("{blast}\n")).unwrap();
        std::fs::write(
            root.join("asv.fasta").as_std_path(),
            ">asv1 sample=A\nACGT\nACGT\n>asv2\nTTGA\n>asv3\nGGCC\n",
        )
        .unwrap();
        Self { _temp: temp, root }
    }

    fn app(&self, client: MockNcbi) -> App<MockNcbi> {
        let store = Store::new_with_paths(self.root.join("out"), self.root.join("cache"));
        App::new(store, client)
    }

    fn config(&self) -> ResolvedConfig {
        let config = Config {
            project: Some("reef".to_string()),
            input: Some(self.root.join("blast.tsv").to_string()),
            fasta: Some(self.root.join("asv.fasta").to_string()),
            output_dir: Some(self.root.join("out").to_string()),
            rank_cache: Some(self.root.join("cache/rank_cache.tsv").to_string()),
            lookup: LookupEntry {
                workers: Some(2),
                min_interval_ms: Some(0),
            },
            taxonomy: TaxonomyEntry {
                batch_size: Some(1),
                batch_interval_ms: Some(0),
            },
            ..Config::default()
        };
        ConfigLoader::resolve_config(config, ConfigOverrides::default()).unwrap()
    }

    fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.root.join("out").join(name).as_std_path()).unwrap()
    }
}

#[test]
fn run_writes_every_table() {
    let fixture = Fixture::new();
    let app = fixture.app(MockNcbi::new());
    let sink = RecordingSink::default();
    let result = app.run(&fixture.config(), &sink).unwrap();

    assert_eq!(result.project, "reef");
    assert_eq!(result.input_hits, 6);
    assert_eq!(result.skipped_blast_rows, 1);
    assert_eq!(result.unique_taxids, 2);
    assert_eq!(result.taxonomy_records, 2);
    assert_eq!(result.failed_taxonomy_batches, 0);
    assert_eq!(result.hits_passing_coverage, 5);
    assert_eq!(result.queries, 2);
    assert_eq!(result.species_level, 1);
    assert_eq!(result.unresolved, 0);
    assert!(result.rank_cache_saved);
    // one batch per taxonomy id
    assert_eq!(app_calls(&app), 2);

    for name in [
        "reef_taxonomy.tsv",
        "reef_merged.tsv",
        "reef_best_hits.tsv",
        "reef_lctr.tsv",
        "reef_lctr_ranked.tsv",
    ] {
        assert!(fixture.root.join("out").join(name).exists(), "{name} missing");
    }

    let ranked = fixture.read("reef_lctr_ranked.tsv");
    let lines: Vec<&str> = ranked.lines().collect();
    assert_eq!(
        lines[0],
        "ASV\tASV_sequence\tFinal_Taxon\tFinal_Taxon_Rank\tExplanation"
    );
    assert!(lines[1].starts_with("asv1\tACGTACGT\tEscherichia coli\tspecies\t"));
    assert!(lines[2].starts_with("asv2\tTTGA\tEnterobacteriaceae\tfamily\t"));
    assert_eq!(lines.len(), 3);

    let best = fixture.read("reef_best_hits.tsv");
    assert_eq!(best.lines().count(), 3);
    assert!(best.lines().next().unwrap().ends_with("\tASV_sequence"));

    let messages = sink.messages.lock().unwrap();
    assert!(messages.iter().any(|message| message.starts_with("phase=Done")));
}

#[test]
fn second_run_uses_cached_ranks() {
    let fixture = Fixture::new();
    let config = fixture.config();

    let first = fixture.app(MockNcbi::new());
    let result = first.run(&config, &RecordingSink::default()).unwrap();
    assert_eq!(result.rank_lookup.looked_up, 2);

    let second = fixture.app(MockNcbi::new());
    let result = second.run(&config, &RecordingSink::default()).unwrap();
    assert_eq!(result.rank_lookup.cached, 2);
    assert_eq!(result.rank_lookup.looked_up, 0);

    let listing = list_rank_cache(config.rank_cache.as_deref().unwrap());
    let taxa: Vec<&str> = listing.entries.iter().map(|entry| entry.taxon.as_str()).collect();
    assert_eq!(taxa, vec!["Enterobacteriaceae", "Escherichia coli"]);
}

#[test]
fn missing_fasta_fails_the_run() {
    let fixture = Fixture::new();
    std::fs::remove_file(fixture.root.join("asv.fasta").as_std_path()).unwrap();
    let app = fixture.app(MockNcbi::new());
    let err = app.run(&fixture.config(), &RecordingSink::default()).unwrap_err();
    assert_matches!(err, LctrError::MissingInput(_));
}

fn app_calls(app: &App<MockNcbi>) -> usize {
    app.client().taxonomy_calls.load(Ordering::SeqCst)
}
