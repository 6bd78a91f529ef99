use std::collections::HashMap;

use tracing::info;

use crate::domain::{BlastRecord, Hit, TaxId, TaxonomyRecord};

pub fn join_taxonomy(
    records: Vec<BlastRecord>,
    taxonomy: &HashMap<TaxId, TaxonomyRecord>,
) -> Vec<Hit> {
    records
        .into_iter()
        .map(|record| {
            let taxon = record
                .taxon_id
                .as_ref()
                .and_then(|taxon_id| taxonomy.get(taxon_id));
            let taxonomy_name = taxon.and_then(|taxon| taxon.scientific_name.clone());
            Hit {
                query_id: record.query_id,
                subject_id: record.subject_id,
                percent_identity: record.percent_identity,
                bitscore: record.bitscore,
                e_value: record.e_value,
                query_coverage: record.query_coverage,
                taxon_id: record.taxon_id,
                scientific_name: record.scientific_names.or_else(|| taxonomy_name.clone()),
                rank: taxon.and_then(|taxon| taxon.rank.clone()),
                lineage: taxon.and_then(|taxon| taxon.lineage.clone()),
                taxonomy_name,
                detail: record.detail,
            }
        })
        .collect()
}

pub fn filter_by_coverage(hits: Vec<Hit>, min_coverage: f64) -> Vec<Hit> {
    let before = hits.len();
    let kept: Vec<Hit> = hits
        .into_iter()
        .filter(|hit| {
            hit.query_coverage
                .map(|coverage| coverage >= min_coverage)
                .unwrap_or(false)
        })
        .collect();
    info!(before, after = kept.len(), min_coverage, "filtered hits by query coverage");
    kept
}
