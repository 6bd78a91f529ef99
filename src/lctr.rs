use rayon::prelude::*;
use tracing::debug;

use crate::domain::{ConsensusResult, ConsensusRow, Hit, SPECIES, SequenceIndex, UNRESOLVED};
use crate::error::LctrError;
use crate::lineage::Lineage;
use crate::ranking::{bitscore_key, evalue_key, identity_key, rank_hits};

pub fn tied_hits(hits: &[Hit]) -> Vec<&Hit> {
    let mut tied: Vec<&Hit> = hits.iter().collect();

    let max_identity = tied
        .iter()
        .map(|hit| identity_key(hit))
        .fold(f64::NEG_INFINITY, f64::max);
    tied.retain(|hit| identity_key(hit) == max_identity);

    let max_bitscore = tied
        .iter()
        .map(|hit| bitscore_key(hit))
        .fold(f64::NEG_INFINITY, f64::max);
    tied.retain(|hit| bitscore_key(hit) == max_bitscore);

    let min_evalue = tied
        .iter()
        .map(|hit| evalue_key(hit))
        .fold(f64::INFINITY, f64::min);
    tied.retain(|hit| evalue_key(hit) == min_evalue);

    tied
}

pub fn resolve_group(hits: &[Hit]) -> Result<ConsensusResult, LctrError> {
    if hits.is_empty() {
        return Err(LctrError::EmptyHitGroup);
    }
    let tied = tied_hits(hits);
    let count = tied.len();

    if let Some(species) = unanimous_species(&tied) {
        return Ok(ConsensusResult {
            final_taxon: species.to_string(),
            explanation: format!("All {count} tied hits agree on species {species}."),
            rank: None,
        });
    }

    let lineages: Vec<Lineage> = tied
        .iter()
        .map(|hit| Lineage::parse(hit.lineage.as_deref()))
        .collect();
    let common = Lineage::intersect_all(&lineages);
    let names = distinct_names(&tied);

    let result = match common.last() {
        None if names.is_empty() => ConsensusResult {
            final_taxon: UNRESOLVED.to_string(),
            explanation: "Tied hit lineages share no common taxon.".to_string(),
            rank: None,
        },
        None => ConsensusResult {
            final_taxon: UNRESOLVED.to_string(),
            explanation: format!(
                "Tied hit lineages share no common taxon. Conflicting taxa: {}",
                names.join("; ")
            ),
            rank: None,
        },
        Some(taxon) if names.len() > 1 => ConsensusResult {
            final_taxon: taxon.to_string(),
            explanation: format!(
                "{count} tied hits. Lowest shared taxon: {taxon}. Conflicts among: {}",
                names.join("; ")
            ),
            rank: None,
        },
        Some(taxon) => ConsensusResult {
            final_taxon: taxon.to_string(),
            explanation: format!("{count} tied hits. Lowest shared taxon: {taxon}."),
            rank: None,
        },
    };
    Ok(result)
}

pub fn resolve_all(
    hits: &[Hit],
    sequences: &SequenceIndex,
) -> Result<Vec<ConsensusRow>, LctrError> {
    let ranked = rank_hits(hits.to_vec());
    let groups: Vec<&[Hit]> = ranked
        .chunk_by(|a, b| a.query_id == b.query_id)
        .collect();
    debug!(queries = groups.len(), hits = ranked.len(), "resolving consensus");

    groups
        .par_iter()
        .map(|group| {
            let result = resolve_group(group)?;
            let query_id = group[0].query_id.clone();
            let sequence = sequences.get(&query_id).cloned();
            Ok(ConsensusRow {
                query_id,
                sequence,
                result,
            })
        })
        .collect()
}

fn unanimous_species<'a>(tied: &[&'a Hit]) -> Option<&'a str> {
    let names = distinct_values(tied.iter().map(|&hit| present_name(hit)));
    let ranks = distinct_values(tied.iter().map(|&hit| hit.rank.as_deref()));
    match (names.as_slice(), ranks.as_slice()) {
        ([Some(name)], [Some(rank)]) if *rank == SPECIES => Some(*name),
        _ => None,
    }
}

fn distinct_names<'a>(tied: &[&'a Hit]) -> Vec<&'a str> {
    distinct_values(tied.iter().map(|&hit| present_name(hit)))
        .into_iter()
        .flatten()
        .collect()
}

fn present_name(hit: &Hit) -> Option<&str> {
    hit.scientific_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
}

fn distinct_values<T: PartialEq>(values: impl Iterator<Item = T>) -> Vec<T> {
    let mut seen = Vec::new();
    for value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}
