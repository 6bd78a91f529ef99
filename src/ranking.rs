use std::cmp::Ordering;

use crate::domain::Hit;

// Missing scores rank as the worst possible value for their column.
pub(crate) fn identity_key(hit: &Hit) -> f64 {
    hit.percent_identity.unwrap_or(f64::NEG_INFINITY)
}

pub(crate) fn bitscore_key(hit: &Hit) -> f64 {
    hit.bitscore.unwrap_or(f64::NEG_INFINITY)
}

pub(crate) fn evalue_key(hit: &Hit) -> f64 {
    hit.e_value.unwrap_or(f64::INFINITY)
}

pub fn compare_hits(a: &Hit, b: &Hit) -> Ordering {
    a.query_id
        .cmp(&b.query_id)
        .then_with(|| identity_key(b).total_cmp(&identity_key(a)))
        .then_with(|| bitscore_key(b).total_cmp(&bitscore_key(a)))
        .then_with(|| evalue_key(a).total_cmp(&evalue_key(b)))
}

pub fn rank_hits(mut hits: Vec<Hit>) -> Vec<Hit> {
    hits.sort_by(compare_hits);
    hits
}

pub fn best_hits(hits: &[Hit]) -> Vec<Hit> {
    let ranked = rank_hits(hits.to_vec());
    let mut best: Vec<Hit> = Vec::new();
    for hit in ranked {
        let is_new_query = best
            .last()
            .map(|previous| previous.query_id != hit.query_id)
            .unwrap_or(true);
        if is_new_query {
            best.push(hit);
        }
    }
    best
}
