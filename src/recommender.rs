use crate::model::Model;
use crate::similarity;
use log::debug;
use std::cmp::Ordering;
use std::collections::HashSet;

pub const DEFAULT_TOP_N: usize = 10;

/// Products most similar to `product_id`, best first. Unknown ids yield an empty list.
pub fn similar_to_item(model: &Model, product_id: i64, top_n: usize) -> Vec<i64> {
    let Some(row) = model.catalog().row_of(product_id) else {
        debug!("similar_to_item: product {} not in catalog", product_id);
        return Vec::new();
    };

    let scores = model.similarity().row(row);
    top_ranked(scores, top_n, |candidate| candidate == row)
        .into_iter()
        .map(|r| model.catalog().id_at(r))
        .collect()
}

/// Ranks the catalog against the mean feature vector of the viewed products.
/// Viewed products never appear in the result; unknown view ids are ignored.
pub fn recommend_for_user(model: &Model, view_ids: &[i64], top_n: usize) -> Vec<i64> {
    let catalog = model.catalog();
    let mut viewed_rows: Vec<usize> = view_ids
        .iter()
        .filter_map(|id| catalog.row_of(*id))
        .collect();
    viewed_rows.sort_unstable();
    viewed_rows.dedup();

    if viewed_rows.is_empty() {
        debug!(
            "recommend_for_user: none of {} view ids are in the catalog",
            view_ids.len()
        );
        return Vec::new();
    }

    let profile = model.features().mean_of(&viewed_rows);
    let scores = similarity::query(&profile, model.features());
    let excluded: HashSet<usize> = viewed_rows.into_iter().collect();

    top_ranked(&scores, top_n, |candidate| excluded.contains(&candidate))
        .into_iter()
        .map(|r| catalog.id_at(r))
        .collect()
}

/// Score descending, then lower row index first.
fn rank_order(scores: &[f32], a: usize, b: usize) -> Ordering {
    scores[b]
        .partial_cmp(&scores[a])
        .unwrap_or(Ordering::Equal)
        .then(a.cmp(&b))
}

/// Top `k` rows by score. Exclusion happens before selection, so the
/// window never shrinks because of excluded rows.
fn top_ranked<F>(scores: &[f32], k: usize, excluded: F) -> Vec<usize>
where
    F: Fn(usize) -> bool,
{
    if k == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<usize> = (0..scores.len()).filter(|&row| !excluded(row)).collect();
    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, |&a, &b| rank_order(scores, a, b));
        candidates.truncate(k);
    }
    candidates.sort_unstable_by(|&a, &b| rank_order(scores, a, b));
    candidates
}
