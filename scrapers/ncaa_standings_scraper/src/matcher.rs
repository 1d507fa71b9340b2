use crate::similarity::combined_similarity;
use crate::types::{MatchCandidate, ReferenceEntity};
use std::cmp::Ordering;

pub const DEFAULT_TOP_N: usize = 10;
/// Bonus added when an entity's conference matches the preferred one.
pub const CONFERENCE_BONUS: f64 = 0.15;

/// Rank reference entities against a scraped name.
///
/// Candidates from the preferred conference (case-insensitive match) get a
/// fixed bonus, capped at 1.0. Entities scoring zero are dropped. The
/// result is sorted descending by score (stable, so sheet order breaks
/// ties) and truncated to `top_n`. Pure function of its inputs.
pub fn find_best_candidates(
    scraped_name: &str,
    universities: &[ReferenceEntity],
    preferred_conference: Option<&str>,
    top_n: usize,
) -> Vec<MatchCandidate> {
    let preferred_norm = preferred_conference.map(|c| c.trim().to_lowercase());

    let mut candidates: Vec<MatchCandidate> = universities
        .iter()
        .filter_map(|entity| {
            let base = combined_similarity(scraped_name, &entity.name);
            let mut score = base;
            if let (Some(pref), Some(conf)) = (&preferred_norm, &entity.conference) {
                if !pref.is_empty() && conf.trim().to_lowercase() == *pref {
                    score = (base + CONFERENCE_BONUS).min(1.0);
                }
            }
            if score > 0.0 {
                Some(MatchCandidate {
                    row: entity.row,
                    name: entity.name.clone(),
                    score,
                })
            } else {
                None
            }
        })
        .collect();

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    candidates.truncate(top_n);
    candidates
}
