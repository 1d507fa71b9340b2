use std::collections::{HashMap, HashSet};

/// Weight of the character-sequence component in the blended score.
const SEQUENCE_WEIGHT: f64 = 0.4;
/// Weight of the token-set Jaccard component in the blended score.
const JACCARD_WEIGHT: f64 = 0.6;

/// Blended similarity between two free-text names, in [0, 1].
///
/// Combines character-sequence similarity (ratio of matching contiguous
/// blocks) with token-set Jaccard similarity. Both inputs are case-folded
/// first; no other normalization is applied.
pub fn combined_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    SEQUENCE_WEIGHT * sequence_ratio(&a, &b) + JACCARD_WEIGHT * token_jaccard(&a, &b)
}

/// Jaccard similarity over the word sets of the two inputs. Words are
/// split on non-alphanumeric boundaries and case-folded. Either side
/// having no words at all yields 0.
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let a_tokens = tokenize(a);
    let b_tokens = tokenize(b);
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0.0;
    }
    let intersection = a_tokens.intersection(&b_tokens).count();
    let union = a_tokens.union(&b_tokens).count();
    intersection as f64 / union as f64
}

fn tokenize(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Character-sequence similarity: 2*M / T, where M is the total length of
/// the matching contiguous blocks found by repeatedly taking the longest
/// common block, and T is the combined length of both inputs. Two empty
/// strings are defined as identical.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let total = a_chars.len() + b_chars.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_block_total(&a_chars, &b_chars) as f64 / total as f64
}

/// Sum of matching block lengths: find the longest common contiguous
/// block, then recurse into the unmatched regions on either side of it.
fn matching_block_total(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut regions = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = regions.pop() {
        if alo >= ahi || blo >= bhi {
            continue;
        }
        let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
        if size > 0 {
            total += size;
            regions.push((alo, i, blo, j));
            regions.push((i + size, ahi, j + size, bhi));
        }
    }
    total
}

/// Longest contiguous block common to a[alo..ahi] and b[blo..bhi],
/// returned as (start in a, start in b, length). Earliest block in `a`
/// wins ties, then earliest in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut b_positions: HashMap<char, Vec<usize>> = HashMap::new();
    for j in blo..bhi {
        b_positions.entry(b[j]).or_default().push(j);
    }

    let mut best_i = alo;
    let mut best_j = blo;
    let mut best_size = 0;
    // run_lengths[j] = length of the common block ending at a[i] and b[j]
    let mut run_lengths: HashMap<usize, usize> = HashMap::new();
    for i in alo..ahi {
        let mut next_runs: HashMap<usize, usize> = HashMap::new();
        if let Some(positions) = b_positions.get(&a[i]) {
            for &j in positions {
                let len = if j > blo {
                    run_lengths.get(&(j - 1)).copied().unwrap_or(0) + 1
                } else {
                    1
                };
                next_runs.insert(j, len);
                if len > best_size {
                    best_i = i + 1 - len;
                    best_j = j + 1 - len;
                    best_size = len;
                }
            }
        }
        run_lengths = next_runs;
    }
    (best_i, best_j, best_size)
}
