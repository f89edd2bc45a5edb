//! Fuzzy name matching
//!
//! Used to resolve spoken voice names against the names an engine reports.

use strsim::normalized_levenshtein;

/// Minimum similarity for a fuzzy voice match
pub const VOICE_CUTOFF: f64 = 0.6;

/// Result of a fuzzy match with the matched value and score
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    pub value: String,
    pub score: f64,
}

/// Find matches in a list of candidates
///
/// Exact matches score 1.0, candidates containing the search term score
/// 0.9, everything else is scored by normalized Levenshtein similarity.
/// Returns up to `n` matches with scores at or above `cutoff`, best first.
pub fn find_matches(
    search_term: &str,
    candidates: &[String],
    n: usize,
    cutoff: f64,
) -> Vec<FuzzyMatch> {
    let search_lower = search_term.trim().to_lowercase();
    if search_lower.is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<FuzzyMatch> = candidates
        .iter()
        .filter_map(|candidate| {
            let candidate_lower = candidate.to_lowercase();
            let score = if candidate_lower == search_lower {
                1.0
            } else if candidate_lower.contains(&search_lower) {
                0.9
            } else {
                normalized_levenshtein(&search_lower, &candidate_lower)
            };
            (score >= cutoff).then(|| FuzzyMatch {
                value: candidate.clone(),
                score,
            })
        })
        .collect();

    // Stable sort keeps candidate order among equal scores
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(n);
    matches
}

/// Find the best match above a minimum score
pub fn find_best_match(
    search_term: &str,
    candidates: &[String],
    cutoff: f64,
) -> Option<FuzzyMatch> {
    find_matches(search_term, candidates, 1, cutoff)
        .into_iter()
        .next()
}

/// Resolve a spoken voice name against available voices
pub fn match_voice(spoken: &str, voices: &[String]) -> Option<String> {
    find_best_match(spoken, voices, VOICE_CUTOFF).map(|m| m.value)
}

/// Calculate similarity score between two strings
pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}
