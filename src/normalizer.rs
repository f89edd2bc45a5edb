//! Transcript normalization
//!
//! Fixes common recognition errors and handles the wake word before
//! text reaches the command interpreter.

use regex::{NoExpand, Regex};
use std::collections::HashMap;
use tracing::warn;

/// Hesitations stripped from the start of an utterance
const FILLERS: [&str; 3] = ["um", "uh", "erm"];

/// Normalizes spoken text and detects the wake word
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    /// Configured corrections, matched case-insensitively on word boundaries
    corrections: Vec<(Regex, String)>,
    wake_word: String,
    wake_pattern: Option<Regex>,
}

impl TextNormalizer {
    pub fn new(wake_word: &str, corrections: &HashMap<String, String>) -> Self {
        // Longest first so overlapping phrases prefer the more specific fix
        let mut sources: Vec<(&String, &String)> = corrections.iter().collect();
        sources.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

        let corrections = sources
            .into_iter()
            .filter(|(from, _)| !from.trim().is_empty())
            .filter_map(|(from, to)| match word_regex(from) {
                Ok(regex) => Some((regex, to.clone())),
                Err(e) => {
                    warn!("⚠️ Skipping voice correction '{}': {}", from, e);
                    None
                }
            })
            .collect();

        let wake_word = wake_word.trim().to_string();
        let wake_pattern = if wake_word.is_empty() {
            None
        } else {
            word_regex(&wake_word).ok()
        };

        Self {
            corrections,
            wake_word,
            wake_pattern,
        }
    }

    pub fn wake_word(&self) -> &str {
        &self.wake_word
    }

    /// Apply corrections, drop leading fillers and collapse whitespace
    pub fn normalize(&self, text: &str) -> String {
        let mut result = collapse_whitespace(text);

        for (pattern, replacement) in &self.corrections {
            result = pattern
                .replace_all(&result, NoExpand(replacement.as_str()))
                .into_owned();
        }

        let mut words: Vec<&str> = result.split_whitespace().collect();
        while let Some(first) = words.first() {
            let bare = first.trim_end_matches(',').to_lowercase();
            if FILLERS.contains(&bare.as_str()) {
                words.remove(0);
            } else {
                break;
            }
        }
        words.join(" ")
    }

    /// Whether the wake word appears anywhere, ignoring case.
    ///
    /// An empty wake word is never present.
    pub fn contains_wake_word(&self, text: &str) -> bool {
        self.wake_pattern
            .as_ref()
            .map(|p| p.is_match(text))
            .unwrap_or(false)
    }

    /// Remove every occurrence of the wake word and tidy what is left
    pub fn strip_wake_word(&self, text: &str) -> String {
        let stripped = match &self.wake_pattern {
            Some(pattern) => pattern.replace_all(text, " ").into_owned(),
            None => text.to_string(),
        };
        collapse_whitespace(&stripped)
            .trim_matches(|c: char| c == ',' || c == '.' || c == '!' || c == '?' || c.is_whitespace())
            .to_string()
    }
}

fn word_regex(phrase: &str) -> Result<Regex, regex::Error> {
    let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
    Regex::new(&format!(r"(?i)\b{}\b", words.join(r"\s+")))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
