//! Exact phrase matching and vector similarity.

use regex::Regex;
use std::collections::BTreeSet;

use crate::error::{Result, RetrieverError};

/// Finds answer phrases that occur verbatim in a source.
///
/// Both texts are lowercased and every character that is neither a word
/// character nor whitespace becomes a space. Each window of
/// `min_words..=max_words` consecutive answer words is then looked up as a
/// substring of the space-joined source words. Containment is plain
/// substring search, so a phrase may match across a word boundary
/// ("ion is a" matches inside "infection is a").
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    punctuation: Regex,
    min_words: usize,
    max_words: usize,
}

impl PhraseMatcher {
    pub fn new(min_words: usize, max_words: usize) -> Result<Self> {
        if min_words == 0 || min_words > max_words {
            return Err(RetrieverError::Config(format!(
                "invalid phrase length range {min_words}..={max_words}"
            )));
        }
        let punctuation = Regex::new(r"[^\w\s]")
            .map_err(|e| RetrieverError::Config(format!("phrase pattern: {e}")))?;
        Ok(Self {
            punctuation,
            min_words,
            max_words,
        })
    }

    /// Lowercase, strip punctuation and split into words.
    pub fn words(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.punctuation
            .replace_all(&lowered, " ")
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    pub fn find_exact_matches(&self, response: &str, source: &str) -> BTreeSet<String> {
        let response_words = self.words(response);
        let haystack = self.words(source).join(" ");

        let mut matches = BTreeSet::new();
        for len in self.min_words..=self.max_words {
            for window in response_words.windows(len) {
                let phrase = window.join(" ");
                if !matches.contains(&phrase) && haystack.contains(&phrase) {
                    matches.insert(phrase);
                }
            }
        }
        matches
    }
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity in [-1, 1]; 0.0 when either vector has zero norm or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (a_norm, b_norm) = (l2_norm(a), l2_norm(b));
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    f64::from(dot / (a_norm * b_norm)).clamp(-1.0, 1.0)
}
