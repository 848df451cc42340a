//! Grounding verification of generated answers against their sources.
//!
//! For every retrieved source the verifier collects two kinds of evidence:
//!
//! - **Exact phrases**: distinct 3 to 5 word phrases of the answer that occur
//!   literally in the source after lowercasing and punctuation stripping.
//! - **Semantic similarity**: cosine similarity between the embedding of the
//!   whole answer and the embedding of the whole source.
//!
//! These combine into a per-source confidence, and the per-source results
//! aggregate into an overall score, a grounded flag and a
//! [`HallucinationRisk`] category. All cut-offs live in
//! [`VerificationThresholds`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Result, RetrieverError};

pub mod phrases;
pub mod report;
pub mod verifier;

pub use phrases::{PhraseMatcher, cosine_similarity};
pub use report::{VerificationApiResponse, render_report};
pub use verifier::GroundingVerifier;

/// Tunable cut-offs and weights for grounding verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationThresholds {
    /// Reported alongside results; not used in scoring
    pub exact_match: f64,
    /// Similarity above which a source with any exact phrase is verified
    pub semantic_similarity: f64,
    /// Confidence above which a source is verified, and mean confidence above
    /// which an answer can be grounded
    pub grounding: f64,
    /// Verified-source ratio above which an answer can be grounded
    pub grounded_ratio: f64,
    pub low_risk_score: f64,
    pub low_risk_ratio: f64,
    pub medium_risk_score: f64,
    pub medium_risk_ratio: f64,
    /// Contribution of each exact phrase to the exact-match score (capped at 1)
    pub per_match_score: f64,
    pub exact_match_weight: f64,
    pub semantic_weight: f64,
    pub min_phrase_words: usize,
    pub max_phrase_words: usize,
}

impl Default for VerificationThresholds {
    fn default() -> Self {
        Self {
            exact_match: 0.8,
            semantic_similarity: 0.7,
            grounding: 0.6,
            grounded_ratio: 0.3,
            low_risk_score: 0.8,
            low_risk_ratio: 0.6,
            medium_risk_score: 0.5,
            medium_risk_ratio: 0.3,
            per_match_score: 0.2,
            exact_match_weight: 0.4,
            semantic_weight: 0.6,
            min_phrase_words: 3,
            max_phrase_words: 5,
        }
    }
}

impl VerificationThresholds {
    pub fn validate(&self) -> Result<()> {
        let unit = [
            ("exact_match", self.exact_match),
            ("semantic_similarity", self.semantic_similarity),
            ("grounding", self.grounding),
            ("grounded_ratio", self.grounded_ratio),
            ("low_risk_score", self.low_risk_score),
            ("low_risk_ratio", self.low_risk_ratio),
            ("medium_risk_score", self.medium_risk_score),
            ("medium_risk_ratio", self.medium_risk_ratio),
            ("per_match_score", self.per_match_score),
            ("exact_match_weight", self.exact_match_weight),
            ("semantic_weight", self.semantic_weight),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(RetrieverError::Config(format!(
                    "verification.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.min_phrase_words == 0 || self.min_phrase_words > self.max_phrase_words {
            return Err(RetrieverError::Config(format!(
                "invalid phrase length range {}..={}",
                self.min_phrase_words, self.max_phrase_words
            )));
        }
        Ok(())
    }

    /// Combine exact-match evidence and similarity into a confidence.
    pub fn confidence(&self, exact_matches: usize, similarity: f64) -> f64 {
        let exact_match_score = (exact_matches as f64 * self.per_match_score).min(1.0);
        self.exact_match_weight * exact_match_score + self.semantic_weight * similarity
    }

    pub fn is_source_verified(&self, exact_matches: usize, similarity: f64, confidence: f64) -> bool {
        (exact_matches > 0 && similarity > self.semantic_similarity) || confidence > self.grounding
    }

    pub fn is_grounded(&self, total_score: f64, ratio: f64) -> bool {
        total_score > self.grounding && ratio > self.grounded_ratio
    }

    pub fn classify_risk(&self, total_score: f64, ratio: f64) -> HallucinationRisk {
        if total_score > self.low_risk_score && ratio > self.low_risk_ratio {
            HallucinationRisk::Low
        } else if total_score > self.medium_risk_score && ratio > self.medium_risk_ratio {
            HallucinationRisk::Medium
        } else {
            HallucinationRisk::High
        }
    }

    pub fn used(&self) -> ThresholdsUsed {
        ThresholdsUsed {
            exact_match: self.exact_match,
            semantic_similarity: self.semantic_similarity,
            grounding: self.grounding,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HallucinationRisk {
    Low,
    Medium,
    High,
}

impl fmt::Display for HallucinationRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        })
    }
}

/// Evidence that an answer is supported by one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceVerification {
    pub source_id: String,
    /// File name of the source document
    pub source_file: String,
    /// blake3 hex digest of the source content (of "" when unavailable)
    pub content_hash: String,
    pub similarity_score: f64,
    pub exact_matches: BTreeSet<String>,
    pub semantic_overlap: f64,
    pub is_verified: bool,
    pub verification_confidence: f64,
}

impl SourceVerification {
    /// Result for a source whose content could not be read.
    pub fn unavailable(source_id: String, source_file: String) -> Self {
        Self {
            source_id,
            source_file,
            content_hash: blake3::hash(b"").to_hex().to_string(),
            similarity_score: 0.0,
            exact_matches: BTreeSet::new(),
            semantic_overlap: 0.0,
            is_verified: false,
            verification_confidence: 0.0,
        }
    }

    /// Up to three matched phrases, in sorted order.
    pub fn sample_matches(&self) -> Vec<String> {
        self.exact_matches.iter().take(3).cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdsUsed {
    pub exact_match: f64,
    pub semantic_similarity: f64,
    pub grounding: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationDetails {
    pub total_sources: usize,
    pub verified_sources: usize,
    pub average_similarity: f64,
    pub total_exact_matches: usize,
    pub verification_timestamp: DateTime<Utc>,
    pub thresholds_used: ThresholdsUsed,
}

/// Verification outcome for a whole answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseVerification {
    pub query: String,
    pub response: String,
    pub sources_used: Vec<SourceVerification>,
    pub total_verification_score: f64,
    pub is_grounded: bool,
    pub hallucination_risk: HallucinationRisk,
    pub details: VerificationDetails,
}

impl ResponseVerification {
    /// Aggregate per-source results into an answer-level verdict.
    pub fn aggregate(
        query: impl Into<String>,
        response: impl Into<String>,
        sources_used: Vec<SourceVerification>,
        thresholds: &VerificationThresholds,
    ) -> Self {
        let total = sources_used.len();
        let verified = sources_used.iter().filter(|s| s.is_verified).count();
        let (total_score, ratio, average_similarity) = if total == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let n = total as f64;
            (
                sources_used.iter().map(|s| s.verification_confidence).sum::<f64>() / n,
                verified as f64 / n,
                sources_used.iter().map(|s| s.similarity_score).sum::<f64>() / n,
            )
        };

        let details = VerificationDetails {
            total_sources: total,
            verified_sources: verified,
            average_similarity,
            total_exact_matches: sources_used.iter().map(|s| s.exact_matches.len()).sum(),
            verification_timestamp: Utc::now(),
            thresholds_used: thresholds.used(),
        };

        Self {
            query: query.into(),
            response: response.into(),
            sources_used,
            total_verification_score: total_score,
            is_grounded: thresholds.is_grounded(total_score, ratio),
            hallucination_risk: thresholds.classify_risk(total_score, ratio),
            details,
        }
    }

    pub fn verification_ratio(&self) -> f64 {
        if self.details.total_sources == 0 {
            0.0
        } else {
            self.details.verified_sources as f64 / self.details.total_sources as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(confidence: f64, similarity: f64, verified: bool, matches: &[&str]) -> SourceVerification {
        SourceVerification {
            source_id: "unknown".into(),
            source_file: "s.txt".into(),
            content_hash: String::new(),
            similarity_score: similarity,
            exact_matches: matches.iter().map(|m| m.to_string()).collect(),
            semantic_overlap: confidence,
            is_verified: verified,
            verification_confidence: confidence,
        }
    }

    #[test]
    fn test_risk_boundaries() {
        let t = VerificationThresholds::default();
        assert_eq!(t.classify_risk(0.85, 0.7), HallucinationRisk::Low);
        assert_eq!(t.classify_risk(0.6, 0.4), HallucinationRisk::Medium);
        assert_eq!(t.classify_risk(0.2, 0.1), HallucinationRisk::High);
        // Comparisons are strict.
        assert_eq!(t.classify_risk(0.8, 0.9), HallucinationRisk::Medium);
        assert_eq!(t.classify_risk(0.9, 0.3), HallucinationRisk::High);
    }

    #[test]
    fn test_confidence_and_verification_rules() {
        let t = VerificationThresholds::default();
        assert!((t.confidence(2, 0.5) - (0.4 * 0.4 + 0.6 * 0.5)).abs() < 1e-12);
        assert!((t.confidence(9, 0.0) - 0.4).abs() < 1e-12);

        // One phrase plus high similarity verifies despite low confidence.
        let conf = t.confidence(1, 0.71);
        assert!(conf < 0.6);
        assert!(t.is_source_verified(1, 0.71, conf));
        assert!(!t.is_source_verified(0, 0.71, t.confidence(0, 0.71)));
        assert!(t.is_source_verified(0, 0.5, 0.65));
    }

    #[test]
    fn test_zero_sources() {
        let t = VerificationThresholds::default();
        let v = ResponseVerification::aggregate("q", "r", Vec::new(), &t);
        assert_eq!(v.total_verification_score, 0.0);
        assert_eq!(v.verification_ratio(), 0.0);
        assert!(!v.is_grounded);
        assert_eq!(v.hallucination_risk, HallucinationRisk::High);
        assert_eq!(v.details.total_sources, 0);
        assert_eq!(v.details.average_similarity, 0.0);
    }

    #[test]
    fn test_aggregate_counts_and_means() {
        let t = VerificationThresholds::default();
        let v = ResponseVerification::aggregate(
            "q",
            "r",
            vec![
                source(0.9, 0.9, true, &["a b c", "b c d"]),
                source(0.75, 0.8, true, &["x y z"]),
                source(0.0, 0.1, false, &[]),
            ],
            &t,
        );
        assert!((v.total_verification_score - 0.55).abs() < 1e-9);
        assert_eq!(v.details.verified_sources, 2);
        assert_eq!(v.details.total_exact_matches, 3);
        assert!((v.details.average_similarity - 0.6).abs() < 1e-9);
        assert!(!v.is_grounded);
        assert_eq!(v.hallucination_risk, HallucinationRisk::Medium);
    }

    #[test]
    fn test_risk_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&HallucinationRisk::Low).unwrap(), "\"LOW\"");
        assert_eq!(HallucinationRisk::High.to_string(), "HIGH");
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut t = VerificationThresholds::default();
        assert!(t.validate().is_ok());
        t.grounding = 1.5;
        assert!(t.validate().is_err());

        let t = VerificationThresholds {
            min_phrase_words: 6,
            ..Default::default()
        };
        assert!(t.validate().is_err());
    }
}
