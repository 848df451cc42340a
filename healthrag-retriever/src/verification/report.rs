//! Human-readable and API renderings of a [`ResponseVerification`].

use serde::{Deserialize, Serialize};
use std::fmt::Write;

use super::{HallucinationRisk, ResponseVerification, VerificationDetails};

/// Plain-text verification report.
pub fn render_report(verification: &ResponseVerification) -> String {
    let details = &verification.details;
    let mut out = String::new();

    let _ = writeln!(out, "=== RESPONSE VERIFICATION REPORT ===");
    let _ = writeln!(out);
    let _ = writeln!(out, "Query: {}", verification.query);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Response Grounding Status: {}",
        if verification.is_grounded {
            "GROUNDED"
        } else {
            "NOT GROUNDED"
        }
    );
    let _ = writeln!(out, "Hallucination Risk: {}", verification.hallucination_risk);
    let _ = writeln!(
        out,
        "Overall Verification Score: {:.3}",
        verification.total_verification_score
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Source Analysis:");

    for (i, source) in verification.sources_used.iter().enumerate() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Source {}: {}", i + 1, source.source_file);
        let _ = writeln!(
            out,
            "  Status: {}",
            if source.is_verified {
                "VERIFIED"
            } else {
                "NOT VERIFIED"
            }
        );
        let _ = writeln!(out, "  Similarity Score: {:.3}", source.similarity_score);
        let _ = writeln!(out, "  Exact Matches: {} phrases", source.exact_matches.len());
        let _ = writeln!(
            out,
            "  Verification Confidence: {:.3}",
            source.verification_confidence
        );
        let _ = writeln!(out, "  Sample Matches: {}", source.sample_matches().join(", "));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Summary Statistics:");
    let _ = writeln!(out, "- Total Sources Analyzed: {}", details.total_sources);
    let _ = writeln!(out, "- Sources Verified: {}", details.verified_sources);
    let _ = writeln!(out, "- Average Similarity: {:.3}", details.average_similarity);
    let _ = writeln!(out, "- Total Exact Matches: {}", details.total_exact_matches);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Verification completed at: {}",
        details.verification_timestamp.to_rfc3339()
    );
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub is_grounded: bool,
    pub hallucination_risk: HallucinationRisk,
    pub verification_score: f64,
    pub sources_verified: usize,
    pub total_sources: usize,
    pub exact_matches_found: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDetail {
    pub source_file: String,
    pub is_verified: bool,
    pub similarity_score: f64,
    pub exact_matches_count: usize,
    pub sample_matches: Vec<String>,
    pub confidence: f64,
}

/// The verification payload returned to API clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationApiResponse {
    pub verification: VerificationSummary,
    pub source_details: Vec<SourceDetail>,
    pub verification_metadata: VerificationDetails,
}

impl From<&ResponseVerification> for VerificationApiResponse {
    fn from(v: &ResponseVerification) -> Self {
        Self {
            verification: VerificationSummary {
                is_grounded: v.is_grounded,
                hallucination_risk: v.hallucination_risk,
                verification_score: v.total_verification_score,
                sources_verified: v.details.verified_sources,
                total_sources: v.details.total_sources,
                exact_matches_found: v.details.total_exact_matches,
            },
            source_details: v
                .sources_used
                .iter()
                .map(|s| SourceDetail {
                    source_file: s.source_file.clone(),
                    is_verified: s.is_verified,
                    similarity_score: s.similarity_score,
                    exact_matches_count: s.exact_matches.len(),
                    sample_matches: s.sample_matches(),
                    confidence: s.verification_confidence,
                })
                .collect(),
            verification_metadata: v.details.clone(),
        }
    }
}
