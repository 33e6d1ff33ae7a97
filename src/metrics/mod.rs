//! # Accuracy Metrics
//!
//! Computes the five standard ASR evaluation scores between a reference
//! (ground truth) transcript and a hypothesis (model output) transcript:
//!
//! - **WER**: word error rate, `(S + D + I) / reference words`
//! - **MER**: match error rate, `(S + D + I) / (M + S + D + I)`
//! - **WIL**: word information lost, `1 - (M/ref_len) * (M/hyp_len)`
//! - **WIP**: word information preserved, `1 - WIL`
//! - **CER**: character error rate, WER's formula over characters
//!
//! All word-level scores come from one word alignment and CER from one
//! character alignment; no metric re-aligns independently, so the five
//! values are always mutually consistent.
//!
//! An empty reference makes WER/MER/CER a division by zero. That is an
//! input error and fails as [`BenchError::InvalidInput`]; callers never
//! see NaN from this module.

mod levenshtein;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};
use levenshtein::{align, AlignmentCounts};

/// Options for metric computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsOptions {
    /// Lowercase both texts and strip punctuation before tokenizing.
    /// Off by default; see the `metrics.normalize` configuration key.
    pub normalize: bool,
}

/// The five accuracy scores for one reference/hypothesis pair.
///
/// Each value is a ratio: 0.0 is a perfect transcript for the error
/// rates (WER, MER, WIL, CER), 1.0 is perfect for WIP. WER and CER can
/// exceed 1.0 when the hypothesis is much longer than the reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub wer: f64,
    pub mer: f64,
    pub wil: f64,
    pub wip: f64,
    pub cer: f64,
}

/// Score `hypothesis` against `reference`.
///
/// Both texts are trimmed of leading/trailing whitespace first; with
/// `options.normalize` they are additionally lowercased and stripped of
/// punctuation. A reference that is empty after that preprocessing is
/// rejected with `InvalidInput`.
pub fn compute_metrics(
    reference: &str,
    hypothesis: &str,
    options: &MetricsOptions,
) -> BenchResult<AccuracyMetrics> {
    let reference = preprocess(reference, options);
    let hypothesis = preprocess(hypothesis, options);

    if reference.is_empty() {
        return Err(BenchError::invalid_input(
            "reference transcript is empty; error rates are undefined",
        ));
    }

    let ref_words: Vec<&str> = reference.split_whitespace().collect();
    let hyp_words: Vec<&str> = hypothesis.split_whitespace().collect();
    let word_counts = align(&ref_words, &hyp_words);

    let ref_chars: Vec<char> = reference.chars().collect();
    let hyp_chars: Vec<char> = hypothesis.chars().collect();
    let char_counts = align(&ref_chars, &hyp_chars);

    Ok(AccuracyMetrics {
        wer: error_rate(&word_counts),
        mer: match_error_rate(&word_counts),
        wil: information_lost(&word_counts),
        wip: 1.0 - information_lost(&word_counts),
        cer: error_rate(&char_counts),
    })
}

/// `(S + D + I) / ref_len`. Caller guarantees a non-empty reference.
fn error_rate(counts: &AlignmentCounts) -> f64 {
    counts.edits() as f64 / counts.reference_len() as f64
}

/// `(S + D + I) / (M + S + D + I)`.
fn match_error_rate(counts: &AlignmentCounts) -> f64 {
    let denominator = counts.matches + counts.edits();
    counts.edits() as f64 / denominator as f64
}

/// `1 - (M/ref_len) * (M/hyp_len)`; 1.0 when the hypothesis is empty,
/// since no information survives.
fn information_lost(counts: &AlignmentCounts) -> f64 {
    let ref_len = counts.reference_len();
    let hyp_len = counts.hypothesis_len();
    if ref_len == 0 || hyp_len == 0 {
        return 1.0;
    }
    let matches = counts.matches as f64;
    1.0 - (matches / ref_len as f64) * (matches / hyp_len as f64)
}

fn preprocess(text: &str, options: &MetricsOptions) -> String {
    let trimmed = text.trim();
    if !options.normalize {
        return trimmed.to_string();
    }
    trimmed
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
