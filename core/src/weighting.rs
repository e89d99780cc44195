use crate::config::WeightingConfig;
use serde::{Deserialize, Serialize};

/// Deterministic tf-idf weighting of a term in one concept.
///
/// `weight = (1 + ln tf) * idf` with `idf = ln(N / df)`, or `ln(1 + N / df)`
/// when smoothing is on. A term present in every concept gets weight zero
/// under the unsmoothed scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightingScheme {
    pub smoothed_idf: bool,
}

impl WeightingScheme {
    pub fn new(config: &WeightingConfig) -> Self {
        Self { smoothed_idf: config.smoothed_idf }
    }

    /// Computed in f64: an f32 ratio collapses to 1.0 once the concept count
    /// passes 2^24, which would zero the weight of retained terms.
    pub fn idf(&self, document_frequency: u32, concept_count: u32) -> f64 {
        if document_frequency == 0 || concept_count == 0 {
            return 0.0;
        }
        let ratio = concept_count as f64 / document_frequency as f64;
        if self.smoothed_idf { (1.0 + ratio).ln() } else { ratio.ln().max(0.0) }
    }

    pub fn tf(term_frequency: u32) -> f64 {
        if term_frequency > 0 { 1.0 + (term_frequency as f64).ln() } else { 0.0 }
    }

    pub fn weight(&self, term_frequency: u32, document_frequency: u32, concept_count: u32) -> f32 {
        (Self::tf(term_frequency) * self.idf(document_frequency, concept_count)) as f32
    }
}
