//! Index construction for Explicit Semantic Analysis.
//!
//! The pipeline has two stages. [`forward::ForwardIndexBuilder`] turns a stream
//! of tokenized concepts into a forward index (concept -> term occurrences).
//! [`invert::IndexInverter`] then reads that index through the
//! [`source::ForwardIndexStore`] contract, prunes the vocabulary with a
//! [`vocabulary::VocabularyFilter`] and writes one sparse concept vector per
//! retained term into a [`persist::InvertedIndexWriter`].

use serde::{Deserialize, Serialize};

pub mod analysis;
pub mod config;
pub mod error;
pub mod forward;
pub mod invert;
pub mod persist;
pub mod relevance;
pub mod source;
pub mod vocabulary;
pub mod weighting;

pub use config::EsaConfig;
pub use error::{EsaError, Result};

/// Position of a concept in the concept space of a committed forward index.
pub type ConceptId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub concept_id: ConceptId,
    pub weight: f32,
}

/// Sparse weight vector of one term over the concept space.
///
/// Postings are kept sorted by `concept_id` and only carry non-zero weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermVector {
    postings: Vec<Posting>,
}

impl TermVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a vector from unordered postings. Zero and negative weights are dropped.
    pub fn from_postings(mut postings: Vec<Posting>) -> Self {
        postings.retain(|p| p.weight > 0.0);
        postings.sort_by_key(|p| p.concept_id);
        Self { postings }
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    pub fn concept_ids(&self) -> impl Iterator<Item = ConceptId> + '_ {
        self.postings.iter().map(|p| p.concept_id)
    }

    pub fn weight(&self, concept_id: ConceptId) -> Option<f32> {
        self.postings
            .binary_search_by_key(&concept_id, |p| p.concept_id)
            .ok()
            .map(|i| self.postings[i].weight)
    }

    /// Postings ordered by descending weight, ties broken by concept id.
    pub fn top(&self, k: usize) -> Vec<Posting> {
        let mut ranked = self.postings.clone();
        ranked.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then(a.concept_id.cmp(&b.concept_id))
        });
        ranked.truncate(k);
        ranked
    }

    /// True if both vectors cover the same concepts and weights agree within `tolerance`.
    pub fn approx_eq(&self, other: &TermVector, tolerance: f32) -> bool {
        self.postings.len() == other.postings.len()
            && self
                .postings
                .iter()
                .zip(other.postings.iter())
                .all(|(a, b)| a.concept_id == b.concept_id && (a.weight - b.weight).abs() <= tolerance)
    }
}

/// A distinct term of the forward index with its document frequency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermStats {
    pub term: String,
    pub document_frequency: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_postings_sorts_and_drops_zero_weights() {
        let v = TermVector::from_postings(vec![
            Posting { concept_id: 7, weight: 0.5 },
            Posting { concept_id: 2, weight: 0.0 },
            Posting { concept_id: 1, weight: 1.5 },
        ]);
        assert_eq!(v.concept_ids().collect::<Vec<_>>(), vec![1, 7]);
        assert_eq!(v.weight(7), Some(0.5));
        assert_eq!(v.weight(2), None);
    }

    #[test]
    fn top_orders_by_weight() {
        let v = TermVector::from_postings(vec![
            Posting { concept_id: 0, weight: 0.2 },
            Posting { concept_id: 1, weight: 0.9 },
            Posting { concept_id: 2, weight: 0.9 },
        ]);
        let top: Vec<_> = v.top(2).iter().map(|p| p.concept_id).collect();
        assert_eq!(top, vec![1, 2]);
    }
}
