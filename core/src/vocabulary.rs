use crate::config::VocabularyConfig;
use crate::error::Result;
use crate::TermStats;
use std::collections::BTreeSet;

/// Document-frequency based pruning of the vocabulary.
///
/// A term is retained iff `min_document_frequency <= df < max_document_frequency`
/// where `max_document_frequency = ceil(max_corpus_distribution * concept_count)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VocabularyFilter {
    min_document_frequency: u32,
    max_corpus_distribution: f64,
}

/// Outcome of one pass over the term dictionary.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    pub retained: BTreeSet<String>,
    pub total_term_count: usize,
    pub max_document_frequency: u64,
}

impl VocabularyFilter {
    /// Validates both bounds up front; nothing is read before this succeeds.
    pub fn new(min_document_frequency: i64, max_corpus_distribution: f64) -> Result<Self> {
        let config = VocabularyConfig { min_document_frequency, max_corpus_distribution };
        Self::from_config(&config)
    }

    pub fn from_config(config: &VocabularyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            min_document_frequency: config.min_document_frequency as u32,
            max_corpus_distribution: config.max_corpus_distribution,
        })
    }

    pub fn min_document_frequency(&self) -> u32 {
        self.min_document_frequency
    }

    pub fn max_corpus_distribution(&self) -> f64 {
        self.max_corpus_distribution
    }

    /// `ceil(max_corpus_distribution * concept_count)`.
    ///
    /// Products within 1e-9 of an integer are snapped to it first, so that
    /// 0.3 * 10 yields 3 rather than 4.
    pub fn max_document_frequency(&self, concept_count: u32) -> u64 {
        let raw = self.max_corpus_distribution * concept_count as f64;
        let nearest = raw.round();
        if (raw - nearest).abs() < 1e-9 {
            nearest as u64
        } else {
            raw.ceil() as u64
        }
    }

    pub fn retains(&self, document_frequency: u32, max_document_frequency: u64) -> bool {
        self.min_document_frequency <= document_frequency
            && (document_frequency as u64) < max_document_frequency
    }

    /// Counts every term and keeps those inside the frequency window.
    pub fn select<I>(&self, terms: I, concept_count: u32) -> Result<Vocabulary>
    where
        I: IntoIterator<Item = Result<TermStats>>,
    {
        let max_document_frequency = self.max_document_frequency(concept_count);
        let mut vocabulary = Vocabulary { max_document_frequency, ..Vocabulary::default() };
        for stats in terms {
            let stats = stats?;
            vocabulary.total_term_count += 1;
            if self.retains(stats.document_frequency, max_document_frequency) {
                vocabulary.retained.insert(stats.term);
            } else {
                tracing::trace!(term = %stats.term, df = stats.document_frequency, "term pruned");
            }
        }
        Ok(vocabulary)
    }
}

impl Default for VocabularyFilter {
    fn default() -> Self {
        Self { min_document_frequency: 3, max_corpus_distribution: 0.1 }
    }
}
