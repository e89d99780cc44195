//! Read access to a committed forward index.

use crate::error::{EsaError, Result};
use crate::forward::{FIELD_ID, FIELD_TOKEN};
use crate::weighting::WeightingScheme;
use crate::{ConceptId, Posting, TermStats, TermVector};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tantivy::postings::Postings;
use tantivy::schema::*;
use tantivy::termdict::TermMerger;
use tantivy::{
    DocAddress, DocSet, Index, IndexReader, InvertedIndexReader, ReloadPolicy, Searcher, TantivyDocument,
    TERMINATED,
};

pub type TermIter<'a> = Box<dyn Iterator<Item = Result<TermStats>> + 'a>;

/// Query contract the inverter relies on.
///
/// Implementations are shared between worker threads, so every method takes
/// `&self` and must be safe to call concurrently.
pub trait ForwardIndexStore: Send + Sync {
    /// Number of concepts in the concept space.
    fn total_concept_count(&self) -> u32;

    /// Every distinct term with its document frequency. Each call starts a fresh pass.
    fn distinct_terms(&self) -> Result<TermIter<'_>>;

    /// Weights of `term` over all concepts containing it. Unknown terms yield an empty vector.
    fn weight_vector(&self, term: &str) -> Result<TermVector>;

    /// Concept titles indexed by `ConceptId`.
    fn concept_titles(&self) -> Result<Vec<String>>;
}

/// Forward index backed by a tantivy index written by `ForwardIndexBuilder`.
///
/// Concept ids are assigned by walking segments in searcher order, so
/// `concept_id = sum(max_doc of earlier segments) + segment doc id`.
pub struct TantivyForwardIndex {
    searcher: Searcher,
    /// Token field dictionaries, one per segment in searcher order.
    segments: Vec<Arc<InvertedIndexReader>>,
    token_field: Field,
    id_field: Field,
    concept_count: u32,
    weighting: WeightingScheme,
}

impl TantivyForwardIndex {
    pub fn open<P: AsRef<Path>>(path: P, weighting: WeightingScheme) -> Result<Self> {
        let path = path.as_ref();
        let index = Index::open_in_dir(path).map_err(|e| EsaError::source_unavailable(path, e))?;
        let schema = index.schema();
        let token_field = schema.get_field(FIELD_TOKEN).map_err(|e| EsaError::source_unavailable(path, e))?;
        let id_field = schema.get_field(FIELD_ID).map_err(|e| EsaError::source_unavailable(path, e))?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| EsaError::source_unavailable(path, e))?;
        let searcher = reader.searcher();
        let concept_count =
            u32::try_from(searcher.num_docs()).map_err(|e| EsaError::source_unavailable(path, e))?;
        let segments = searcher
            .segment_readers()
            .iter()
            .map(|segment| segment.inverted_index(token_field))
            .collect::<tantivy::Result<Vec<_>>>()
            .map_err(|e| EsaError::source_unavailable(path, e))?;

        tracing::info!(path = %path.display(), concept_count, segments = segments.len(), "forward index opened");
        Ok(Self { searcher, segments, token_field, id_field, concept_count, weighting })
    }
}

impl ForwardIndexStore for TantivyForwardIndex {
    fn total_concept_count(&self) -> u32 {
        self.concept_count
    }

    fn distinct_terms(&self) -> Result<TermIter<'_>> {
        let streams = self
            .segments
            .iter()
            .map(|inverted| inverted.terms().stream())
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(EsaError::source_read)?;
        Ok(Box::new(MergedTerms { merger: TermMerger::new(streams) }))
    }

    fn weight_vector(&self, term: &str) -> Result<TermVector> {
        let key = Term::from_field_text(self.token_field, term);
        let document_frequency = self.searcher.doc_freq(&key).map_err(EsaError::source_read)? as u32;

        let mut postings = Vec::with_capacity(document_frequency as usize);
        let mut base: ConceptId = 0;
        for (segment, inverted) in self.searcher.segment_readers().iter().zip(&self.segments) {
            let segment_postings = inverted
                .read_postings(&key, IndexRecordOption::WithFreqs)
                .map_err(EsaError::source_read)?;
            if let Some(mut segment_postings) = segment_postings {
                let mut doc = segment_postings.doc();
                while doc != TERMINATED {
                    let weight = self.weighting.weight(
                        segment_postings.term_freq(),
                        document_frequency,
                        self.concept_count,
                    );
                    postings.push(Posting { concept_id: base + doc, weight });
                    doc = segment_postings.advance();
                }
            }
            base += segment.max_doc();
        }
        Ok(TermVector::from_postings(postings))
    }

    fn concept_titles(&self) -> Result<Vec<String>> {
        let mut titles = Vec::with_capacity(self.concept_count as usize);
        for (ord, segment) in self.searcher.segment_readers().iter().enumerate() {
            for doc_id in 0..segment.max_doc() {
                let doc: TantivyDocument = self
                    .searcher
                    .doc(DocAddress::new(ord as u32, doc_id))
                    .map_err(EsaError::source_read)?;
                let title = doc
                    .get_first(self.id_field)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                titles.push(title);
            }
        }
        Ok(titles)
    }
}

/// Streams the union of the segment term dictionaries in term order.
/// Segments overlap, so a term's document frequency is the sum over segments.
struct MergedTerms<'a> {
    merger: TermMerger<'a>,
}

impl Iterator for MergedTerms<'_> {
    type Item = Result<TermStats>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.merger.advance() {
            return None;
        }
        let document_frequency = self
            .merger
            .current_segment_ords_and_term_infos()
            .map(|(_, info)| info.doc_freq)
            .sum();
        let stats = std::str::from_utf8(self.merger.key())
            .map(|term| TermStats { term: term.to_string(), document_frequency })
            .map_err(EsaError::source_read);
        Some(stats)
    }
}

/// Forward index held in memory. Concepts are stored exactly as given;
/// relevance filtering is the builder's concern.
#[derive(Debug, Clone, Default)]
pub struct MemoryForwardIndex {
    titles: Vec<String>,
    frequencies: Vec<HashMap<String, u32>>,
    weighting: WeightingScheme,
}

impl MemoryForwardIndex {
    pub fn new(weighting: WeightingScheme) -> Self {
        Self { weighting, ..Self::default() }
    }

    pub fn add_concept<S: AsRef<str>>(&mut self, title: &str, tokens: &[S]) -> ConceptId {
        let mut tf: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *tf.entry(token.as_ref().to_string()).or_insert(0) += 1;
        }
        self.titles.push(title.to_string());
        self.frequencies.push(tf);
        (self.titles.len() - 1) as ConceptId
    }

    pub fn document_frequency(&self, term: &str) -> u32 {
        self.frequencies.iter().filter(|tf| tf.contains_key(term)).count() as u32
    }
}

impl ForwardIndexStore for MemoryForwardIndex {
    fn total_concept_count(&self) -> u32 {
        self.titles.len() as u32
    }

    fn distinct_terms(&self) -> Result<TermIter<'_>> {
        let mut df: BTreeMap<&str, u32> = BTreeMap::new();
        for tf in &self.frequencies {
            for term in tf.keys() {
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }
        Ok(Box::new(df.into_iter().map(|(term, document_frequency)| {
            Ok(TermStats { term: term.to_string(), document_frequency })
        })))
    }

    fn weight_vector(&self, term: &str) -> Result<TermVector> {
        let df = self.document_frequency(term);
        let n = self.total_concept_count();
        let postings = self
            .frequencies
            .iter()
            .enumerate()
            .filter_map(|(id, tf)| {
                tf.get(term).map(|&f| Posting {
                    concept_id: id as ConceptId,
                    weight: self.weighting.weight(f, df, n),
                })
            })
            .collect();
        Ok(TermVector::from_postings(postings))
    }

    fn concept_titles(&self) -> Result<Vec<String>> {
        Ok(self.titles.clone())
    }
}
