use crate::config::{EsaConfig, InversionConfig};
use crate::error::{EsaError, Result};
use crate::persist::{reset_dir, InvertedIndexWriter};
use crate::source::{ForwardIndexStore, TantivyForwardIndex};
use crate::vocabulary::VocabularyFilter;
use crate::weighting::WeightingScheme;
use crate::TermVector;
use crossbeam::channel::{bounded, Receiver};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative stop flag, checked once per term.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InversionReport {
    pub retained_term_count: usize,
    pub total_term_count: usize,
    pub concept_count: u32,
}

pub struct ProgressMeter {
    total: usize,
    processed: usize,
    last_percent: usize,
}

impl ProgressMeter {
    pub fn new(total: usize) -> Self {
        Self { total, processed: 0, last_percent: 0 }
    }

    pub fn next(&mut self, term: &str) {
        self.processed += 1;
        tracing::debug!("[{}] {}", term, self);
        let percent = self.percent();
        if percent > self.last_percent {
            self.last_percent = percent;
            tracing::info!(processed = self.processed, total = self.total, "inversion {}% done", percent);
        }
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    fn percent(&self) -> usize {
        if self.total == 0 { 100 } else { self.processed * 100 / self.total }
    }
}

impl fmt::Display for ProgressMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({}%)", self.processed, self.total, self.percent())
    }
}

/// Turns a forward index into a term -> concept vector store.
pub struct IndexInverter {
    filter: VocabularyFilter,
    workers: usize,
    queue_capacity: usize,
    cancel: CancellationToken,
    settings: Option<EsaConfig>,
}

impl IndexInverter {
    pub fn new(filter: VocabularyFilter) -> Self {
        let defaults = InversionConfig::default();
        Self {
            filter,
            workers: defaults.workers,
            queue_capacity: defaults.queue_capacity,
            cancel: CancellationToken::new(),
            settings: None,
        }
    }

    /// Validates the whole configuration before anything touches the disk.
    pub fn from_config(config: &EsaConfig) -> Result<Self> {
        config.validate()?;
        let filter = VocabularyFilter::from_config(&config.vocabulary)?;
        Ok(Self {
            filter,
            workers: config.inversion.workers,
            queue_capacity: config.inversion.queue_capacity,
            cancel: CancellationToken::new(),
            settings: Some(config.clone()),
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn filter(&self) -> &VocabularyFilter {
        &self.filter
    }

    /// Opens the tantivy forward index at `forward` and inverts it into `target`.
    pub fn invert_dir(
        &self,
        forward: &Path,
        target: &Path,
        weighting: WeightingScheme,
    ) -> Result<InversionReport> {
        reset_dir(target).map_err(EsaError::sink_write)?;
        let source = TantivyForwardIndex::open(forward, weighting)?;
        self.run(&source, target)
    }

    /// Inverts `source` into a fresh store at `target`.
    ///
    /// On any error the store is left without its completion marker, so
    /// `InvertedIndexReader::open` reports it as incomplete.
    pub fn invert<S: ForwardIndexStore + ?Sized>(&self, source: &S, target: &Path) -> Result<InversionReport> {
        reset_dir(target).map_err(EsaError::sink_write)?;
        self.run(source, target)
    }

    fn run<S: ForwardIndexStore + ?Sized>(&self, source: &S, target: &Path) -> Result<InversionReport> {
        let concept_count = source.total_concept_count();
        let vocabulary = self.filter.select(source.distinct_terms()?, concept_count)?;
        tracing::info!(
            retained = vocabulary.retained.len(),
            total = vocabulary.total_term_count,
            max_document_frequency = vocabulary.max_document_frequency,
            "Using {} terms out of {}",
            vocabulary.retained.len(),
            vocabulary.total_term_count
        );
        tracing::info!(target = %target.display(), "writing inverted index");

        let mut writer = InvertedIndexWriter::create(target, concept_count)?;
        writer.save_concepts(&source.concept_titles()?)?;

        let mut progress = ProgressMeter::new(vocabulary.retained.len());
        let extracted = if self.workers <= 1 {
            self.extract_sequential(source, &vocabulary.retained, &mut writer, &mut progress)
        } else {
            self.extract_parallel(source, &vocabulary.retained, &mut writer, &mut progress)
        };
        if let Err(e) = extracted {
            tracing::warn!(error = %e, progress = %progress, "inversion aborted, target left incomplete");
            return Err(e);
        }

        writer.close(vocabulary.total_term_count, self.settings.as_ref())?;
        let report = InversionReport {
            retained_term_count: vocabulary.retained.len(),
            total_term_count: vocabulary.total_term_count,
            concept_count,
        };
        tracing::info!(?report, "inverted index complete");
        Ok(report)
    }

    fn check_cancelled(&self, progress: &ProgressMeter) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(EsaError::Cancelled { processed: progress.processed(), total: progress.total() });
        }
        Ok(())
    }

    fn extract_sequential<S: ForwardIndexStore + ?Sized>(
        &self,
        source: &S,
        terms: &BTreeSet<String>,
        writer: &mut InvertedIndexWriter,
        progress: &mut ProgressMeter,
    ) -> Result<()> {
        for term in terms {
            self.check_cancelled(progress)?;
            let vector = source.weight_vector(term)?;
            writer.put(term, &vector)?;
            progress.next(term);
        }
        Ok(())
    }

    /// Workers pull terms from one channel and push vectors through a bounded
    /// channel; only this thread touches the writer.
    fn extract_parallel<S: ForwardIndexStore + ?Sized>(
        &self,
        source: &S,
        terms: &BTreeSet<String>,
        writer: &mut InvertedIndexWriter,
        progress: &mut ProgressMeter,
    ) -> Result<()> {
        let (term_tx, term_rx) = bounded::<&str>(self.queue_capacity);
        let (result_tx, result_rx) = bounded::<Result<(&str, TermVector)>>(self.queue_capacity);

        std::thread::scope(|scope| {
            for _ in 0..self.workers {
                let term_rx = term_rx.clone();
                let result_tx = result_tx.clone();
                let cancel = &self.cancel;
                scope.spawn(move || {
                    for term in term_rx.iter() {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let result = source.weight_vector(term).map(|vector| (term, vector));
                        let failed = result.is_err();
                        if result_tx.send(result).is_err() || failed {
                            break;
                        }
                    }
                });
            }
            drop(term_rx);
            drop(result_tx);

            scope.spawn(move || {
                for term in terms {
                    if term_tx.send(term.as_str()).is_err() {
                        break;
                    }
                }
            });

            // Dropping the receiver on return unblocks every worker.
            self.drain(result_rx, writer, progress)
        })
    }

    fn drain(
        &self,
        results: Receiver<Result<(&str, TermVector)>>,
        writer: &mut InvertedIndexWriter,
        progress: &mut ProgressMeter,
    ) -> Result<()> {
        for result in results.iter() {
            self.check_cancelled(progress)?;
            let (term, vector) = result?;
            writer.put(term, &vector)?;
            progress.next(term);
        }
        self.check_cancelled(progress)?;
        if progress.processed() < progress.total() {
            return Err(EsaError::sink_write(format!(
                "inverted index truncated after {} of {} terms",
                progress.processed(),
                progress.total()
            )));
        }
        Ok(())
    }
}
