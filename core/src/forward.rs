use crate::config::ForwardConfig;
use crate::error::{EsaError, Result};
use crate::persist::reset_dir;
use crate::relevance::admit_concept;
use std::path::{Path, PathBuf};
use tantivy::schema::*;
use tantivy::{Index, IndexWriter, TantivyDocument};

/// Field holding one untokenized value per term occurrence.
pub const FIELD_TOKEN: &str = "token";
/// Field holding the concept title.
pub const FIELD_ID: &str = "id";

/// Schema of the forward index: repeated raw `token` values carry term
/// frequency, `id` stores the concept title.
pub fn schema() -> Schema {
    let mut builder = Schema::builder();
    let token_indexing = TextFieldIndexing::default()
        .set_tokenizer("raw")
        .set_index_option(IndexRecordOption::WithFreqs);
    builder.add_text_field(FIELD_TOKEN, TextOptions::default().set_indexing_options(token_indexing));
    builder.add_text_field(FIELD_ID, STRING | STORED);
    builder.build()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub admitted: usize,
    pub dropped: usize,
    /// Concepts that passed the filter but could not be written.
    pub failed: usize,
}

/// Writes concepts into a fresh tantivy index.
pub struct ForwardIndexBuilder {
    path: PathBuf,
    writer: IndexWriter,
    token_field: Field,
    id_field: Field,
    min_terms_per_document: usize,
    stats: BuildStats,
}

impl ForwardIndexBuilder {
    /// Deletes whatever lives at `path` and creates an empty index there.
    pub fn initialize<P: AsRef<Path>>(path: P, config: &ForwardConfig) -> Result<Self> {
        let path = path.as_ref();
        reset_dir(path).map_err(|e| EsaError::initialization(path, e))?;

        let schema = schema();
        let index =
            Index::create_in_dir(path, schema.clone()).map_err(|e| EsaError::initialization(path, e))?;
        // One indexing thread keeps concept ids in insertion order.
        let writer: IndexWriter = index
            .writer_with_num_threads(1, config.writer_memory_budget)
            .map_err(|e| EsaError::initialization(path, e))?;
        let token_field = schema.get_field(FIELD_TOKEN).map_err(|e| EsaError::initialization(path, e))?;
        let id_field = schema.get_field(FIELD_ID).map_err(|e| EsaError::initialization(path, e))?;

        tracing::info!(path = %path.display(), "forward index initialized");
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            token_field,
            id_field,
            min_terms_per_document: config.min_terms_per_document,
            stats: BuildStats::default(),
        })
    }

    /// Indexes a concept if it has enough relevant tokens.
    ///
    /// Returns whether the concept was admitted. Short concepts are dropped
    /// silently and a concept that fails to be written is logged and skipped.
    pub fn add_concept<S: AsRef<str>>(&mut self, title: &str, tokens: &[S]) -> bool {
        let Some(kept) = admit_concept(tokens, self.min_terms_per_document) else {
            self.stats.dropped += 1;
            tracing::debug!(title, "concept dropped: too few relevant terms");
            return false;
        };

        let mut doc = TantivyDocument::default();
        for term in &kept {
            doc.add_text(self.token_field, term);
        }
        doc.add_text(self.id_field, title);

        match self.writer.add_document(doc) {
            Ok(_) => {
                self.stats.admitted += 1;
                true
            }
            Err(e) => {
                self.stats.failed += 1;
                tracing::warn!(title, error = %e, "failed to index concept, skipping");
                false
            }
        }
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    /// Commits and closes the index. It is read-only from here on.
    pub fn finalize(self) -> Result<BuildStats> {
        let ForwardIndexBuilder { path, mut writer, stats, .. } = self;
        writer.commit().map_err(EsaError::commit)?;
        writer.wait_merging_threads().map_err(EsaError::commit)?;
        tracing::info!(
            path = %path.display(),
            admitted = stats.admitted,
            dropped = stats.dropped,
            failed = stats.failed,
            "forward index committed"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_terms: usize) -> ForwardConfig {
        ForwardConfig { min_terms_per_document: min_terms, ..ForwardConfig::default() }
    }

    #[test]
    fn initialize_clears_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("forward");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("stale.txt"), "old").unwrap();

        let builder = ForwardIndexBuilder::initialize(&target, &config(0)).unwrap();
        assert!(!target.join("stale.txt").exists());
        builder.finalize().unwrap();
    }

    #[test]
    fn counts_admitted_and_dropped_concepts() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = ForwardIndexBuilder::initialize(dir.path().join("fw"), &config(2)).unwrap();
        assert!(!builder.add_concept("Short", &["alpha", "beta"]));
        assert!(!builder.add_concept("Noise", &["alpha", "42", "be", "beta"]));
        assert!(builder.add_concept("Long", &["alpha", "beta", "gamma"]));
        let stats = builder.finalize().unwrap();
        assert_eq!(stats, BuildStats { admitted: 1, dropped: 2, failed: 0 });
    }

    #[test]
    fn initialize_fails_when_path_is_a_file_parent() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let res = ForwardIndexBuilder::initialize(blocker.join("fw"), &config(0));
        assert!(matches!(res, Err(EsaError::Initialization { .. })));
    }
}
