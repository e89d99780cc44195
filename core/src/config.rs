use crate::error::{EsaError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// A concept is admitted only if it keeps strictly more relevant tokens than this.
    pub min_terms_per_document: usize,
    /// Memory budget handed to the forward index writer, in bytes.
    pub writer_memory_budget: usize,
    /// Snowball language used when the CLI analyses raw text.
    pub language: String,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            min_terms_per_document: 50,
            writer_memory_budget: 50_000_000,
            language: "english".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    /// Terms found in fewer concepts are dropped. Signed so that bad input is
    /// rejected by validation rather than silently wrapped.
    pub min_document_frequency: i64,
    /// Terms found in this fraction of the corpus or more are dropped. Must be in [0, 1].
    pub max_corpus_distribution: f64,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self { min_document_frequency: 3, max_corpus_distribution: 0.1 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightingConfig {
    /// Use ln(1 + N/df) instead of ln(N/df).
    pub smoothed_idf: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InversionConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for InversionConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self { workers, queue_capacity: 1024 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EsaConfig {
    pub forward: ForwardConfig,
    pub vocabulary: VocabularyConfig,
    pub weighting: WeightingConfig,
    pub inversion: InversionConfig,
}

impl EsaConfig {
    /// Loads a JSON config file and validates it before returning.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            EsaError::invalid_config(format!("cannot open {}: {e}", path.display()))
        })?;
        let config: EsaConfig = serde_json::from_reader(BufReader::new(f)).map_err(|e| {
            EsaError::invalid_config(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.vocabulary.validate()?;
        if self.inversion.workers == 0 {
            return Err(EsaError::invalid_config("inversion.workers must be at least 1"));
        }
        if self.inversion.queue_capacity == 0 {
            return Err(EsaError::invalid_config("inversion.queue_capacity must be at least 1"));
        }
        Ok(())
    }
}

impl VocabularyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_document_frequency < 0 || self.min_document_frequency > u32::MAX as i64 {
            return Err(EsaError::invalid_config(format!(
                "min_document_frequency must be in [0, {}], got {}",
                u32::MAX,
                self.min_document_frequency
            )));
        }
        if !(0.0..=1.0).contains(&self.max_corpus_distribution) {
            return Err(EsaError::invalid_config(format!(
                "max_corpus_distribution must be in [0, 1], got {}",
                self.max_corpus_distribution
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_thresholds() {
        let c = EsaConfig::default();
        assert_eq!(c.forward.min_terms_per_document, 50);
        assert_eq!(c.vocabulary.min_document_frequency, 3);
        assert_eq!(c.vocabulary.max_corpus_distribution, 0.1);
        assert!(!c.weighting.smoothed_idf);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let c: EsaConfig =
            serde_json::from_str(r#"{"vocabulary": {"max_corpus_distribution": 0.25}}"#).unwrap();
        assert_eq!(c.vocabulary.max_corpus_distribution, 0.25);
        assert_eq!(c.vocabulary.min_document_frequency, 3);
        assert_eq!(c.forward.min_terms_per_document, 50);
    }

    #[test]
    fn rejects_out_of_domain_thresholds() {
        let mut c = EsaConfig::default();
        c.vocabulary.max_corpus_distribution = 1.5;
        assert!(matches!(c.validate(), Err(EsaError::InvalidConfiguration(_))));

        let mut c = EsaConfig::default();
        c.vocabulary.min_document_frequency = -1;
        assert!(matches!(c.validate(), Err(EsaError::InvalidConfiguration(_))));

        let mut c = EsaConfig::default();
        c.vocabulary.max_corpus_distribution = f64::NAN;
        assert!(c.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("esa.json");
        std::fs::write(&path, r#"{"forward": {"min_terms_per_document": 10}}"#).unwrap();
        let c = EsaConfig::from_json_file(&path).unwrap();
        assert_eq!(c.forward.min_terms_per_document, 10);

        std::fs::write(&path, r#"{"vocabulary": {"min_document_frequency": -4}}"#).unwrap();
        assert!(matches!(
            EsaConfig::from_json_file(&path),
            Err(EsaError::InvalidConfiguration(_))
        ));
    }
}
