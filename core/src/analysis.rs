use crate::error::{EsaError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"(?u)[\p{L}\p{N}]+").expect("valid regex");
}

/// Produces the lower-cased stem stream that feeds the forward index.
///
/// Text is NFKC-normalized, lower-cased, split on anything that is not a
/// letter or digit and stemmed. No tokens are removed here; dropping numbers,
/// short stems and non-ASCII words is the relevance filter's job.
pub struct Analyzer {
    stemmer: Stemmer,
}

impl Analyzer {
    pub fn new(algorithm: Algorithm) -> Self {
        Self { stemmer: Stemmer::create(algorithm) }
    }

    /// Looks up a Snowball algorithm by its lower-case English name.
    pub fn for_language(language: &str) -> Result<Self> {
        let algorithm = match language.to_ascii_lowercase().as_str() {
            "arabic" => Algorithm::Arabic,
            "danish" => Algorithm::Danish,
            "dutch" => Algorithm::Dutch,
            "english" => Algorithm::English,
            "finnish" => Algorithm::Finnish,
            "french" => Algorithm::French,
            "german" => Algorithm::German,
            "greek" => Algorithm::Greek,
            "hungarian" => Algorithm::Hungarian,
            "italian" => Algorithm::Italian,
            "norwegian" => Algorithm::Norwegian,
            "portuguese" => Algorithm::Portuguese,
            "romanian" => Algorithm::Romanian,
            "russian" => Algorithm::Russian,
            "spanish" => Algorithm::Spanish,
            "swedish" => Algorithm::Swedish,
            "tamil" => Algorithm::Tamil,
            "turkish" => Algorithm::Turkish,
            other => {
                return Err(EsaError::invalid_config(format!("unsupported language: {other}")))
            }
        };
        Ok(Self::new(algorithm))
    }

    pub fn analyze(&self, text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        WORD.find_iter(&normalized)
            .map(|m| self.stemmer.stem(m.as_str()).into_owned())
            .collect()
    }
}
