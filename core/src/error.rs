use std::path::PathBuf;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum EsaError {
    #[error("cannot initialize index at {path}: {source}")]
    Initialization {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("cannot commit forward index: {0}")]
    Commit(#[source] BoxError),
    #[error("forward index at {path} is unavailable: {source}")]
    SourceIndexUnavailable {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("cannot read forward index: {0}")]
    SourceRead(#[source] BoxError),
    #[error("cannot write inverted index: {0}")]
    SinkWrite(#[source] BoxError),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("inverted index at {path} is unavailable: {source}")]
    InvertedIndexUnavailable {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("inverted index at {path} is incomplete (no completion marker)")]
    IncompleteIndex { path: PathBuf },
    #[error("inversion cancelled after {processed} of {total} terms")]
    Cancelled { processed: usize, total: usize },
}

impl EsaError {
    pub fn initialization(path: impl Into<PathBuf>, err: impl Into<BoxError>) -> Self {
        EsaError::Initialization { path: path.into(), source: err.into() }
    }

    pub fn commit(err: impl Into<BoxError>) -> Self {
        EsaError::Commit(err.into())
    }

    pub fn source_unavailable(path: impl Into<PathBuf>, err: impl Into<BoxError>) -> Self {
        EsaError::SourceIndexUnavailable { path: path.into(), source: err.into() }
    }

    pub fn source_read(err: impl Into<BoxError>) -> Self {
        EsaError::SourceRead(err.into())
    }

    pub fn sink_write(err: impl Into<BoxError>) -> Self {
        EsaError::SinkWrite(err.into())
    }

    pub fn index_unavailable(path: impl Into<PathBuf>, err: impl Into<BoxError>) -> Self {
        EsaError::InvertedIndexUnavailable { path: path.into(), source: err.into() }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        EsaError::InvalidConfiguration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EsaError>;
