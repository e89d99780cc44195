//! On-disk inverted index.
//!
//! Layout under the index root:
//! - `vectors/`      sled tree, term bytes -> bincode `TermVector`
//! - `concepts.bin`  bincode `Vec<String>`, concept titles by `ConceptId`
//! - `meta.json`     written last; its presence marks a complete index

use crate::config::EsaConfig;
use crate::error::{EsaError, Result};
use crate::{ConceptId, TermVector};
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

const META_TREE: &str = "meta";
const CONCEPT_COUNT_KEY: &[u8] = b"concept_count";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub concept_count: u32,
    /// Number of term vectors stored.
    pub term_count: usize,
    /// Number of distinct terms in the forward index before pruning.
    pub total_term_count: usize,
    pub created_at: String,
    pub version: u32,
    #[serde(default)]
    pub settings: Option<EsaConfig>,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn vectors(&self) -> PathBuf { self.root.join("vectors") }
    fn concepts(&self) -> PathBuf { self.root.join("concepts.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    fn meta_tmp(&self) -> PathBuf { self.root.join("meta.json.tmp") }
}

/// Removes `path` (file or directory) if present and recreates it as an empty directory.
pub(crate) fn reset_dir(path: &Path) -> io::Result<()> {
    if path.is_file() {
        fs::remove_file(path)?;
    }
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    create_dir_all(path)
}

/// Write side of the inverted index. Owned by a single writer.
pub struct InvertedIndexWriter {
    paths: IndexPaths,
    db: sled::Db,
    concept_count: u32,
    written: usize,
}

impl InvertedIndexWriter {
    pub fn create<P: AsRef<Path>>(root: P, concept_count: u32) -> Result<Self> {
        let paths = IndexPaths::new(root);
        create_dir_all(&paths.root).map_err(EsaError::sink_write)?;
        // A leftover marker would make a partial rebuild look complete.
        match fs::remove_file(paths.meta()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(EsaError::sink_write(e)),
        }

        let db = sled::open(paths.vectors()).map_err(EsaError::sink_write)?;
        db.open_tree(META_TREE)
            .and_then(|meta| meta.insert(CONCEPT_COUNT_KEY, concept_count.to_be_bytes().to_vec()))
            .map_err(EsaError::sink_write)?;
        Ok(Self { paths, db, concept_count, written: 0 })
    }

    pub fn concept_count(&self) -> u32 {
        self.concept_count
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Stores the vector of `term`. Each term must be put at most once per build.
    pub fn put(&mut self, term: &str, vector: &TermVector) -> Result<()> {
        let bytes = bincode::serialize(vector).map_err(EsaError::sink_write)?;
        self.db.insert(term.as_bytes(), bytes).map_err(EsaError::sink_write)?;
        self.written += 1;
        Ok(())
    }

    pub fn save_concepts(&mut self, titles: &[String]) -> Result<()> {
        let bytes = bincode::serialize(titles).map_err(EsaError::sink_write)?;
        let mut f = File::create(self.paths.concepts()).map_err(EsaError::sink_write)?;
        f.write_all(&bytes).map_err(EsaError::sink_write)?;
        f.sync_all().map_err(EsaError::sink_write)?;
        Ok(())
    }

    /// Flushes the store and writes the completion marker.
    pub fn close(self, total_term_count: usize, settings: Option<&EsaConfig>) -> Result<MetaFile> {
        let InvertedIndexWriter { paths, db, concept_count, written } = self;
        db.flush().map_err(EsaError::sink_write)?;
        drop(db);

        let meta = MetaFile {
            concept_count,
            term_count: written,
            total_term_count,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "".into()),
            version: FORMAT_VERSION,
            settings: settings.cloned(),
        };
        save_meta(&paths, &meta)?;
        Ok(meta)
    }
}

fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let json = serde_json::to_string_pretty(meta).map_err(EsaError::sink_write)?;
    let tmp = paths.meta_tmp();
    let mut f = File::create(&tmp).map_err(EsaError::sink_write)?;
    f.write_all(json.as_bytes()).map_err(EsaError::sink_write)?;
    f.sync_all().map_err(EsaError::sink_write)?;
    fs::rename(&tmp, paths.meta()).map_err(EsaError::sink_write)?;
    Ok(())
}

pub fn load_meta<P: AsRef<Path>>(root: P) -> Result<MetaFile> {
    let paths = IndexPaths::new(root);
    let mut f = match File::open(paths.meta()) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EsaError::IncompleteIndex { path: paths.root })
        }
        Err(e) => return Err(EsaError::index_unavailable(&paths.root, e)),
    };
    let mut buf = String::new();
    f.read_to_string(&mut buf).map_err(|e| EsaError::index_unavailable(&paths.root, e))?;
    serde_json::from_str(&buf).map_err(|e| EsaError::index_unavailable(&paths.root, e))
}

/// True if `root` holds an inverted index whose build ran to completion.
pub fn is_complete<P: AsRef<Path>>(root: P) -> bool {
    IndexPaths::new(root).meta().is_file()
}

/// Read side of a completed inverted index.
pub struct InvertedIndexReader {
    root: PathBuf,
    db: sled::Db,
    meta: MetaFile,
    concepts: Vec<String>,
}

impl InvertedIndexReader {
    /// Opens a completed index. Fails with `IncompleteIndex` if the build never closed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let meta = load_meta(root)?;
        let paths = IndexPaths::new(root);
        let concepts = load_concepts(&paths)?;
        let db = sled::open(paths.vectors()).map_err(|e| EsaError::index_unavailable(root, e))?;
        Ok(Self { root: root.to_path_buf(), db, meta, concepts })
    }

    pub fn get(&self, term: &str) -> Result<Option<TermVector>> {
        let Some(bytes) = self
            .db
            .get(term.as_bytes())
            .map_err(|e| EsaError::index_unavailable(&self.root, e))?
        else {
            return Ok(None);
        };
        let vector = bincode::deserialize(&bytes).map_err(|e| EsaError::index_unavailable(&self.root, e))?;
        Ok(Some(vector))
    }

    pub fn concept_count(&self) -> u32 {
        self.meta.concept_count
    }

    /// Number of stored term vectors.
    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Stored terms in byte order.
    pub fn terms(&self) -> impl Iterator<Item = Result<String>> + '_ {
        self.db.iter().keys().map(move |key| {
            let key = key.map_err(|e| EsaError::index_unavailable(&self.root, e))?;
            String::from_utf8(key.to_vec()).map_err(|e| EsaError::index_unavailable(&self.root, e))
        })
    }

    pub fn concept_title(&self, concept_id: ConceptId) -> Option<&str> {
        self.concepts.get(concept_id as usize).map(String::as_str)
    }

    pub fn concept_titles(&self) -> &[String] {
        &self.concepts
    }

    pub fn meta(&self) -> &MetaFile {
        &self.meta
    }
}

fn load_concepts(paths: &IndexPaths) -> Result<Vec<String>> {
    let mut f = match File::open(paths.concepts()) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(EsaError::index_unavailable(&paths.root, e)),
    };
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).map_err(|e| EsaError::index_unavailable(&paths.root, e))?;
    bincode::deserialize(&buf).map_err(|e| EsaError::index_unavailable(&paths.root, e))
}
