use esa_core::config::ForwardConfig;
use esa_core::forward::ForwardIndexBuilder;
use esa_core::invert::IndexInverter;
use esa_core::persist::{is_complete, InvertedIndexReader};
use esa_core::source::{ForwardIndexStore, TantivyForwardIndex};
use esa_core::vocabulary::VocabularyFilter;
use esa_core::weighting::WeightingScheme;
use esa_core::{EsaConfig, EsaError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tempfile::tempdir;

/// Maps a number to a purely alphabetic word so it survives the relevance filter.
fn word(prefix: &str, mut n: usize) -> String {
    let mut s = prefix.to_string();
    loop {
        s.push((b'a' + (n % 26) as u8) as char);
        n /= 26;
        if n == 0 {
            break;
        }
    }
    s
}

/// 100 concepts, each with 60 occurrences of its own word plus marker terms:
/// `twoterm` in 2 concepts, `threeterm` in 3, `nineterm` in 9, `tenterm` in 10
/// and `everyterm` in all of them.
fn corpus() -> Vec<(String, Vec<String>)> {
    let markers = [("twoterm", 2), ("threeterm", 3), ("nineterm", 9), ("tenterm", 10), ("everyterm", 100)];
    (0..100)
        .map(|i| {
            let mut tokens = vec![word("own", i); 60];
            for (marker, df) in markers {
                if i < df {
                    tokens.push(marker.to_string());
                    if i % 2 == 0 {
                        tokens.push(marker.to_string());
                    }
                }
            }
            // noise removed by the relevance filter
            tokens.extend(["42".to_string(), "ab".to_string(), "x1y".to_string()]);
            (word("Title", i), tokens)
        })
        .collect()
}

fn build_forward(path: &Path, concepts: &[(String, Vec<String>)]) {
    let mut builder = ForwardIndexBuilder::initialize(path, &ForwardConfig::default()).unwrap();
    for (title, tokens) in concepts {
        builder.add_concept(title, tokens);
    }
    builder.finalize().unwrap();
}

fn occurrences(concepts: &[(String, Vec<String>)]) -> BTreeMap<String, BTreeSet<String>> {
    let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (title, tokens) in concepts {
        for t in tokens {
            map.entry(t.clone()).or_default().insert(title.clone());
        }
    }
    map
}

#[test]
fn hundred_concept_scenario_end_to_end() {
    let dir = tempdir().unwrap();
    let forward = dir.path().join("forward");
    let esa = dir.path().join("esa");
    let concepts = corpus();
    build_forward(&forward, &concepts);

    let inverter = IndexInverter::from_config(&EsaConfig::default()).unwrap();
    let report = inverter.invert_dir(&forward, &esa, WeightingScheme::default()).unwrap();
    assert_eq!(report.concept_count, 100);
    // 100 own words + 5 markers; noise never reached the index
    assert_eq!(report.total_term_count, 105);
    assert_eq!(report.retained_term_count, 2);

    let reader = InvertedIndexReader::open(&esa).unwrap();
    assert_eq!(reader.concept_count(), 100);
    let terms: BTreeSet<String> = reader.terms().collect::<Result<_>>().unwrap();
    assert_eq!(terms, ["nineterm", "threeterm"].iter().map(|s| s.to_string()).collect());
    for absent in ["twoterm", "tenterm", "everyterm", "owna", "42"] {
        assert!(reader.get(absent).unwrap().is_none(), "{absent} should be pruned");
    }
}

#[test]
fn retained_vectors_cover_exactly_the_concepts_containing_the_term() {
    let dir = tempdir().unwrap();
    let forward = dir.path().join("forward");
    let esa = dir.path().join("esa");
    let concepts = corpus();
    build_forward(&forward, &concepts);

    let inverter = IndexInverter::new(VocabularyFilter::new(0, 1.0).unwrap()).with_workers(3);
    let report = inverter.invert_dir(&forward, &esa, WeightingScheme::default()).unwrap();
    // only `everyterm` (df == concept count) is excluded
    assert_eq!(report.retained_term_count, 104);

    let expected = occurrences(&concepts);
    let reader = InvertedIndexReader::open(&esa).unwrap();
    for term in reader.terms() {
        let term = term.unwrap();
        let vector = reader.get(&term).unwrap().unwrap();
        assert!(vector.len() as u32 <= reader.concept_count());
        let titles: BTreeSet<String> = vector
            .concept_ids()
            .map(|id| reader.concept_title(id).unwrap().to_string())
            .collect();
        assert_eq!(&titles, &expected[&term], "concepts of {term}");
        assert!(vector.postings().iter().all(|p| p.weight > 0.0));
    }

    // more occurrences weigh more: even-numbered concepts carry `threeterm` twice
    let three = reader.get("threeterm").unwrap().unwrap();
    let by_title: BTreeMap<&str, f32> = three
        .postings()
        .iter()
        .map(|p| (reader.concept_title(p.concept_id).unwrap(), p.weight))
        .collect();
    assert!(by_title[word("Title", 0).as_str()] > by_title[word("Title", 1).as_str()]);
}

#[test]
fn inversion_is_idempotent() {
    let dir = tempdir().unwrap();
    let forward = dir.path().join("forward");
    build_forward(&forward, &corpus());
    let inverter = IndexInverter::new(VocabularyFilter::new(1, 0.5).unwrap()).with_workers(4);

    let first = dir.path().join("first");
    let second = dir.path().join("second");
    let a = inverter.invert_dir(&forward, &first, WeightingScheme::default()).unwrap();
    let b = inverter.invert_dir(&forward, &second, WeightingScheme::default()).unwrap();
    assert_eq!(a, b);

    let ra = InvertedIndexReader::open(&first).unwrap();
    let rb = InvertedIndexReader::open(&second).unwrap();
    let ta: Vec<String> = ra.terms().collect::<Result<_>>().unwrap();
    let tb: Vec<String> = rb.terms().collect::<Result<_>>().unwrap();
    assert_eq!(ta, tb);
    for term in &ta {
        let va = ra.get(term).unwrap().unwrap();
        let vb = rb.get(term).unwrap().unwrap();
        assert!(va.approx_eq(&vb, 1e-6), "{term}");
    }
}

#[test]
fn concepts_at_the_threshold_are_dropped() {
    let dir = tempdir().unwrap();
    let mut builder = ForwardIndexBuilder::initialize(dir.path(), &ForwardConfig::default()).unwrap();
    let mut fifty = vec!["alpha".to_string(); 50];
    fifty.extend(["2024".to_string(), "is".to_string()]);
    let fifty_one = vec!["alpha".to_string(); 51];
    assert!(!builder.add_concept("Fifty", &fifty));
    assert!(builder.add_concept("FiftyOne", &fifty_one));
    let stats = builder.finalize().unwrap();
    assert_eq!((stats.admitted, stats.dropped), (1, 1));

    let store = TantivyForwardIndex::open(dir.path(), WeightingScheme::default()).unwrap();
    assert_eq!(store.total_concept_count(), 1);
    assert_eq!(store.concept_titles().unwrap(), vec!["FiftyOne"]);
    let alpha = store.weight_vector("alpha").unwrap();
    assert_eq!(alpha.len(), 0, "a term in every concept weighs nothing without smoothing");
    let smoothed = TantivyForwardIndex::open(dir.path(), WeightingScheme { smoothed_idf: true }).unwrap();
    assert_eq!(smoothed.weight_vector("alpha").unwrap().len(), 1);
}

#[test]
fn zero_distribution_writes_an_empty_but_complete_store() {
    let dir = tempdir().unwrap();
    let forward = dir.path().join("forward");
    let esa = dir.path().join("esa");
    build_forward(&forward, &corpus());
    let inverter = IndexInverter::new(VocabularyFilter::new(0, 0.0).unwrap());
    let report = inverter.invert_dir(&forward, &esa, WeightingScheme::default()).unwrap();
    assert_eq!(report.retained_term_count, 0);
    assert!(is_complete(&esa));
    assert!(InvertedIndexReader::open(&esa).unwrap().is_empty());
}

#[test]
fn missing_forward_index_is_reported() {
    let dir = tempdir().unwrap();
    let inverter = IndexInverter::new(VocabularyFilter::default());
    let res = inverter.invert_dir(&dir.path().join("missing"), &dir.path().join("esa"), WeightingScheme::default());
    assert!(matches!(res, Err(EsaError::SourceIndexUnavailable { .. })));
    assert!(!is_complete(dir.path().join("esa")));
}

#[test]
fn target_under_a_regular_file_is_a_sink_failure() {
    let dir = tempdir().unwrap();
    let forward = dir.path().join("forward");
    build_forward(&forward, &corpus());
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, "occupied").unwrap();
    let target = blocker.join("esa");

    let inverter = IndexInverter::new(VocabularyFilter::default()).with_workers(2);
    let res = inverter.invert_dir(&forward, &target, WeightingScheme::default());
    assert!(matches!(res, Err(EsaError::SinkWrite(_))), "{res:?}");

    let source = TantivyForwardIndex::open(&forward, WeightingScheme::default()).unwrap();
    let res = inverter.invert(&source, &target);
    assert!(matches!(res, Err(EsaError::SinkWrite(_))), "{res:?}");
    assert!(blocker.is_file());
}

#[test]
fn invalid_configuration_is_rejected_before_io() {
    let mut config = EsaConfig::default();
    config.vocabulary.max_corpus_distribution = 1.5;
    assert!(matches!(IndexInverter::from_config(&config), Err(EsaError::InvalidConfiguration(_))));
    config.vocabulary.max_corpus_distribution = 0.1;
    config.vocabulary.min_document_frequency = -1;
    assert!(matches!(IndexInverter::from_config(&config), Err(EsaError::InvalidConfiguration(_))));
}
