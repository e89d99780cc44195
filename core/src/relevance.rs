use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ALPHABETIC: Regex = Regex::new(r"^[a-zA-Z]*$").expect("valid regex");
}

pub const MIN_TERM_LENGTH: usize = 3;

/// True if the token is made of ASCII letters only and is at least three characters long.
pub fn is_relevant(token: &str) -> bool {
    token.len() >= MIN_TERM_LENGTH && ALPHABETIC.is_match(token)
}

/// Keeps the relevant tokens of a concept, repetitions included.
///
/// Returns `None` when no more than `min_terms_per_document` tokens survive;
/// such a concept does not enter the forward index.
pub fn admit_concept<S: AsRef<str>>(tokens: &[S], min_terms_per_document: usize) -> Option<Vec<&str>> {
    let kept: Vec<&str> = tokens
        .iter()
        .map(|t| t.as_ref())
        .filter(|t| is_relevant(t))
        .collect();
    if kept.len() > min_terms_per_document {
        Some(kept)
    } else {
        None
    }
}
