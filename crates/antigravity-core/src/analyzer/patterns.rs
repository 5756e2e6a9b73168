//! Lexical tables and candidate-term patterns for the deterministic analyzer.
//!
//! Everything here is fixed at compile time so that analysis is reproducible.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Hyphenated compounds: `solid-state`, `lithium-ion`, `CRISPR-Cas9`
    pub static ref HYPHENATED_PATTERN: Regex = Regex::new(
        r"\b[A-Za-z][A-Za-z0-9]*(?:-[A-Za-z0-9]+)+\b"
    ).unwrap();

    /// Acronyms: two or more uppercase letters or digits, starting with a letter
    pub static ref ACRONYM_PATTERN: Regex = Regex::new(
        r"\b[A-Z][A-Z0-9]+\b"
    ).unwrap();

    /// Capitalized words and runs of capitalized words on one line
    pub static ref CAPITALIZED_PATTERN: Regex = Regex::new(
        r"\b[A-Z][a-z][A-Za-z0-9]*(?:[ \t]+[A-Z][a-z][A-Za-z0-9]*)*\b"
    ).unwrap();

    /// Word runs, the unit term matching works on
    pub static ref WORD_PATTERN: Regex = Regex::new(r"\w+").unwrap();
}

/// Function words. Discarded when they open or close a capitalized phrase
/// and never kept as terms on their own.
pub const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "also", "an", "and", "any", "are", "as",
    "at", "be", "been", "before", "below", "both", "but", "by", "can", "could", "did", "do",
    "does", "down", "during", "each", "every", "few", "for", "from", "further", "had", "has",
    "have", "he", "hence", "her", "here", "him", "his", "how", "however", "if", "in", "into",
    "is", "it", "its", "just", "may", "might", "more", "most", "must", "need", "no", "not",
    "now", "of", "off", "on", "once", "only", "or", "other", "our", "out", "over", "shall",
    "she", "should", "so", "some", "such", "than", "that", "the", "their", "them", "then",
    "there", "therefore", "these", "they", "this", "those", "through", "thus", "to", "too",
    "under", "up", "us", "very", "was", "we", "were", "what", "when", "where", "which", "who",
    "whom", "whose", "why", "will", "with", "would", "you", "your",
];

/// Generic vocabulary of patents and papers. Terms made only of these
/// words are `common_domain`.
pub const DOMAIN_STOPWORDS: &[&str] = &[
    "abstract", "apparatus", "application", "applications", "art", "background", "claim",
    "claims", "component", "components", "conclusion", "data", "device", "devices",
    "embodiment", "embodiments", "example", "examples", "field", "figure", "figures",
    "information", "introduction", "invention", "material", "materials", "paper", "patent",
    "performance", "present", "prior", "problem", "related", "research", "result", "results",
    "solution", "structure", "study", "summary", "table", "technology", "unit", "user",
    "users",
];

/// Words that name a method or process regardless of suffix.
pub const METHODOLOGICAL_KEYWORDS: &[&str] = &[
    "algorithm", "analysis", "approach", "architecture", "classification", "clustering",
    "design", "detection", "evaluation", "extraction", "framework", "generation",
    "implementation", "inference", "learning", "method", "model", "optimization",
    "postprocessing", "preprocessing", "procedure", "process", "recognition", "regression",
    "segmentation", "synthesis", "system", "technique", "testing", "training",
    "transformation", "validation",
];

/// Verb and process suffixes that mark a term as methodological.
pub const METHODOLOGICAL_SUFFIXES: &[&str] = &[
    "ization", "ing", "tion", "sion", "ment", "ize", "ise", "ysis", "ology",
];

/// Check whether a word is a function word.
pub fn is_stopword(word: &str) -> bool {
    contains_ignore_case(STOPWORDS, word)
}

/// Check whether a word is generic domain vocabulary.
pub fn is_domain_stopword(word: &str) -> bool {
    contains_ignore_case(DOMAIN_STOPWORDS, word)
}

/// Check whether a word names a method by keyword or suffix.
///
/// Suffixes only count when something is left in front of them, so that
/// `ring` or `thing` stay plain words.
pub fn is_methodological_word(word: &str) -> bool {
    let lower = word.to_lowercase();
    if METHODOLOGICAL_KEYWORDS.contains(&lower.as_str()) {
        return true;
    }
    METHODOLOGICAL_SUFFIXES
        .iter()
        .any(|suffix| lower.len() >= suffix.len() + 3 && lower.ends_with(suffix))
}

fn contains_ignore_case(table: &[&str], word: &str) -> bool {
    let lower = word.to_lowercase();
    table.contains(&lower.as_str())
}
