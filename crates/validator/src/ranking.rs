//! Ranking-question classification
//!
//! A lexical cue in the originating question (superlative phrasing, top-N
//! wording) marks the request as "ranking"; such queries should carry an
//! `ORDER BY` or the results are arbitrary.

const RANKING_CUES: &[&str] = &[
    "top",
    "most",
    "highest",
    "lowest",
    "best",
    "worst",
    "largest",
    "smallest",
    "biggest",
    "maximum",
    "minimum",
    "leading",
    "rank",
    "ranking",
];

/// Whether the question's phrasing requests a ranked answer.
pub fn is_ranking_question(question: &str) -> bool {
    question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| RANKING_CUES.contains(&word))
}
