//! BM25 lexical scorer.
//!
//! # Algorithm
//!
//! ```ascii
//! score(D, Q) = Σ_{q ∈ distinct(Q)} IDF(q) × f(q,D)×(k1+1) / (f(q,D) + k1×(1-b+b×|D|/avgdl))
//!
//! IDF(q) = ln(1 + (N - n(q) + 0.5) / (n(q) + 0.5))
//!
//! Where:
//! - f(q,D) = term frequency of q in document D
//! - |D|    = document length in tokens
//! - avgdl  = average document length over the snapshot
//! - N      = documents in the snapshot, n(q) = documents containing q
//! ```
//!
//! A query term missing from the whole snapshot still gets an IDF (large,
//! positive) but contributes nothing since its frequency is zero everywhere.
//!
//! # Tokenization
//!
//! Lower-case, then split on anything that is not a Unicode letter or digit.
//! No stemming, no stop words. CJK text becomes one token per run of
//! ideographs, not per word.
//!
//! The scorer is a snapshot of the candidate set it was built from; it is
//! rebuilt for every scoring call and never persisted.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// BM25 tuning parameters.
///
/// | Parameter | Default | Effect |
/// |-----------|---------|--------|
/// | `k1` | 1.5 | Term frequency saturation |
/// | `b` | 0.75 | Length normalization (0 = none, 1 = full) |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// BM25 scorer over an in-memory document snapshot.
///
/// # Example
///
/// ```
/// use edgequake_retrieval::reranker::{Bm25Params, Bm25Scorer};
///
/// let docs = ["the quick brown fox", "a lazy dog sleeps"];
/// let scorer = Bm25Scorer::new(&docs, Bm25Params::default());
/// let scores = scorer.score("quick fox");
/// assert!(scores[0] > scores[1]);
/// ```
#[derive(Debug, Clone)]
pub struct Bm25Scorer {
    params: Bm25Params,
    /// Term counts per document, in input order.
    doc_term_freq: Vec<HashMap<String, usize>>,
    doc_lengths: Vec<usize>,
    /// Number of documents containing each term.
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f64,
}

impl Bm25Scorer {
    /// Build a snapshot of `documents`. O(total tokens).
    pub fn new<S: AsRef<str>>(documents: &[S], params: Bm25Params) -> Self {
        let mut doc_term_freq = Vec::with_capacity(documents.len());
        let mut doc_lengths = Vec::with_capacity(documents.len());

        for doc in documents {
            let terms = tokenize(doc.as_ref());
            doc_lengths.push(terms.len());

            let mut term_freq: HashMap<String, usize> = HashMap::new();
            for term in terms {
                *term_freq.entry(term).or_insert(0) += 1;
            }
            doc_term_freq.push(term_freq);
        }

        let doc_freq = compute_document_frequencies(&doc_term_freq);
        let total_len: usize = doc_lengths.iter().sum();
        let avg_doc_len = if documents.is_empty() {
            0.0
        } else {
            total_len as f64 / documents.len() as f64
        };

        Self {
            params,
            doc_term_freq,
            doc_lengths,
            doc_freq,
            avg_doc_len,
        }
    }

    /// Number of documents in the snapshot.
    pub fn len(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lengths.is_empty()
    }

    /// Raw (unnormalized) BM25 score of every document, in input order.
    pub fn score(&self, query: &str) -> Vec<f64> {
        let mut seen = HashSet::new();
        let query_terms: Vec<String> = tokenize(query)
            .into_iter()
            .filter(|term| seen.insert(term.clone()))
            .collect();

        let n = self.len() as f64;
        let idf: Vec<f64> = query_terms
            .iter()
            .map(|term| {
                let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
                compute_idf_from_df(n, df)
            })
            .collect();

        self.doc_term_freq
            .iter()
            .zip(&self.doc_lengths)
            .map(|(term_freq, &doc_len)| {
                let length_norm =
                    1.0 - self.params.b + self.params.b * (doc_len as f64 / self.avg_doc_len);

                query_terms
                    .iter()
                    .zip(&idf)
                    .filter_map(|(term, idf)| {
                        let tf = *term_freq.get(term)? as f64;
                        let tf_component =
                            (tf * (self.params.k1 + 1.0)) / (tf + self.params.k1 * length_norm);
                        Some(idf * tf_component)
                    })
                    .sum()
            })
            .collect()
    }
}

/// Rescale scores to [0,1] by dividing by the maximum.
///
/// Returns the input unchanged when the maximum is 0. Order and ties are
/// preserved.
pub fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(0.0_f64, f64::max);
    if max == 0.0 {
        return scores.to_vec();
    }
    scores.iter().map(|s| s / max).collect()
}

/// Split text into lower-cased letter/digit runs.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// IDF from a pre-computed document frequency.
#[inline]
pub(crate) fn compute_idf_from_df(n: f64, df: f64) -> f64 {
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

fn compute_document_frequencies(doc_term_freq: &[HashMap<String, usize>]) -> HashMap<String, usize> {
    let mut df_map: HashMap<String, usize> = HashMap::new();
    for term_freq in doc_term_freq {
        for term in term_freq.keys() {
            *df_map.entry(term.clone()).or_insert(0) += 1;
        }
    }
    df_map
}
