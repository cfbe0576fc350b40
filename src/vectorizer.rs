use crate::stopwords::is_stop_word;
use log::debug;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};

pub const DEFAULT_MAX_FEATURES: usize = 5000;

/// One sparse row: column indices in ascending order with their weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl FeatureRow {
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    /// Dot product of two rows; both index lists are sorted.
    pub fn dot(&self, other: &FeatureRow) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0f32;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    pub fn dot_dense(&self, dense: &[f32]) -> f32 {
        self.indices
            .iter()
            .zip(&self.values)
            .map(|(&idx, &value)| dense.get(idx as usize).copied().unwrap_or(0.0) * value)
            .sum()
    }
}

/// Row-aligned TF-IDF features for a whole catalog.
#[derive(Debug, Clone, Default)]
pub struct FeatureMatrix {
    rows: Vec<FeatureRow>,
    dims: usize,
}

impl FeatureMatrix {
    pub fn new(rows: Vec<FeatureRow>, dims: usize) -> Self {
        Self { rows, dims }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn row(&self, index: usize) -> &FeatureRow {
        &self.rows[index]
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    /// Element-wise mean of the selected rows as a dense vector.
    pub fn mean_of(&self, row_indices: &[usize]) -> Vec<f32> {
        let mut mean = vec![0.0f32; self.dims];
        if row_indices.is_empty() {
            return mean;
        }
        for &row in row_indices {
            let row = &self.rows[row];
            for (&idx, &value) in row.indices.iter().zip(&row.values) {
                mean[idx as usize] += value;
            }
        }
        let count = row_indices.len() as f32;
        for value in mean.iter_mut() {
            *value /= count;
        }
        mean
    }
}

/// TF-IDF vectorizer with a frequency-bounded vocabulary and English stop words removed.
#[derive(Debug, Clone)]
pub struct Vectorizer {
    max_features: usize,
    vocabulary: HashMap<String, u32>,
    idf: Vec<f32>,
}

impl Default for Vectorizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FEATURES)
    }
}

impl Vectorizer {
    pub fn new(max_features: usize) -> Self {
        Self {
            max_features,
            vocabulary: HashMap::new(),
            idf: Vec::new(),
        }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn fit_transform<S: AsRef<str> + Sync>(&mut self, documents: &[S]) -> FeatureMatrix {
        let tokenized: Vec<Vec<String>> = documents
            .par_iter()
            .map(|doc| tokenize(doc.as_ref()))
            .collect();
        self.fit_tokens(&tokenized);

        let rows = tokenized
            .par_iter()
            .map(|tokens| self.weigh(tokens))
            .collect();
        FeatureMatrix::new(rows, self.vocabulary.len())
    }

    fn fit_tokens(&mut self, tokenized: &[Vec<String>]) {
        let n_docs = tokenized.len();
        // BTreeMap keeps terms sorted, so the stable sort below breaks count ties alphabetically.
        let mut term_counts: BTreeMap<&str, usize> = BTreeMap::new();
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();

        for tokens in tokenized {
            let mut seen: HashSet<&str> = HashSet::new();
            for token in tokens {
                *term_counts.entry(token.as_str()).or_default() += 1;
                if seen.insert(token.as_str()) {
                    *doc_freq.entry(token.as_str()).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(self.max_features);

        let mut kept: Vec<&str> = ranked.into_iter().map(|(term, _)| term).collect();
        kept.sort_unstable();

        self.vocabulary = kept
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.to_string(), idx as u32))
            .collect();
        self.idf = kept
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f32;
                ((1.0 + n_docs as f32) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        debug!(
            "Fitted vocabulary of {} terms over {} documents",
            self.vocabulary.len(),
            n_docs
        );
    }

    fn weigh(&self, tokens: &[String]) -> FeatureRow {
        let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
        for token in tokens {
            if let Some(&idx) = self.vocabulary.get(token) {
                *counts.entry(idx).or_default() += 1.0;
            }
        }

        let mut row = FeatureRow {
            indices: Vec::with_capacity(counts.len()),
            values: Vec::with_capacity(counts.len()),
        };
        for (idx, count) in counts {
            row.indices.push(idx);
            row.values.push(count * self.idf[idx as usize]);
        }

        let norm = row.norm();
        if norm > 0.0 {
            for value in row.values.iter_mut() {
                *value /= norm;
            }
        }
        row
    }
}

/// Lowercased runs of two or more word characters, stop words removed.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| w.chars().count() >= 2)
        .filter(|w| !is_stop_word(w))
        .map(String::from)
        .collect()
}
