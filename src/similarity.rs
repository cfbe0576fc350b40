use crate::vectorizer::{FeatureMatrix, FeatureRow};
use log::info;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub type ProgressCallback = Arc<Mutex<dyn FnMut(usize, usize) + Send>>;

/// Dense n x n cosine similarity matrix, stored row-major.
#[derive(Debug, Clone, Default)]
pub struct SimilarityMatrix {
    size: usize,
    scores: Vec<f32>,
}

impl SimilarityMatrix {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.scores[index * self.size..(index + 1) * self.size]
    }

    #[cfg(test)]
    pub(crate) fn get(&self, i: usize, j: usize) -> f32 {
        self.scores[i * self.size + j]
    }
}

/// Pairwise cosine similarity between every pair of rows.
pub fn matrix(
    features: &FeatureMatrix,
    chunk_rows: usize,
    progress: Option<ProgressCallback>,
) -> SimilarityMatrix {
    let n = features.n_rows();
    if n == 0 {
        return SimilarityMatrix::default();
    }

    let norms: Vec<f32> = features.rows().par_iter().map(FeatureRow::norm).collect();
    let chunk_rows = chunk_rows.clamp(1, n);
    let processed = AtomicUsize::new(0);
    let mut scores = vec![0.0f32; n * n];

    scores
        .par_chunks_mut(n * chunk_rows)
        .enumerate()
        .for_each(|(chunk_index, block)| {
            let first_row = chunk_index * chunk_rows;
            for (offset, out) in block.chunks_mut(n).enumerate() {
                let i = first_row + offset;
                let row_i = features.row(i);
                for (j, slot) in out.iter_mut().enumerate() {
                    *slot = if norms[i] == 0.0 || norms[j] == 0.0 {
                        0.0
                    } else if i == j {
                        1.0
                    } else {
                        row_i.dot(features.row(j)) / (norms[i] * norms[j])
                    };
                }
            }

            if let Some(ref callback) = progress {
                let rows_in_block = block.len() / n;
                let completed = processed.fetch_add(rows_in_block, Ordering::Relaxed) + rows_in_block;
                if let Ok(mut cb) = callback.lock() {
                    cb(completed.min(n), n);
                }
            }
        });

    // Floating-point summation order differs per side; mirror the upper triangle.
    for i in 0..n {
        for j in (i + 1)..n {
            scores[j * n + i] = scores[i * n + j];
        }
    }

    SimilarityMatrix { size: n, scores }
}

/// Cosine similarity between an arbitrary dense vector and every row.
pub fn query(vector: &[f32], features: &FeatureMatrix) -> Vec<f32> {
    let query_norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if query_norm == 0.0 {
        return vec![0.0; features.n_rows()];
    }

    features
        .rows()
        .par_iter()
        .map(|row| {
            if row.is_zero() {
                0.0
            } else {
                row.dot_dense(vector) / (query_norm * row.norm())
            }
        })
        .collect()
}

/// Logs percentage progress in 5% steps.
pub fn logging_progress_callback(activity: &'static str) -> ProgressCallback {
    let mut last_percent: Option<usize> = None;
    Arc::new(Mutex::new(move |completed: usize, total: usize| {
        let percent = if total == 0 {
            100
        } else {
            ((completed.min(total) as f64 / total as f64) * 100.0).round() as usize
        };

        let should_log = match last_percent {
            Some(prev) => percent >= prev.saturating_add(5) || (percent == 100 && percent != prev),
            None => true,
        };

        if should_log {
            info!("{} progress: {}% ({} / {} rows)", activity, percent, completed, total);
            last_percent = Some(percent);
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorizer::Vectorizer;

    fn features(docs: &[&str]) -> FeatureMatrix {
        Vectorizer::default().fit_transform(docs)
    }

    #[test]
    fn matrix_is_symmetric_with_unit_diagonal() {
        let f = features(&[
            "red shoe footwear running",
            "blue shoe footwear running",
            "laptop electronics fast cpu",
            "blue laptop sleeve",
        ]);
        let sim = matrix(&f, 1, None);
        assert_eq!(sim.size(), 4);
        for i in 0..4 {
            assert!((sim.get(i, i) - 1.0).abs() < 1e-6);
            for j in 0..4 {
                assert_eq!(sim.get(i, j), sim.get(j, i));
                assert!(sim.get(i, j) >= 0.0 && sim.get(i, j) <= 1.0 + 1e-6);
            }
        }
        assert!(sim.get(0, 1) > sim.get(0, 2));
        assert_eq!(sim.get(0, 2), 0.0);
    }

    #[test]
    fn zero_rows_have_zero_similarity_everywhere() {
        let f = features(&["red shoe", "the and of"]);
        let sim = matrix(&f, 8, None);
        assert_eq!(sim.row(1), &[0.0, 0.0]);
        assert_eq!(sim.get(0, 1), 0.0);
    }

    #[test]
    fn empty_features_give_empty_matrix() {
        let sim = matrix(&FeatureMatrix::default(), 4, None);
        assert_eq!(sim.size(), 0);
    }

    #[test]
    fn query_accepts_non_catalog_vectors() {
        let f = features(&["red shoe", "laptop cpu"]);
        let mut probe = vec![0.0f32; f.dims()];
        for (&idx, &value) in f.row(0).indices.iter().zip(&f.row(0).values) {
            probe[idx as usize] = value * 3.0;
        }
        let scores = query(&probe, &f);
        assert!((scores[0] - 1.0).abs() < 1e-5);
        assert_eq!(scores[1], 0.0);

        let zero = vec![0.0f32; f.dims()];
        assert_eq!(query(&zero, &f), vec![0.0, 0.0]);
    }

    #[test]
    fn hand_built_rows_use_normalised_dot() {
        let f = FeatureMatrix::new(
            vec![
                FeatureRow { indices: vec![0, 1], values: vec![3.0, 4.0] },
                FeatureRow { indices: vec![1], values: vec![2.0] },
                FeatureRow::default(),
            ],
            2,
        );
        let sim = matrix(&f, 2, None);
        assert!((sim.get(0, 1) - 0.8).abs() < 1e-6);
        assert!((sim.get(0, 0) - 1.0).abs() < 1e-6);
        assert_eq!(sim.get(2, 2), 0.0);
        assert_eq!(sim.get(1, 2), 0.0);
    }

    #[test]
    fn oversized_chunk_covers_all_rows() {
        let f = features(&["red shoe", "blue shoe", "laptop cpu"]);
        let sim = matrix(&f, usize::MAX, None);
        assert_eq!(sim.size(), 3);
        assert!((sim.get(2, 2) - 1.0).abs() < 1e-6);
        assert!(sim.get(0, 1) > 0.0);
    }

    #[test]
    fn tiny_non_zero_rows_are_not_treated_as_zero() {
        let f = FeatureMatrix::new(
            vec![
                FeatureRow { indices: vec![0], values: vec![1e-4] },
                FeatureRow { indices: vec![0], values: vec![2e-4] },
            ],
            1,
        );
        let sim = matrix(&f, 1, None);
        assert!((sim.get(0, 1) - 1.0).abs() < 1e-4);
        assert!((sim.get(0, 0) - 1.0).abs() < 1e-6);

        let scores = query(&[1e-4], &f);
        assert!((scores[0] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn progress_reaches_total() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(Mutex::new(move |done: usize, total: usize| {
            sink.lock().unwrap().push((done, total));
        }));
        let f = features(&["a1 b2", "b2 c3", "c3 d4"]);
        matrix(&f, 2, Some(callback));
        let seen = seen.lock().unwrap();
        assert!(seen.iter().any(|&(done, total)| done == 3 && total == 3));
    }
}
