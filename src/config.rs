use crate::recommender::DEFAULT_TOP_N;
use crate::vectorizer::DEFAULT_MAX_FEATURES;

const DEFAULT_DB_PATH: &str = "catalog.db";
const DEFAULT_ROW_CHUNK: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct RecommenderConfig {
    pub db_path: String,
    pub max_features: usize,
    pub top_n: usize,
    /// Similarity-matrix rows per parallel work unit.
    pub row_chunk: usize,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            max_features: DEFAULT_MAX_FEATURES,
            top_n: DEFAULT_TOP_N,
            row_chunk: DEFAULT_ROW_CHUNK,
        }
    }
}

impl RecommenderConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let positive = |key: &str, default: usize| {
            lookup(key)
                .and_then(|value| value.trim().parse::<usize>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(default)
        };

        Self {
            db_path: lookup("RECOMMENDER_DB")
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.db_path),
            max_features: positive("RECOMMENDER_MAX_FEATURES", defaults.max_features),
            top_n: positive("RECOMMENDER_TOP_N", defaults.top_n),
            row_chunk: positive("RECOMMENDER_ROW_CHUNK", defaults.row_chunk),
        }
    }
}
