use crate::catalog::{CatalogSnapshot, Product};
use crate::config::RecommenderConfig;
use crate::database::Database;
use crate::recommender;
use crate::similarity::{self, SimilarityMatrix};
use crate::vectorizer::{FeatureMatrix, Vectorizer};
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::{Arc, Mutex, RwLock};

/// Supplies the products a model is built from.
pub trait CatalogSource: Send + Sync {
    fn load_products(&self) -> Result<Vec<Product>, String>;
}

impl<T: CatalogSource> CatalogSource for Arc<T> {
    fn load_products(&self) -> Result<Vec<Product>, String> {
        (**self).load_products()
    }
}

/// Reads the `products` table of a SQLite catalog on every load.
/// A missing file or table fails the load instead of yielding an empty catalog.
pub struct SqliteCatalog {
    db_path: String,
}

impl SqliteCatalog {
    pub fn new(db_path: &str) -> Self {
        SqliteCatalog {
            db_path: db_path.to_string(),
        }
    }
}

impl CatalogSource for SqliteCatalog {
    fn load_products(&self) -> Result<Vec<Product>, String> {
        let db = Database::open_existing(&self.db_path)
            .map_err(|e| format!("Failed to open catalog database {}: {}", self.db_path, e))?;
        db.get_all_products()
            .map_err(|e| format!("Failed to read products: {}", e))
    }
}

/// In-memory catalog; products can be replaced between refreshes.
#[derive(Default)]
pub struct StaticCatalog {
    products: Mutex<Vec<Product>>,
}

impl StaticCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        StaticCatalog {
            products: Mutex::new(products),
        }
    }

    pub fn push(&self, product: Product) {
        self.products
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(product);
    }
}

impl CatalogSource for StaticCatalog {
    fn load_products(&self) -> Result<Vec<Product>, String> {
        self.products
            .lock()
            .map(|products| products.clone())
            .map_err(|_| "Static catalog lock poisoned".to_string())
    }
}

/// Snapshot, features and similarity built together; never mutated after build.
#[derive(Debug)]
pub struct Model {
    catalog: CatalogSnapshot,
    features: FeatureMatrix,
    similarity: SimilarityMatrix,
    vocabulary: usize,
    built_at: DateTime<Utc>,
}

impl Model {
    pub fn build_from(products: Vec<Product>, max_features: usize, chunk_rows: usize) -> Self {
        let catalog = CatalogSnapshot::new(products);
        let tags = catalog.tag_texts();

        let mut vectorizer = Vectorizer::new(max_features);
        let features = vectorizer.fit_transform(&tags);

        let progress = if catalog.len() >= 1000 {
            Some(similarity::logging_progress_callback("Similarity matrix"))
        } else {
            None
        };
        let similarity = similarity::matrix(&features, chunk_rows, progress);

        Model {
            catalog,
            features,
            similarity,
            vocabulary: vectorizer.vocabulary_size(),
            built_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::build_from(Vec::new(), 1, 1)
    }

    pub fn catalog(&self) -> &CatalogSnapshot {
        &self.catalog
    }

    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    pub fn similarity(&self) -> &SimilarityMatrix {
        &self.similarity
    }
}

#[derive(Debug, Clone)]
pub struct ModelStats {
    pub products: usize,
    pub vocabulary: usize,
    pub built_at: DateTime<Utc>,
}

/// Serves reads against the published model and rebuilds it on demand.
pub struct ModelHandle {
    source: Box<dyn CatalogSource>,
    max_features: usize,
    chunk_rows: usize,
    current: RwLock<Arc<Model>>,
    rebuild_lock: Mutex<()>,
}

impl ModelHandle {
    /// Creates a handle serving an empty model; call `build` to load the catalog.
    pub fn new(source: Box<dyn CatalogSource>, config: &RecommenderConfig) -> Self {
        ModelHandle {
            source,
            max_features: config.max_features,
            chunk_rows: config.row_chunk,
            current: RwLock::new(Arc::new(Model::empty())),
            rebuild_lock: Mutex::new(()),
        }
    }

    pub fn build(&self) -> Result<(), String> {
        let _guard = self
            .rebuild_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        info!("Building recommendation model");
        let products = self.source.load_products().map_err(|e| {
            warn!("Model build failed, keeping previous model: {}", e);
            e
        })?;

        let model = Model::build_from(products, self.max_features, self.chunk_rows);
        info!(
            "Model built: {} products, {} vocabulary terms",
            model.catalog.len(),
            model.vocabulary
        );

        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Arc::new(model);
        Ok(())
    }

    pub fn refresh(&self) -> Result<(), String> {
        self.build()
    }

    /// The model published at call time; later refreshes do not affect it.
    pub fn snapshot(&self) -> Arc<Model> {
        let current = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&current)
    }

    pub fn catalog_size(&self) -> usize {
        self.snapshot().catalog.len()
    }

    pub fn stats(&self) -> ModelStats {
        let model = self.snapshot();
        ModelStats {
            products: model.catalog.len(),
            vocabulary: model.vocabulary,
            built_at: model.built_at,
        }
    }

    pub fn similar_to_item(&self, product_id: i64, top_n: usize) -> Vec<i64> {
        recommender::similar_to_item(&self.snapshot(), product_id, top_n)
    }

    pub fn recommend_for_user(&self, view_ids: &[i64], top_n: usize) -> Vec<i64> {
        recommender::recommend_for_user(&self.snapshot(), view_ids, top_n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn shop() -> Vec<Product> {
        vec![
            Product::new(1, "red shoe", "footwear", "running"),
            Product::new(2, "blue shoe", "footwear", "running"),
            Product::new(3, "laptop", "electronics", "fast cpu"),
        ]
    }

    struct FlakySource {
        fail: AtomicBool,
        inner: StaticCatalog,
    }

    impl CatalogSource for FlakySource {
        fn load_products(&self) -> Result<Vec<Product>, String> {
            if self.fail.load(Ordering::SeqCst) {
                return Err("catalog unreachable".to_string());
            }
            self.inner.load_products()
        }
    }

    #[test]
    fn refresh_picks_up_new_products() {
        let source = Arc::new(StaticCatalog::new(shop()));
        let handle = ModelHandle::new(
            Box::new(Arc::clone(&source)),
            &RecommenderConfig::default(),
        );
        handle.build().unwrap();
        assert_eq!(handle.catalog_size(), 3);

        source.push(Product::new(4, "green shoe", "footwear", "trail running"));
        assert!(!handle.similar_to_item(1, 10).contains(&4));

        handle.refresh().unwrap();
        assert_eq!(handle.catalog_size(), 4);
        assert!(handle.similar_to_item(1, 10).contains(&4));
    }

    #[test]
    fn failed_first_build_serves_empty_model() {
        let failing = FlakySource {
            fail: AtomicBool::new(true),
            inner: StaticCatalog::new(shop()),
        };
        let handle = ModelHandle::new(Box::new(failing), &RecommenderConfig::default());
        assert!(handle.build().is_err());
        assert_eq!(handle.catalog_size(), 0);
        assert!(handle.similar_to_item(1, 2).is_empty());
    }

    #[test]
    fn failed_refresh_after_success_preserves_model() {
        let source = Arc::new(FlakySource {
            fail: AtomicBool::new(false),
            inner: StaticCatalog::new(shop()),
        });
        let handle = ModelHandle::new(
            Box::new(Arc::clone(&source)),
            &RecommenderConfig::default(),
        );
        handle.build().unwrap();

        source.fail.store(true, Ordering::SeqCst);
        assert_eq!(handle.refresh(), Err("catalog unreachable".to_string()));
        assert_eq!(handle.catalog_size(), 3);
        assert_eq!(handle.recommend_for_user(&[1], 1), vec![2]);
    }

    fn seeded_catalog(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("catalog.db");
        let path = path.to_str().unwrap().to_string();
        let mut db = Database::new(&path).unwrap();
        let mut session = db.start_product_import().unwrap();
        for product in shop() {
            session.upsert_product(&product).unwrap();
        }
        session.commit().unwrap();
        path
    }

    #[test]
    fn sqlite_catalog_builds_model() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = seeded_catalog(&dir);
        let handle = ModelHandle::new(
            Box::new(SqliteCatalog::new(&path)),
            &RecommenderConfig::default(),
        );
        handle.build().unwrap();
        assert_eq!(handle.catalog_size(), 3);
        assert_eq!(handle.similar_to_item(1, 2), vec![2, 3]);

        let mut db = Database::new(&path).unwrap();
        let mut session = db.start_product_import().unwrap();
        session
            .upsert_product(&Product::new(4, "green shoe", "footwear", "running"))
            .unwrap();
        session.commit().unwrap();

        handle.refresh().unwrap();
        assert_eq!(handle.catalog_size(), 4);
    }

    #[test]
    fn dropped_table_fails_refresh_and_keeps_model() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = seeded_catalog(&dir);
        let handle = ModelHandle::new(
            Box::new(SqliteCatalog::new(&path)),
            &RecommenderConfig::default(),
        );
        handle.build().unwrap();

        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("DROP TABLE products")
            .unwrap();

        assert!(handle.refresh().is_err());
        assert_eq!(handle.catalog_size(), 3);
        assert_eq!(handle.recommend_for_user(&[1], 1), vec![2]);
    }

    #[test]
    fn missing_database_file_fails_build() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("absent.db");
        let handle = ModelHandle::new(
            Box::new(SqliteCatalog::new(path.to_str().unwrap())),
            &RecommenderConfig::default(),
        );
        assert!(handle.build().is_err());
        assert_eq!(handle.catalog_size(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn empty_catalog_builds() {
        let handle = ModelHandle::new(
            Box::new(StaticCatalog::default()),
            &RecommenderConfig::default(),
        );
        handle.build().unwrap();
        assert_eq!(handle.catalog_size(), 0);
        assert_eq!(handle.stats().vocabulary, 0);
        assert!(handle.similar_to_item(1, 10).is_empty());
        assert!(handle.recommend_for_user(&[1], 10).is_empty());
    }

    #[test]
    fn readers_keep_their_snapshot_across_refresh() {
        let source = Arc::new(StaticCatalog::new(shop()));
        let handle = Arc::new(ModelHandle::new(
            Box::new(Arc::clone(&source)),
            &RecommenderConfig::default(),
        ));
        handle.build().unwrap();

        let held = handle.snapshot();
        source.push(Product::new(4, "green shoe", "footwear", "running"));

        let writer = {
            let handle = Arc::clone(&handle);
            thread::spawn(move || handle.refresh())
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = Arc::clone(&handle);
                thread::spawn(move || {
                    let result = handle.similar_to_item(1, 10);
                    assert!(result.len() == 2 || result.len() == 3);
                })
            })
            .collect();

        writer.join().unwrap().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }

        assert_eq!(held.catalog().len(), 3);
        assert_eq!(held.similarity().size(), 3);
        assert_eq!(handle.catalog_size(), 4);
    }
}
