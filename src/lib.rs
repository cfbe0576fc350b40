//! Content-based product recommendations: TF-IDF features over product text,
//! cosine similarity, and ranked "more like this" / view-history results.
pub mod catalog;
pub mod catalog_loader;
pub mod config;
pub mod database;
pub mod model;
pub mod recommender;
pub mod similarity;
pub mod stopwords;
pub mod vectorizer;
