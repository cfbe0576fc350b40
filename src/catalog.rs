use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl Product {
    pub fn new(id: i64, name: &str, category: &str, description: &str) -> Self {
        Product {
            id,
            name: Some(name.to_string()),
            category: Some(category.to_string()),
            description: Some(description.to_string()),
        }
    }

    /// Name, category and description joined by single spaces; absent fields are empty.
    pub fn tag_text(&self) -> String {
        format!(
            "{} {} {}",
            self.name.as_deref().unwrap_or(""),
            self.category.as_deref().unwrap_or(""),
            self.description.as_deref().unwrap_or("")
        )
    }
}

/// Products in row order plus the row <-> id mapping fixed at load time.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    products: Vec<Product>,
    rows_by_id: HashMap<i64, usize>,
}

impl CatalogSnapshot {
    /// Builds a snapshot, keeping the first product seen for each id.
    pub fn new(products: Vec<Product>) -> Self {
        let mut kept = Vec::with_capacity(products.len());
        let mut rows_by_id = HashMap::with_capacity(products.len());

        for product in products {
            if rows_by_id.contains_key(&product.id) {
                warn!(
                    "Duplicate product id {} in catalog source; keeping the first occurrence",
                    product.id
                );
                continue;
            }
            rows_by_id.insert(product.id, kept.len());
            kept.push(product);
        }

        CatalogSnapshot {
            products: kept,
            rows_by_id,
        }
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn row_of(&self, id: i64) -> Option<usize> {
        self.rows_by_id.get(&id).copied()
    }

    pub fn id_at(&self, row: usize) -> i64 {
        self.products[row].id
    }

    pub fn tag_texts(&self) -> Vec<String> {
        self.products.iter().map(Product::tag_text).collect()
    }
}
