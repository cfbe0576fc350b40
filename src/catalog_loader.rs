use crate::catalog::Product;
use crate::database::Database;
use csv::ReaderBuilder;
use log::{info, warn};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;

#[derive(Debug, Clone)]
pub struct CatalogLoadReport {
    pub processed: usize,
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CsvProduct {
    id: Option<String>,
    #[serde(default, alias = "product_name")]
    name: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl CsvProduct {
    fn into_product(self) -> Result<Product, String> {
        let raw_id = self
            .id
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| "Missing id value".to_string())?;
        let id = raw_id
            .parse::<i64>()
            .map_err(|_| format!("Invalid id '{}'", raw_id))?;

        let text = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Product {
            id,
            name: text(self.name),
            category: text(self.category),
            description: text(self.description),
        })
    }
}

pub struct CatalogLoader;

impl CatalogLoader {
    pub fn new() -> Self {
        CatalogLoader
    }

    /// Import products from a CSV with `id,name,category,description` columns.
    pub fn load_from_csv(&self, csv_path: &str, db: &mut Database) -> Result<CatalogLoadReport, String> {
        let file = File::open(csv_path).map_err(|e| format!("Failed to open CSV file: {}", e))?;
        let report = self.load_from_reader(file, db)?;
        info!(
            "Imported {} of {} products from {} ({} skipped)",
            report.imported, report.processed, csv_path, report.skipped
        );
        Ok(report)
    }

    pub fn load_from_reader<R: Read>(&self, input: R, db: &mut Database) -> Result<CatalogLoadReport, String> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);

        // Header matching is case-insensitive.
        let headers: csv::StringRecord = reader
            .headers()
            .map_err(|e| format!("Failed to read CSV headers: {}", e))?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();
        if !headers.iter().any(|h| h == "id") {
            return Err("CSV file must contain an 'id' column".to_string());
        }

        let mut processed = 0;
        let mut imported = 0;
        let mut skipped = 0;
        let mut errors = Vec::new();

        let mut session = db
            .start_product_import()
            .map_err(|e| format!("Failed to start product import transaction: {}", e))?;

        for result in reader.records() {
            processed += 1;
            // Line where the record starts; quoted fields may span several lines.
            let position = match &result {
                Ok(record) => record.position(),
                Err(e) => e.position(),
            };
            let display_line = position.map(|p| p.line()).unwrap_or(processed as u64 + 1);

            let outcome = result
                .map_err(|e| e.to_string())
                .and_then(|record| {
                    record
                        .deserialize::<CsvProduct>(Some(&headers))
                        .map_err(|e| e.to_string())
                })
                .and_then(CsvProduct::into_product)
                .and_then(|product| {
                    session
                        .upsert_product(&product)
                        .map_err(|e| e.to_string())
                });

            match outcome {
                Ok(()) => imported += 1,
                Err(e) => {
                    skipped += 1;
                    warn!("Skipping CSV line {}: {}", display_line, e);
                    errors.push(format!("Line {}: {}", display_line, e));
                }
            }
        }

        if processed == 0 {
            drop(session);
            return Err("CSV file did not contain any records".to_string());
        }

        session
            .commit()
            .map_err(|e| format!("Failed to commit products: {}", e))?;

        Ok(CatalogLoadReport {
            processed,
            imported,
            skipped,
            errors,
        })
    }
}

impl Default for CatalogLoader {
    fn default() -> Self {
        Self::new()
    }
}
