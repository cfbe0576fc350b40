use crate::catalog::Product;
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, Result, Transaction};
#[cfg(test)]
use rusqlite::OptionalExtension;

pub struct Database {
    conn: Connection,
}

pub struct ProductImportSession<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> ProductImportSession<'conn> {
    pub fn upsert_product(&mut self, product: &Product) -> Result<()> {
        let updated_at = Utc::now().to_rfc3339();
        let mut stmt = self.tx.prepare_cached(
            "INSERT INTO products (id, name, category, description, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET name=excluded.name, category=excluded.category,
             description=excluded.description, updated_at=excluded.updated_at",
        )?;
        stmt.execute(params![
            product.id,
            product.name,
            product.category,
            product.description,
            updated_at
        ])?;
        Ok(())
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()
    }
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let db = Database { conn };
        db.create_tables()?;
        Ok(db)
    }

    /// Opens an existing catalog read-only; never creates the file or the table.
    pub fn open_existing(db_path: &str) -> Result<Self> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Database { conn })
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY,
                name TEXT,
                category TEXT,
                description TEXT,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn start_product_import(&mut self) -> Result<ProductImportSession<'_>> {
        let tx = self.conn.transaction()?;
        Ok(ProductImportSession { tx })
    }

    #[cfg(test)]
    pub(crate) fn upsert_product(&mut self, product: &Product) -> Result<()> {
        let mut session = self.start_product_import()?;
        session.upsert_product(product)?;
        session.commit()
    }

    #[cfg(test)]
    pub(crate) fn get_product(&self, id: i64) -> Result<Option<Product>> {
        self.conn
            .query_row(
                "SELECT id, name, category, description FROM products WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Product {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        category: row.get(2)?,
                        description: row.get(3)?,
                    })
                },
            )
            .optional()
    }

    /// All products in ascending id order, which becomes the snapshot row order.
    pub fn get_all_products(&self) -> Result<Vec<Product>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, category, description FROM products ORDER BY id")?;

        let products = stmt.query_map([], |row| {
            Ok(Product {
                id: row.get(0)?,
                name: row.get(1)?,
                category: row.get(2)?,
                description: row.get(3)?,
            })
        })?;

        products.collect()
    }

    pub fn get_product_count(&self) -> Result<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))
    }
}
