use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::info;

use crate::error::StoreError;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS product_data (
            asin               TEXT PRIMARY KEY,
            title              TEXT NOT NULL,
            price              REAL NOT NULL DEFAULT 0,
            stock_status       TEXT NOT NULL,
            date_added         TEXT,
            product_link       TEXT NOT NULL,
            affiliate_link     TEXT,
            image_url          TEXT,
            reviews            INTEGER NOT NULL DEFAULT 0,
            stars              REAL,
            pattern            TEXT NOT NULL,
            style              TEXT NOT NULL,
            subtitle           TEXT NOT NULL,
            price_added        REAL NOT NULL DEFAULT 0,
            price_drop_percent REAL NOT NULL DEFAULT 0,
            needs_product      INTEGER NOT NULL DEFAULT 0,
            has_product        INTEGER NOT NULL DEFAULT 0,
            wishlist_name      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_product_wishlist ON product_data(wishlist_name);

        -- Pre-update images of product_data rows, one per overwrite.
        CREATE TABLE IF NOT EXISTS product_data_history (
            id                 INTEGER PRIMARY KEY,
            asin               TEXT NOT NULL,
            title              TEXT NOT NULL,
            price              REAL NOT NULL DEFAULT 0,
            stock_status       TEXT NOT NULL,
            date_added         TEXT,
            product_link       TEXT NOT NULL,
            affiliate_link     TEXT,
            image_url          TEXT,
            reviews            INTEGER NOT NULL DEFAULT 0,
            stars              REAL,
            pattern            TEXT NOT NULL,
            style              TEXT NOT NULL,
            subtitle           TEXT NOT NULL,
            price_added        REAL NOT NULL DEFAULT 0,
            price_drop_percent REAL NOT NULL DEFAULT 0,
            needs_product      INTEGER NOT NULL DEFAULT 0,
            has_product        INTEGER NOT NULL DEFAULT 0,
            wishlist_name      TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_history_asin ON product_data_history(asin);
        ",
    )?;
    Ok(())
}

// ── Products ──

/// One wishlist item as extracted from a page and as stored in `product_data`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub asin: Option<String>,
    pub title: String,
    pub subtitle: String,
    pub price: f64,
    pub price_added: f64,
    pub price_drop_percent: f64,
    pub stock_status: String,
    pub reviews: u32,
    pub needs_product: u32,
    pub has_product: u32,
    pub stars: Option<f64>,
    pub date_added: Option<NaiveDate>,
    pub image_url: Option<String>,
    pub product_link: String,
    pub affiliate_link: Option<String>,
    pub pattern: String,
    pub style: String,
    pub wishlist_name: String,
}

const COLUMNS: &str = "asin, title, price, stock_status, date_added, product_link, \
     affiliate_link, image_url, reviews, stars, pattern, style, subtitle, \
     price_added, price_drop_percent, needs_product, has_product, wishlist_name";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ProductRecord> {
    Ok(ProductRecord {
        asin: row.get(0)?,
        title: row.get(1)?,
        price: row.get(2)?,
        stock_status: row.get(3)?,
        date_added: row.get(4)?,
        product_link: row.get(5)?,
        affiliate_link: row.get(6)?,
        image_url: row.get(7)?,
        reviews: row.get(8)?,
        stars: row.get(9)?,
        pattern: row.get(10)?,
        style: row.get(11)?,
        subtitle: row.get(12)?,
        price_added: row.get(13)?,
        price_drop_percent: row.get(14)?,
        needs_product: row.get(15)?,
        has_product: row.get(16)?,
        wishlist_name: row.get(17)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No ASIN; nothing written.
    Skipped,
    /// First sighting of the ASIN; no history row.
    Inserted,
    /// Existing row overwritten; its previous values went to history.
    Updated,
}

/// Write `record` as the current state of its ASIN and, if a row already
/// existed, append that row's previous values to the history table.
///
/// Runs inside the caller's transaction; the caller commits.
pub fn upsert_product(
    tx: &Transaction<'_>,
    record: &ProductRecord,
    now: DateTime<Utc>,
) -> rusqlite::Result<UpsertOutcome> {
    let Some(asin) = record.asin.as_deref() else {
        info!("Invalid ASIN: skipping product update.");
        return Ok(UpsertOutcome::Skipped);
    };

    let previous = fetch_product(tx, asin)?;

    tx.execute(
        &format!(
            "INSERT INTO product_data ({COLUMNS})
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)
             ON CONFLICT(asin) DO UPDATE SET
                title = excluded.title,
                price = excluded.price,
                stock_status = excluded.stock_status,
                date_added = excluded.date_added,
                product_link = excluded.product_link,
                affiliate_link = excluded.affiliate_link,
                image_url = excluded.image_url,
                reviews = excluded.reviews,
                stars = excluded.stars,
                pattern = excluded.pattern,
                style = excluded.style,
                subtitle = excluded.subtitle,
                price_added = excluded.price_added,
                price_drop_percent = excluded.price_drop_percent,
                needs_product = excluded.needs_product,
                has_product = excluded.has_product,
                wishlist_name = excluded.wishlist_name"
        ),
        params![
            asin,
            record.title,
            record.price,
            record.stock_status,
            record.date_added,
            record.product_link,
            record.affiliate_link,
            record.image_url,
            record.reviews,
            record.stars,
            record.pattern,
            record.style,
            record.subtitle,
            record.price_added,
            record.price_drop_percent,
            record.needs_product,
            record.has_product,
            record.wishlist_name,
        ],
    )?;

    let Some(old) = previous else {
        info!("Product {} added without any old data.", asin);
        return Ok(UpsertOutcome::Inserted);
    };

    tx.execute(
        &format!(
            "INSERT INTO product_data_history ({COLUMNS}, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)"
        ),
        params![
            old.asin,
            old.title,
            old.price,
            old.stock_status,
            old.date_added,
            old.product_link,
            old.affiliate_link,
            old.image_url,
            old.reviews,
            old.stars,
            old.pattern,
            old.style,
            old.subtitle,
            old.price_added,
            old.price_drop_percent,
            old.needs_product,
            old.has_product,
            old.wishlist_name,
            now.to_rfc3339_opts(SecondsFormat::Millis, true),
        ],
    )?;
    info!("Product {} updated with old data moved to history.", asin);
    Ok(UpsertOutcome::Updated)
}

pub fn fetch_product(conn: &Connection, asin: &str) -> rusqlite::Result<Option<ProductRecord>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM product_data WHERE asin = ?1"),
        params![asin],
        record_from_row,
    )
    .optional()
}

pub fn fetch_products(
    conn: &Connection,
    wishlist: Option<&str>,
    limit: usize,
) -> Result<Vec<ProductRecord>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM product_data
         WHERE ?1 IS NULL OR wishlist_name = ?1
         ORDER BY wishlist_name, title
         LIMIT {}",
        limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![wishlist], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── History ──

pub struct HistoryRow {
    pub record: ProductRecord,
    pub updated_at: String,
}

/// History rows for one ASIN, oldest first.
pub fn fetch_history(conn: &Connection, asin: &str) -> Result<Vec<HistoryRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS}, updated_at FROM product_data_history
         WHERE asin = ?1
         ORDER BY id"
    ))?;
    let rows = stmt
        .query_map(params![asin], |row| {
            Ok(HistoryRow {
                record: record_from_row(row)?,
                updated_at: row.get(18)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Store seam ──

/// Where extracted records go. The page loop only talks to this.
pub trait ProductStore {
    fn upsert(&mut self, record: &ProductRecord) -> Result<UpsertOutcome, StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        SqliteStore { conn }
    }

    #[cfg(test)]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

impl ProductStore for SqliteStore {
    /// One transaction per record, committed before returning. On error the
    /// transaction is dropped and rolled back, leaving both tables untouched.
    fn upsert(&mut self, record: &ProductRecord) -> Result<UpsertOutcome, StoreError> {
        let tx = self.conn.transaction()?;
        let outcome = upsert_product(&tx, record, Utc::now())?;
        tx.commit()?;
        Ok(outcome)
    }
}

// ── Stats ──

pub struct Stats {
    pub products: usize,
    pub history: usize,
    pub wishlists: usize,
    pub price_drops: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let products: usize = conn.query_row("SELECT COUNT(*) FROM product_data", [], |r| r.get(0))?;
    let history: usize =
        conn.query_row("SELECT COUNT(*) FROM product_data_history", [], |r| r.get(0))?;
    let wishlists: usize = conn.query_row(
        "SELECT COUNT(DISTINCT wishlist_name) FROM product_data",
        [],
        |r| r.get(0),
    )?;
    let price_drops: usize = conn.query_row(
        "SELECT COUNT(*) FROM product_data WHERE price_drop_percent > 0",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        products,
        history,
        wishlists,
        price_drops,
    })
}

// ── Tests ──
