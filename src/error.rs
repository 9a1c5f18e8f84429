use thiserror::Error;

/// Reasons a wishlist page cannot be paired into items. Either one stops
/// pagination for the current wishlist.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("no items found on this page")]
    NoItems,
    #[error("mismatch in product counts: titles ({titles}) and details ({details})")]
    CountMismatch { titles: usize, details: usize },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to load {url} after {attempts} attempts: {source}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid address {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
