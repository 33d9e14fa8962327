//! Store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for imgforge_core::Error {
    fn from(err: StoreError) -> Self {
        imgforge_core::Error::Transport(err.to_string())
    }
}
