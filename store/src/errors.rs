use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("RocksDB error: {0}")]
    Backend(#[from] rocksdb::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Unknown container: {0}")]
    UnknownContainer(String),

    #[error("Store is closed")]
    Closed,
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}
