use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown peer: {0}")]
    UnknownPeer(u64),

    #[error("Address error: {0}")]
    AddressError(String),

    #[error("Endpoint closed")]
    Closed,
}
