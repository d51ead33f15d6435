use thiserror::Error;

use crate::network::NetworkError;

#[derive(Error, Debug)]
pub enum RaftError {
    #[error("Node {0} is not a member of the cluster")]
    NotMember(u64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] NetworkError),

    #[error("Task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Reasons an inbound datagram could not be decoded into a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("Empty message")]
    Empty,

    #[error("Unknown message kind: {0}")]
    UnknownKind(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid integer for {field}: {value:?}")]
    InvalidInteger { field: &'static str, value: String },

    #[error("Invalid boolean: {0:?}")]
    InvalidBool(String),

    #[error("Unexpected trailing field: {0:?}")]
    TrailingField(String),

    #[error("Message is not valid UTF-8")]
    InvalidUtf8,
}
