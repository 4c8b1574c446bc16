#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to open connection: {0}")]
    Open(String),

    #[error("Failed to execute statement: {0}")]
    Execute(String),

    #[error("Connection closed")]
    Closed,

    #[error("Connection pool shut down")]
    PoolClosed,
}

pub type Result<T, E = ConnectionError> = std::result::Result<T, E>;
