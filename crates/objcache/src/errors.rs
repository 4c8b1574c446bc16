#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Parse(#[from] sqlparse::errors::ParseError),

    #[error(transparent)]
    Connection(#[from] connpool::errors::ConnectionError),

    #[error(transparent)]
    Repr(#[from] sqlrepr::errors::ReprError),

    #[error("Notification worker overloaded for source '{0}'")]
    WorkerOverload(String),

    #[error("Notification channel closed for source '{0}'")]
    ChannelClosed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_names_surface_in_messages() {
        let overloaded = CacheError::WorkerOverload("db1".to_string());
        assert_eq!(
            overloaded.to_string(),
            "Notification worker overloaded for source 'db1'"
        );
        let closed = CacheError::ChannelClosed("db1".to_string());
        assert_eq!(
            closed.to_string(),
            "Notification channel closed for source 'db1'"
        );
    }
}
