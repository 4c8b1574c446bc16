#[derive(Debug, thiserror::Error)]
pub enum ReprError {
    #[error(transparent)]
    Fmt(#[from] std::fmt::Error),

    #[error("Invalid literal '{literal}' for type {ty}")]
    InvalidLiteral { literal: String, ty: &'static str },
}

pub type Result<T, E = ReprError> = std::result::Result<T, E>;
