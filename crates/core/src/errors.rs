use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("priority must be an integer, got `{0}`")]
    InvalidPriority(String),
    #[error("invalid resource name `{name}`: {reason}")]
    InvalidResourceName { name: String, reason: String },
}

impl DomainError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::InvalidPriority(_) => "invalid_priority",
            Self::InvalidResourceName { .. } => "invalid_resource_name",
        }
    }
}
