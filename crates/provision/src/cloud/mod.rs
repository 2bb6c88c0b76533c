//! Provider boundary for the provisioner.
//!
//! Each trait covers one control plane. Implementations translate provider
//! failures into [`CloudError`], reporting "already exists" as its own
//! variant so callers can fall back to a fetch.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use ticketdesk_core::domain::resources::{
    AccountContext, FunctionDescriptor, PolicyDescriptor, RoleDescriptor, TableDescriptor,
};

pub mod aws;
pub mod memory;

pub use aws::AwsCloud;
pub use memory::{CloudOperation, InMemoryCloud};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CloudError {
    #[error("resource already exists: {0}")]
    AlreadyExists(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("request rejected: {0}")]
    Validation(String),
    #[error("request throttled: {0}")]
    Throttled(String),
    #[error("provider error: {0}")]
    Service(String),
}

impl CloudError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::AlreadyExists(_) => "already_exists",
            Self::NotFound(_) => "not_found",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Validation(_) => "validation",
            Self::Throttled(_) => "throttled",
            Self::Service(_) => "service",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub key_attribute: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: String,
    pub role_arn: String,
    pub runtime: String,
    pub handler: String,
    pub architecture: String,
    pub timeout_secs: u32,
    pub memory_mb: u32,
    pub environment: BTreeMap<String, String>,
    /// Zip archive holding the `bootstrap` executable.
    pub archive: Vec<u8>,
}

#[async_trait]
pub trait TableApi: Send + Sync {
    /// Single string hash key, on-demand billing.
    async fn create_table(&self, spec: &TableSpec) -> Result<TableDescriptor, CloudError>;
    async fn describe_table(&self, name: &str) -> Result<TableDescriptor, CloudError>;
}

#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
    ) -> Result<RoleDescriptor, CloudError>;
    async fn get_role(&self, name: &str) -> Result<RoleDescriptor, CloudError>;
    async fn create_policy(
        &self,
        name: &str,
        document: &str,
    ) -> Result<PolicyDescriptor, CloudError>;
    async fn get_policy(&self, arn: &str) -> Result<PolicyDescriptor, CloudError>;
    /// Re-attaching an attached policy succeeds.
    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str)
        -> Result<(), CloudError>;
}

#[async_trait]
pub trait FunctionApi: Send + Sync {
    async fn create_function(&self, spec: &FunctionSpec)
        -> Result<FunctionDescriptor, CloudError>;
    async fn get_function(&self, name: &str) -> Result<FunctionDescriptor, CloudError>;
}

#[async_trait]
pub trait AccountApi: Send + Sync {
    async fn caller_account(&self) -> Result<AccountContext, CloudError>;
}

/// Maps a provider error code onto the shared taxonomy.
pub fn classify_code(code: Option<&str>, message: String) -> CloudError {
    match code.unwrap_or_default() {
        "EntityAlreadyExists" | "ResourceInUseException" | "ResourceConflictException" => {
            CloudError::AlreadyExists(message)
        }
        "NoSuchEntity" | "ResourceNotFoundException" | "TableNotFoundException" => {
            CloudError::NotFound(message)
        }
        "AccessDenied" | "AccessDeniedException" | "UnrecognizedClientException"
        | "InvalidClientTokenId" | "ExpiredToken" | "ExpiredTokenException" => {
            CloudError::PermissionDenied(message)
        }
        "ValidationException" | "ValidationError" | "InvalidInput"
        | "MalformedPolicyDocument" | "InvalidParameterValueException" => {
            CloudError::Validation(message)
        }
        "Throttling" | "ThrottlingException" | "TooManyRequestsException"
        | "RequestLimitExceeded" | "LimitExceededException" => CloudError::Throttled(message),
        _ => CloudError::Service(message),
    }
}

#[cfg(test)]
mod tests {
    use super::{classify_code, CloudError};

    #[test]
    fn already_exists_codes_from_every_plane_are_recognised() {
        for code in ["EntityAlreadyExists", "ResourceInUseException", "ResourceConflictException"] {
            assert!(matches!(
                classify_code(Some(code), code.to_owned()),
                CloudError::AlreadyExists(_)
            ));
        }
    }

    #[test]
    fn unknown_or_missing_codes_are_service_faults() {
        assert_eq!(classify_code(None, "boom".to_owned()), CloudError::Service("boom".to_owned()));
        assert_eq!(classify_code(Some("InternalFailure"), "x".to_owned()).error_class(), "service");
        assert_eq!(classify_code(Some("AccessDenied"), "x".to_owned()).error_class(), "permission_denied");
        assert_eq!(classify_code(Some("ThrottlingException"), "x".to_owned()).error_class(), "throttled");
    }
}
