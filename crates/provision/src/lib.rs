//! Idempotent provisioning of the ticket system's cloud resources.
//!
//! A run ensures, in order: the ticket table, the function's execution role
//! and table policy, the function itself, and the agent's role and policy.
//! Every step is create-or-fetch, so re-running after a partial failure
//! converges on the same resources.

pub mod archive;
pub mod cloud;
pub mod outcome;
pub mod provisioner;

pub use archive::{ArchiveError, ArtifactSource, BOOTSTRAP_ENTRY};
pub use cloud::{
    AccountApi, AwsCloud, CloudError, CloudOperation, FunctionApi, FunctionSpec, IdentityApi,
    InMemoryCloud, TableApi, TableSpec,
};
pub use outcome::Provisioned;
pub use provisioner::{
    CloudClients, ProvisionError, ProvisionPlan, ProvisionReport, ProvisionSettings, Provisioner,
    ResourceRecord, RoleWithPolicy,
};
