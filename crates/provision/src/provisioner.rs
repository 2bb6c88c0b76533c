use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use ticketdesk_core::access_policy::PolicyDocument;
use ticketdesk_core::config::{AppConfig, TABLE_NAME_ENV};
use ticketdesk_core::domain::resources::{
    AccountContext, FunctionDescriptor, PolicyDescriptor, ResourceKind, ResourceNames,
    RoleDescriptor, TableDescriptor, TableStatus, LAMBDA_BASIC_EXECUTION_POLICY_ARN,
};
use ticketdesk_core::errors::DomainError;

use crate::archive::{ArchiveError, ArtifactSource};
use crate::cloud::{
    AccountApi, CloudError, FunctionApi, FunctionSpec, IdentityApi, TableApi, TableSpec,
};
use crate::outcome::Provisioned;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{step} failed: {source}")]
    Cloud {
        step: &'static str,
        #[source]
        source: CloudError,
    },
    #[error("table `{name}` did not become ACTIVE after {attempts} status checks")]
    TableNotActive { name: String, attempts: u32 },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    InvalidName(#[from] DomainError),
    #[error("failed to encode policy document: {0}")]
    PolicyEncoding(#[from] serde_json::Error),
}

impl ProvisionError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Cloud { source, .. } => source.error_class(),
            Self::TableNotActive { .. } => "table_not_active",
            Self::Archive(_) => "archive",
            Self::InvalidName(error) => error.error_class(),
            Self::PolicyEncoding(_) => "policy_encoding",
        }
    }
}

fn cloud_step(step: &'static str) -> impl FnOnce(CloudError) -> ProvisionError {
    move |source| ProvisionError::Cloud { step, source }
}

/// Timing and function settings shared by every step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionSettings {
    pub propagation_delay: Duration,
    pub table_poll_interval: Duration,
    pub table_poll_attempts: u32,
    pub runtime: String,
    pub handler: String,
    pub architecture: String,
    pub timeout_secs: u32,
    pub memory_mb: u32,
}

impl ProvisionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            propagation_delay: Duration::from_secs(config.provisioning.propagation_delay_secs),
            table_poll_interval: Duration::from_millis(config.provisioning.table_poll_interval_ms),
            table_poll_attempts: config.provisioning.table_poll_attempts,
            runtime: config.function.runtime.clone(),
            handler: config.function.handler.clone(),
            architecture: config.function.architecture.clone(),
            timeout_secs: config.function.timeout_secs,
            memory_mb: config.function.memory_mb,
        }
    }
}

/// Everything one `provision` run needs beyond the account and settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionPlan {
    pub agent_name: String,
    pub foundation_model: String,
    pub knowledge_base_id: Option<String>,
    pub table_name: String,
    pub key_attribute: String,
    pub function_name: String,
    pub artifact: ArtifactSource,
}

impl ProvisionPlan {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            agent_name: config.agent.name.clone(),
            foundation_model: config.agent.foundation_model.clone(),
            knowledge_base_id: config.agent.knowledge_base_id.clone(),
            table_name: config.table.name.clone(),
            key_attribute: config.table.key_attribute.clone(),
            function_name: config.function_name(),
            artifact: ArtifactSource::Path(config.function.artifact_path.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoleWithPolicy {
    pub role: Provisioned<RoleDescriptor>,
    pub policy: Provisioned<PolicyDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub region: String,
    pub account_id: String,
    pub table: Provisioned<TableDescriptor>,
    pub compute_identity: RoleWithPolicy,
    pub function: Provisioned<FunctionDescriptor>,
    pub agent_identity: RoleWithPolicy,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub name: String,
    pub arn: String,
    pub outcome: &'static str,
}

impl ProvisionReport {
    /// Flat listing in provisioning order.
    pub fn resources(&self) -> Vec<ResourceRecord> {
        fn record<T>(
            kind: ResourceKind,
            outcome: &Provisioned<T>,
            name: &str,
            arn: &str,
        ) -> ResourceRecord {
            ResourceRecord {
                kind,
                name: name.to_owned(),
                arn: arn.to_owned(),
                outcome: outcome.label(),
            }
        }

        fn identity_records(identity: &RoleWithPolicy) -> [ResourceRecord; 2] {
            let role = identity.role.resource();
            let policy = identity.policy.resource();
            [
                record(ResourceKind::Role, &identity.role, &role.name, &role.arn),
                record(ResourceKind::Policy, &identity.policy, &policy.name, &policy.arn),
            ]
        }

        let table = self.table.resource();
        let function = self.function.resource();
        let mut records = vec![record(ResourceKind::Table, &self.table, &table.name, &table.arn)];
        records.extend(identity_records(&self.compute_identity));
        records.push(record(ResourceKind::Function, &self.function, &function.name, &function.arn));
        records.extend(identity_records(&self.agent_identity));
        records
    }

    pub fn created_count(&self) -> usize {
        self.resources().iter().filter(|record| record.outcome == "created").count()
    }
}

/// Handles to each provider plane.
#[derive(Clone)]
pub struct CloudClients {
    pub tables: Arc<dyn TableApi>,
    pub identity: Arc<dyn IdentityApi>,
    pub functions: Arc<dyn FunctionApi>,
}

impl CloudClients {
    pub fn from_shared<C>(cloud: Arc<C>) -> Self
    where
        C: TableApi + IdentityApi + FunctionApi + 'static,
    {
        Self { tables: cloud.clone(), identity: cloud.clone(), functions: cloud }
    }
}

pub struct Provisioner {
    clouds: CloudClients,
    account: AccountContext,
    settings: ProvisionSettings,
}

impl Provisioner {
    pub fn new(clouds: CloudClients, account: AccountContext, settings: ProvisionSettings) -> Self {
        Self { clouds, account, settings }
    }

    /// Resolves the caller's account once, then wires every plane to `cloud`.
    pub async fn bootstrap<C>(cloud: Arc<C>, settings: ProvisionSettings) -> Result<Self, ProvisionError>
    where
        C: TableApi + IdentityApi + FunctionApi + AccountApi + 'static,
    {
        let account = cloud.caller_account().await.map_err(cloud_step("get_caller_identity"))?;
        info!(
            event_name = "provision.account.resolved",
            region = %account.region,
            account_id = %account.account_id,
            "resolved caller account"
        );
        Ok(Self::new(CloudClients::from_shared(cloud), account, settings))
    }

    pub fn account(&self) -> &AccountContext {
        &self.account
    }

    pub async fn provision(&self, plan: &ProvisionPlan) -> Result<ProvisionReport, ProvisionError> {
        let table = self.ensure_table(&plan.table_name, &plan.key_attribute).await?;
        let compute_identity =
            self.ensure_compute_identity(&plan.agent_name, &table.resource().name).await?;
        let function = self
            .ensure_compute_function(
                &plan.function_name,
                compute_identity.role.resource(),
                &table.resource().name,
                &plan.artifact,
            )
            .await?;
        let agent_identity = self
            .ensure_agent_identity(
                &plan.agent_name,
                &plan.foundation_model,
                plan.knowledge_base_id.as_deref(),
            )
            .await?;

        let report = ProvisionReport {
            region: self.account.region.clone(),
            account_id: self.account.account_id.clone(),
            table,
            compute_identity,
            function,
            agent_identity,
        };
        info!(
            event_name = "provision.run.completed",
            agent = %plan.agent_name,
            created = report.created_count(),
            "provisioning finished"
        );
        Ok(report)
    }

    pub async fn ensure_table(
        &self,
        name: &str,
        key_attribute: &str,
    ) -> Result<Provisioned<TableDescriptor>, ProvisionError> {
        let spec = TableSpec { name: name.to_owned(), key_attribute: key_attribute.to_owned() };
        let tables = &self.clouds.tables;

        let table = create_or_fetch(
            "create_table",
            tables.create_table(&spec),
            "describe_table",
            || tables.describe_table(name),
        )
        .await?;
        log_outcome(ResourceKind::Table, name, &table);

        let mut current = table.resource().status;
        let mut descriptor = table.resource().clone();
        let mut attempts = 0;
        while current != TableStatus::Active {
            if attempts == self.settings.table_poll_attempts {
                return Err(ProvisionError::TableNotActive { name: name.to_owned(), attempts });
            }
            attempts += 1;
            pause(self.settings.table_poll_interval).await;
            descriptor = tables.describe_table(name).await.map_err(cloud_step("describe_table"))?;
            current = descriptor.status;
        }

        Ok(table.map(|_| descriptor))
    }

    /// Role and table policy the function executes under.
    pub async fn ensure_compute_identity(
        &self,
        agent_name: &str,
        table_name: &str,
    ) -> Result<RoleWithPolicy, ProvisionError> {
        let names = ResourceNames::for_agent(agent_name)?;
        let identity = &self.clouds.identity;

        let trust = PolicyDocument::lambda_trust().to_json()?;
        let role = create_or_fetch(
            "create_role",
            identity.create_role(&names.lambda_role, &trust),
            "get_role",
            || identity.get_role(&names.lambda_role),
        )
        .await?;
        log_outcome(ResourceKind::Role, &names.lambda_role, &role);
        self.await_propagation(&role).await;

        identity
            .attach_role_policy(&names.lambda_role, LAMBDA_BASIC_EXECUTION_POLICY_ARN)
            .await
            .map_err(cloud_step("attach_role_policy"))?;

        let document = PolicyDocument::table_access(&self.account, table_name).to_json()?;
        let policy_arn = self.account.policy_arn(&names.table_policy);
        let policy = create_or_fetch(
            "create_policy",
            identity.create_policy(&names.table_policy, &document),
            "get_policy",
            || identity.get_policy(&policy_arn),
        )
        .await?;
        log_outcome(ResourceKind::Policy, &names.table_policy, &policy);

        identity
            .attach_role_policy(&names.lambda_role, &policy.resource().arn)
            .await
            .map_err(cloud_step("attach_role_policy"))?;

        Ok(RoleWithPolicy { role, policy })
    }

    /// An existing function is returned as-is; its code is not updated.
    pub async fn ensure_compute_function(
        &self,
        name: &str,
        identity: &RoleDescriptor,
        table_name: &str,
        artifact: &ArtifactSource,
    ) -> Result<Provisioned<FunctionDescriptor>, ProvisionError> {
        let spec = FunctionSpec {
            name: name.to_owned(),
            role_arn: identity.arn.clone(),
            runtime: self.settings.runtime.clone(),
            handler: self.settings.handler.clone(),
            architecture: self.settings.architecture.clone(),
            timeout_secs: self.settings.timeout_secs,
            memory_mb: self.settings.memory_mb,
            environment: BTreeMap::from([(TABLE_NAME_ENV.to_owned(), table_name.to_owned())]),
            archive: artifact.package()?,
        };
        let functions = &self.clouds.functions;

        let function = create_or_fetch(
            "create_function",
            functions.create_function(&spec),
            "get_function",
            || functions.get_function(name),
        )
        .await?;
        log_outcome(ResourceKind::Function, name, &function);
        Ok(function)
    }

    /// Role and policy the agent assumes to invoke the model.
    pub async fn ensure_agent_identity(
        &self,
        agent_name: &str,
        foundation_model_id: &str,
        knowledge_base_id: Option<&str>,
    ) -> Result<RoleWithPolicy, ProvisionError> {
        let names = ResourceNames::for_agent(agent_name)?;
        let identity = &self.clouds.identity;

        let document =
            PolicyDocument::agent_access(&self.account, foundation_model_id, knowledge_base_id)
                .to_json()?;
        let policy_arn = self.account.policy_arn(&names.agent_policy);
        let policy = create_or_fetch(
            "create_policy",
            identity.create_policy(&names.agent_policy, &document),
            "get_policy",
            || identity.get_policy(&policy_arn),
        )
        .await?;
        log_outcome(ResourceKind::Policy, &names.agent_policy, &policy);

        let trust = PolicyDocument::agent_trust().to_json()?;
        let role = create_or_fetch(
            "create_role",
            identity.create_role(&names.agent_role, &trust),
            "get_role",
            || identity.get_role(&names.agent_role),
        )
        .await?;
        log_outcome(ResourceKind::Role, &names.agent_role, &role);
        self.await_propagation(&role).await;

        identity
            .attach_role_policy(&names.agent_role, &policy.resource().arn)
            .await
            .map_err(cloud_step("attach_role_policy"))?;

        Ok(RoleWithPolicy { role, policy })
    }

    /// Fixed wait after creating a role; propagation is not detected.
    async fn await_propagation(&self, role: &Provisioned<RoleDescriptor>) {
        if !role.was_created() {
            return;
        }
        info!(
            event_name = "provision.role.propagation_wait",
            role = %role.resource().name,
            delay_secs = self.settings.propagation_delay.as_secs(),
            "waiting for new role to propagate"
        );
        pause(self.settings.propagation_delay).await;
    }
}

async fn create_or_fetch<T, Create, Fetch, FetchFut>(
    create_step: &'static str,
    create: Create,
    fetch_step: &'static str,
    fetch: Fetch,
) -> Result<Provisioned<T>, ProvisionError>
where
    Create: Future<Output = Result<T, CloudError>>,
    Fetch: FnOnce() -> FetchFut,
    FetchFut: Future<Output = Result<T, CloudError>>,
{
    match create.await {
        Ok(resource) => Ok(Provisioned::Created(resource)),
        Err(CloudError::AlreadyExists(detail)) => {
            info!(
                event_name = "provision.resource.exists",
                step = create_step,
                detail = %detail,
                "resource already exists, fetching"
            );
            fetch().await.map(Provisioned::Existing).map_err(cloud_step(fetch_step))
        }
        Err(source) => {
            warn!(
                event_name = "provision.step.failed",
                step = create_step,
                error_class = source.error_class(),
                error = %source,
                "provisioning step failed"
            );
            Err(ProvisionError::Cloud { step: create_step, source })
        }
    }
}

fn log_outcome<T>(kind: ResourceKind, name: &str, outcome: &Provisioned<T>) {
    info!(
        event_name = "provision.resource.ensured",
        kind = kind.as_str(),
        name = %name,
        outcome = outcome.label(),
        "resource ensured"
    );
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
