use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use ticketdesk_core::domain::resources::{
    AccountContext, FunctionDescriptor, PolicyDescriptor, RoleDescriptor, TableDescriptor,
    TableStatus,
};

use super::{AccountApi, CloudError, FunctionApi, FunctionSpec, IdentityApi, TableApi, TableSpec};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CloudOperation {
    CreateTable,
    DescribeTable,
    CreateRole,
    GetRole,
    CreatePolicy,
    GetPolicy,
    AttachRolePolicy,
    CreateFunction,
    GetFunction,
    CallerAccount,
}

struct TableRecord {
    descriptor: TableDescriptor,
    polls_until_active: u32,
}

struct RoleRecord {
    descriptor: RoleDescriptor,
    trust_policy: String,
    attached: BTreeSet<String>,
}

struct PolicyRecord {
    descriptor: PolicyDescriptor,
    document: String,
}

#[derive(Default)]
struct CloudState {
    tables: BTreeMap<String, TableRecord>,
    roles: BTreeMap<String, RoleRecord>,
    policies: BTreeMap<String, PolicyRecord>,
    functions: BTreeMap<String, (FunctionDescriptor, FunctionSpec)>,
    faults: HashMap<CloudOperation, CloudError>,
    calls: BTreeMap<CloudOperation, usize>,
}

/// Process-local stand-in for the provider, used for dry runs and tests.
///
/// Tables start in `Creating` and turn `Active` after a configurable number of
/// describe calls. Faults are one-shot and consumed by the next matching call.
pub struct InMemoryCloud {
    account: AccountContext,
    activation_polls: u32,
    state: Mutex<CloudState>,
}

impl InMemoryCloud {
    pub fn new(account: AccountContext) -> Self {
        Self { account, activation_polls: 0, state: Mutex::new(CloudState::default()) }
    }

    pub fn with_activation_polls(mut self, polls: u32) -> Self {
        self.activation_polls = polls;
        self
    }

    pub fn account(&self) -> &AccountContext {
        &self.account
    }

    pub fn fail_next(&self, operation: CloudOperation, error: CloudError) {
        self.lock().faults.insert(operation, error);
    }

    pub fn calls(&self, operation: CloudOperation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or_default()
    }

    pub fn table_count(&self) -> usize {
        self.lock().tables.len()
    }

    pub fn role_count(&self) -> usize {
        self.lock().roles.len()
    }

    pub fn policy_count(&self) -> usize {
        self.lock().policies.len()
    }

    pub fn function_count(&self) -> usize {
        self.lock().functions.len()
    }

    pub fn attached_policies(&self, role_name: &str) -> Vec<String> {
        self.lock()
            .roles
            .get(role_name)
            .map(|role| role.attached.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn trust_policy(&self, role_name: &str) -> Option<String> {
        self.lock().roles.get(role_name).map(|role| role.trust_policy.clone())
    }

    pub fn policy_document(&self, policy_arn: &str) -> Option<String> {
        self.lock().policies.get(policy_arn).map(|policy| policy.document.clone())
    }

    pub fn function_spec(&self, name: &str) -> Option<FunctionSpec> {
        self.lock().functions.get(name).map(|(_, spec)| spec.clone())
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call and returns the guard, or the injected fault.
    fn enter(&self, operation: CloudOperation) -> Result<MutexGuard<'_, CloudState>, CloudError> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_default() += 1;
        match state.faults.remove(&operation) {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl TableApi for InMemoryCloud {
    async fn create_table(&self, spec: &TableSpec) -> Result<TableDescriptor, CloudError> {
        let mut state = self.enter(CloudOperation::CreateTable)?;
        if state.tables.contains_key(&spec.name) {
            return Err(CloudError::AlreadyExists(format!("table {}", spec.name)));
        }

        let status =
            if self.activation_polls == 0 { TableStatus::Active } else { TableStatus::Creating };
        let descriptor = TableDescriptor {
            name: spec.name.clone(),
            arn: self.account.table_arn(&spec.name),
            key_attribute: spec.key_attribute.clone(),
            status,
        };
        state.tables.insert(
            spec.name.clone(),
            TableRecord {
                descriptor: descriptor.clone(),
                polls_until_active: self.activation_polls,
            },
        );
        Ok(descriptor)
    }

    async fn describe_table(&self, name: &str) -> Result<TableDescriptor, CloudError> {
        let mut state = self.enter(CloudOperation::DescribeTable)?;
        let record = state
            .tables
            .get_mut(name)
            .ok_or_else(|| CloudError::NotFound(format!("table {name}")))?;

        if record.polls_until_active > 0 {
            record.polls_until_active -= 1;
            if record.polls_until_active == 0 {
                record.descriptor.status = TableStatus::Active;
            }
        }
        Ok(record.descriptor.clone())
    }
}

#[async_trait]
impl IdentityApi for InMemoryCloud {
    async fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
    ) -> Result<RoleDescriptor, CloudError> {
        let mut state = self.enter(CloudOperation::CreateRole)?;
        if state.roles.contains_key(name) {
            return Err(CloudError::AlreadyExists(format!("role {name}")));
        }

        let descriptor =
            RoleDescriptor { name: name.to_owned(), arn: self.account.role_arn(name) };
        state.roles.insert(
            name.to_owned(),
            RoleRecord {
                descriptor: descriptor.clone(),
                trust_policy: trust_policy.to_owned(),
                attached: BTreeSet::new(),
            },
        );
        Ok(descriptor)
    }

    async fn get_role(&self, name: &str) -> Result<RoleDescriptor, CloudError> {
        let state = self.enter(CloudOperation::GetRole)?;
        state
            .roles
            .get(name)
            .map(|role| role.descriptor.clone())
            .ok_or_else(|| CloudError::NotFound(format!("role {name}")))
    }

    async fn create_policy(
        &self,
        name: &str,
        document: &str,
    ) -> Result<PolicyDescriptor, CloudError> {
        let mut state = self.enter(CloudOperation::CreatePolicy)?;
        let arn = self.account.policy_arn(name);
        if state.policies.contains_key(&arn) {
            return Err(CloudError::AlreadyExists(format!("policy {name}")));
        }

        let descriptor = PolicyDescriptor { name: name.to_owned(), arn: arn.clone() };
        state.policies.insert(
            arn,
            PolicyRecord { descriptor: descriptor.clone(), document: document.to_owned() },
        );
        Ok(descriptor)
    }

    async fn get_policy(&self, arn: &str) -> Result<PolicyDescriptor, CloudError> {
        let state = self.enter(CloudOperation::GetPolicy)?;
        state
            .policies
            .get(arn)
            .map(|policy| policy.descriptor.clone())
            .ok_or_else(|| CloudError::NotFound(format!("policy {arn}")))
    }

    async fn attach_role_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<(), CloudError> {
        let mut state = self.enter(CloudOperation::AttachRolePolicy)?;
        let managed = policy_arn.starts_with("arn:aws:iam::aws:policy/");
        if !managed && !state.policies.contains_key(policy_arn) {
            return Err(CloudError::NotFound(format!("policy {policy_arn}")));
        }

        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| CloudError::NotFound(format!("role {role_name}")))?;
        role.attached.insert(policy_arn.to_owned());
        Ok(())
    }
}

#[async_trait]
impl FunctionApi for InMemoryCloud {
    async fn create_function(
        &self,
        spec: &FunctionSpec,
    ) -> Result<FunctionDescriptor, CloudError> {
        let mut state = self.enter(CloudOperation::CreateFunction)?;
        if state.functions.contains_key(&spec.name) {
            return Err(CloudError::AlreadyExists(format!("function {}", spec.name)));
        }
        if !state.roles.values().any(|role| role.descriptor.arn == spec.role_arn) {
            return Err(CloudError::Validation(format!(
                "the role defined for the function cannot be assumed: {}",
                spec.role_arn
            )));
        }

        let descriptor = FunctionDescriptor {
            name: spec.name.clone(),
            arn: self.account.function_arn(&spec.name),
            role_arn: spec.role_arn.clone(),
            runtime: spec.runtime.clone(),
        };
        state.functions.insert(spec.name.clone(), (descriptor.clone(), spec.clone()));
        Ok(descriptor)
    }

    async fn get_function(&self, name: &str) -> Result<FunctionDescriptor, CloudError> {
        let state = self.enter(CloudOperation::GetFunction)?;
        state
            .functions
            .get(name)
            .map(|(descriptor, _)| descriptor.clone())
            .ok_or_else(|| CloudError::NotFound(format!("function {name}")))
    }
}

#[async_trait]
impl AccountApi for InMemoryCloud {
    async fn caller_account(&self) -> Result<AccountContext, CloudError> {
        let _state = self.enter(CloudOperation::CallerAccount)?;
        Ok(self.account.clone())
    }
}

#[cfg(test)]
mod tests {
    use ticketdesk_core::domain::resources::{AccountContext, TableStatus};

    use super::{CloudOperation, InMemoryCloud};
    use crate::cloud::{CloudError, IdentityApi, TableApi, TableSpec};

    fn cloud() -> InMemoryCloud {
        InMemoryCloud::new(AccountContext {
            region: "us-east-1".to_owned(),
            account_id: "123456789012".to_owned(),
        })
    }

    fn table_spec() -> TableSpec {
        TableSpec { name: "it_support_tickets".to_owned(), key_attribute: "ticket_id".to_owned() }
    }

    #[tokio::test]
    async fn table_turns_active_after_configured_polls() {
        let cloud = cloud().with_activation_polls(2);

        let created = cloud.create_table(&table_spec()).await.expect("create table");
        let first = cloud.describe_table("it_support_tickets").await.expect("describe");
        let second = cloud.describe_table("it_support_tickets").await.expect("describe");

        assert_eq!(created.status, TableStatus::Creating);
        assert_eq!(first.status, TableStatus::Creating);
        assert_eq!(second.status, TableStatus::Active);
    }

    #[tokio::test]
    async fn duplicate_create_reports_already_exists() {
        let cloud = cloud();
        cloud.create_role("r", "{}").await.expect("create role");

        let error = cloud.create_role("r", "{}").await.expect_err("duplicate role");

        assert!(matches!(error, CloudError::AlreadyExists(_)));
        assert_eq!(cloud.role_count(), 1);
        assert_eq!(cloud.calls(CloudOperation::CreateRole), 2);
    }

    #[tokio::test]
    async fn injected_fault_is_consumed_once() {
        let cloud = cloud();
        cloud.fail_next(CloudOperation::GetRole, CloudError::Throttled("slow down".to_owned()));

        let first = cloud.get_role("missing").await;
        let second = cloud.get_role("missing").await;

        assert_eq!(first, Err(CloudError::Throttled("slow down".to_owned())));
        assert!(matches!(second, Err(CloudError::NotFound(_))));
    }

    #[tokio::test]
    async fn attaching_twice_keeps_one_attachment() {
        let cloud = cloud();
        cloud.create_role("r", "{}").await.expect("create role");
        let policy = cloud.create_policy("p", "{}").await.expect("create policy");

        cloud.attach_role_policy("r", &policy.arn).await.expect("attach");
        cloud.attach_role_policy("r", &policy.arn).await.expect("attach again");

        assert_eq!(cloud.attached_policies("r"), vec![policy.arn]);
    }
}
