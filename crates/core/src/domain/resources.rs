use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const LAMBDA_SERVICE_PRINCIPAL: &str = "lambda.amazonaws.com";
pub const BEDROCK_SERVICE_PRINCIPAL: &str = "bedrock.amazonaws.com";
pub const LAMBDA_BASIC_EXECUTION_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";
pub const AGENT_ROLE_PREFIX: &str = "AmazonBedrockExecutionRoleForAgents_";

const MAX_ROLE_NAME_LEN: usize = 64;

/// Region and account the provisioner runs against, resolved once per run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    pub region: String,
    pub account_id: String,
}

impl AccountContext {
    pub fn table_arn(&self, table_name: &str) -> String {
        format!("arn:aws:dynamodb:{}:{}:table/{}", self.region, self.account_id, table_name)
    }

    pub fn policy_arn(&self, policy_name: &str) -> String {
        format!("arn:aws:iam::{}:policy/{}", self.account_id, policy_name)
    }

    pub fn role_arn(&self, role_name: &str) -> String {
        format!("arn:aws:iam::{}:role/{}", self.account_id, role_name)
    }

    pub fn function_arn(&self, function_name: &str) -> String {
        format!("arn:aws:lambda:{}:{}:function:{}", self.region, self.account_id, function_name)
    }

    pub fn foundation_model_arn(&self, model_id: &str) -> String {
        format!("arn:aws:bedrock:{}::foundation-model/{}", self.region, model_id)
    }

    pub fn knowledge_base_arn(&self, knowledge_base_id: &str) -> String {
        format!(
            "arn:aws:bedrock:{}:{}:knowledge-base/{}",
            self.region, self.account_id, knowledge_base_id
        )
    }
}

/// Names of every identity object derived from one agent name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResourceNames {
    pub agent_name: String,
    pub lambda_role: String,
    pub table_policy: String,
    pub agent_role: String,
    pub agent_policy: String,
}

impl ResourceNames {
    pub fn for_agent(agent_name: &str) -> Result<Self, DomainError> {
        validate_agent_name(agent_name)?;
        Ok(Self {
            agent_name: agent_name.to_owned(),
            lambda_role: format!("{agent_name}-lambda-role"),
            table_policy: format!("{agent_name}-dynamodb-policy"),
            agent_role: format!("{AGENT_ROLE_PREFIX}{agent_name}"),
            agent_policy: format!("{agent_name}-ba"),
        })
    }

    pub fn default_function_name(agent_name: &str) -> String {
        format!("{agent_name}-lambda")
    }
}

pub fn validate_agent_name(agent_name: &str) -> Result<(), DomainError> {
    let invalid = |reason: &str| DomainError::InvalidResourceName {
        name: agent_name.to_owned(),
        reason: reason.to_owned(),
    };

    if agent_name.is_empty() {
        return Err(invalid("agent name must not be empty"));
    }
    if !agent_name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_') {
        return Err(invalid("only ASCII letters, digits, `-` and `_` are allowed"));
    }
    if AGENT_ROLE_PREFIX.len() + agent_name.len() > MAX_ROLE_NAME_LEN {
        return Err(invalid("derived agent role name exceeds 64 characters"));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Table,
    Role,
    Policy,
    Function,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Role => "role",
            Self::Policy => "policy",
            Self::Function => "function",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Creating,
    Active,
    Updating,
    Deleting,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub arn: String,
    pub key_attribute: String,
    pub status: TableStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDescriptor {
    pub name: String,
    pub arn: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDescriptor {
    pub name: String,
    pub arn: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub arn: String,
    pub role_arn: String,
    pub runtime: String,
}

#[cfg(test)]
mod tests {
    use super::{AccountContext, ResourceNames, AGENT_ROLE_PREFIX};

    fn account() -> AccountContext {
        AccountContext { region: "us-east-1".to_owned(), account_id: "123456789012".to_owned() }
    }

    #[test]
    fn names_are_derived_from_agent_name() {
        let names = ResourceNames::for_agent("it-support").expect("valid agent name");

        assert_eq!(names.lambda_role, "it-support-lambda-role");
        assert_eq!(names.table_policy, "it-support-dynamodb-policy");
        assert_eq!(names.agent_role, "AmazonBedrockExecutionRoleForAgents_it-support");
        assert_eq!(names.agent_policy, "it-support-ba");
        assert_eq!(ResourceNames::default_function_name("it-support"), "it-support-lambda");
    }

    #[test]
    fn agent_names_are_validated() {
        assert!(ResourceNames::for_agent("").is_err());
        assert!(ResourceNames::for_agent("has space").is_err());
        assert!(ResourceNames::for_agent(&"a".repeat(64 - AGENT_ROLE_PREFIX.len())).is_ok());
        assert!(ResourceNames::for_agent(&"a".repeat(65 - AGENT_ROLE_PREFIX.len())).is_err());
    }

    #[test]
    fn arns_are_region_and_account_qualified() {
        let account = account();

        assert_eq!(
            account.table_arn("it_support_tickets"),
            "arn:aws:dynamodb:us-east-1:123456789012:table/it_support_tickets"
        );
        assert_eq!(
            account.policy_arn("agent-ba"),
            "arn:aws:iam::123456789012:policy/agent-ba"
        );
        assert_eq!(
            account.foundation_model_arn("anthropic.claude-3-haiku-20240307-v1:0"),
            "arn:aws:bedrock:us-east-1::foundation-model/anthropic.claude-3-haiku-20240307-v1:0"
        );
        assert_eq!(
            account.knowledge_base_arn("KB123"),
            "arn:aws:bedrock:us-east-1:123456789012:knowledge-base/KB123"
        );
    }
}
