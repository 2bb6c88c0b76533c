//! Fixed IAM documents attached to the provisioned identities.
//!
//! Statements are hard-coded; the only inputs are resource identifiers.

use serde::{Deserialize, Serialize};

use crate::domain::resources::{AccountContext, BEDROCK_SERVICE_PRINCIPAL, LAMBDA_SERVICE_PRINCIPAL};

pub const POLICY_VERSION: &str = "2012-10-17";
pub const FOUNDATION_MODEL_SID: &str = "AmazonBedrockAgentBedrockFoundationModelPolicy";
pub const KNOWLEDGE_BASE_SID: &str = "QueryKB";

pub const TABLE_ACTIONS: &[&str] = &["dynamodb:GetItem", "dynamodb:PutItem", "dynamodb:DeleteItem"];
pub const MODEL_ACTIONS: &[&str] = &["bedrock:InvokeModel"];
pub const KNOWLEDGE_BASE_ACTIONS: &[&str] = &["bedrock:Retrieve", "bedrock:RetrieveAndGenerate"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Statement")]
    pub statements: Vec<Statement>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "Sid", skip_serializing_if = "Option::is_none", default)]
    pub sid: Option<String>,
    #[serde(rename = "Effect")]
    pub effect: Effect,
    #[serde(rename = "Principal", skip_serializing_if = "Option::is_none", default)]
    pub principal: Option<Principal>,
    #[serde(rename = "Action")]
    pub actions: Vec<String>,
    #[serde(rename = "Resource", skip_serializing_if = "Vec::is_empty", default)]
    pub resources: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(rename = "Service")]
    pub service: String,
}

impl PolicyDocument {
    fn new(statements: Vec<Statement>) -> Self {
        Self { version: POLICY_VERSION.to_owned(), statements }
    }

    /// Trust policy letting `service` assume the role.
    pub fn assume_role(service: &str) -> Self {
        Self::new(vec![Statement {
            sid: None,
            effect: Effect::Allow,
            principal: Some(Principal { service: service.to_owned() }),
            actions: vec!["sts:AssumeRole".to_owned()],
            resources: Vec::new(),
        }])
    }

    pub fn lambda_trust() -> Self {
        Self::assume_role(LAMBDA_SERVICE_PRINCIPAL)
    }

    pub fn agent_trust() -> Self {
        Self::assume_role(BEDROCK_SERVICE_PRINCIPAL)
    }

    /// Get/put/delete on exactly one table.
    pub fn table_access(account: &AccountContext, table_name: &str) -> Self {
        Self::new(vec![allow(None, TABLE_ACTIONS, account.table_arn(table_name))])
    }

    /// Model invocation, plus retrieval when a knowledge base is attached.
    pub fn agent_access(
        account: &AccountContext,
        foundation_model_id: &str,
        knowledge_base_id: Option<&str>,
    ) -> Self {
        let mut statements = vec![allow(
            Some(FOUNDATION_MODEL_SID),
            MODEL_ACTIONS,
            account.foundation_model_arn(foundation_model_id),
        )];
        if let Some(knowledge_base_id) = knowledge_base_id {
            statements.push(allow(
                Some(KNOWLEDGE_BASE_SID),
                KNOWLEDGE_BASE_ACTIONS,
                account.knowledge_base_arn(knowledge_base_id),
            ));
        }
        Self::new(statements)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn allow(sid: Option<&str>, actions: &[&str], resource: String) -> Statement {
    Statement {
        sid: sid.map(str::to_owned),
        effect: Effect::Allow,
        principal: None,
        actions: actions.iter().map(|action| (*action).to_owned()).collect(),
        resources: vec![resource],
    }
}
