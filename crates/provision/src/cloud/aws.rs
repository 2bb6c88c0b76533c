use std::error::Error as StdError;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
    TableDescription, TableStatus as SdkTableStatus,
};
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{Architecture, Environment, FunctionCode, Runtime};
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use tracing::debug;

use ticketdesk_core::config::AwsConfig;
use ticketdesk_core::domain::resources::{
    AccountContext, FunctionDescriptor, PolicyDescriptor, RoleDescriptor, TableDescriptor,
    TableStatus,
};

use super::{
    classify_code, AccountApi, CloudError, FunctionApi, FunctionSpec, IdentityApi, TableApi,
    TableSpec,
};

/// SDK clients for every plane the provisioner touches, built from one shared config.
#[derive(Clone, Debug)]
pub struct AwsCloud {
    dynamodb: aws_sdk_dynamodb::Client,
    iam: aws_sdk_iam::Client,
    lambda: aws_sdk_lambda::Client,
    sts: aws_sdk_sts::Client,
    region: Option<String>,
}

impl AwsCloud {
    pub fn from_sdk_config(config: &SdkConfig) -> Self {
        Self {
            dynamodb: aws_sdk_dynamodb::Client::new(config),
            iam: aws_sdk_iam::Client::new(config),
            lambda: aws_sdk_lambda::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
            region: config.region().map(ToString::to_string),
        }
    }

    pub async fn connect(aws: &AwsConfig) -> Self {
        Self::from_sdk_config(&ticketdesk_db::load_sdk_config(aws).await)
    }
}

fn classify<E>(error: E) -> CloudError
where
    E: ProvideErrorMetadata + StdError + 'static,
{
    let code = error.code().map(str::to_owned);
    classify_code(code.as_deref(), DisplayErrorContext(&error).to_string())
}

fn missing(operation: &str, field: &str) -> CloudError {
    CloudError::Service(format!("{operation} response carried no {field}"))
}

fn table_descriptor(description: &TableDescription, requested_name: &str) -> TableDescriptor {
    let status = match description.table_status() {
        Some(SdkTableStatus::Active) => TableStatus::Active,
        Some(SdkTableStatus::Creating) => TableStatus::Creating,
        Some(SdkTableStatus::Updating) => TableStatus::Updating,
        Some(SdkTableStatus::Deleting) => TableStatus::Deleting,
        _ => TableStatus::Other,
    };

    TableDescriptor {
        name: description.table_name().unwrap_or(requested_name).to_owned(),
        arn: description.table_arn().unwrap_or_default().to_owned(),
        key_attribute: description
            .key_schema()
            .first()
            .map(|element| element.attribute_name().to_owned())
            .unwrap_or_default(),
        status,
    }
}

#[async_trait]
impl TableApi for AwsCloud {
    async fn create_table(&self, spec: &TableSpec) -> Result<TableDescriptor, CloudError> {
        let key = KeySchemaElement::builder()
            .attribute_name(&spec.key_attribute)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|error| CloudError::Validation(error.to_string()))?;
        let attribute = AttributeDefinition::builder()
            .attribute_name(&spec.key_attribute)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|error| CloudError::Validation(error.to_string()))?;

        let output = self
            .dynamodb
            .create_table()
            .table_name(&spec.name)
            .key_schema(key)
            .attribute_definitions(attribute)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .map_err(|error| {
                if error.as_service_error().is_some_and(|e| e.is_resource_in_use_exception()) {
                    CloudError::AlreadyExists(format!("table {}", spec.name))
                } else {
                    classify(error)
                }
            })?;

        output
            .table_description()
            .map(|description| table_descriptor(description, &spec.name))
            .ok_or_else(|| missing("CreateTable", "table description"))
    }

    async fn describe_table(&self, name: &str) -> Result<TableDescriptor, CloudError> {
        let output = self
            .dynamodb
            .describe_table()
            .table_name(name)
            .send()
            .await
            .map_err(|error| {
                if error.as_service_error().is_some_and(|e| e.is_resource_not_found_exception()) {
                    CloudError::NotFound(format!("table {name}"))
                } else {
                    classify(error)
                }
            })?;

        let descriptor = output
            .table()
            .map(|description| table_descriptor(description, name))
            .ok_or_else(|| missing("DescribeTable", "table"))?;
        debug!(table = %name, status = ?descriptor.status, "describe_table");
        Ok(descriptor)
    }
}

#[async_trait]
impl IdentityApi for AwsCloud {
    async fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
    ) -> Result<RoleDescriptor, CloudError> {
        let output = self
            .iam
            .create_role()
            .role_name(name)
            .assume_role_policy_document(trust_policy)
            .send()
            .await
            .map_err(|error| {
                if error.as_service_error().is_some_and(|e| e.is_entity_already_exists_exception())
                {
                    CloudError::AlreadyExists(format!("role {name}"))
                } else {
                    classify(error)
                }
            })?;

        let role = output.role().ok_or_else(|| missing("CreateRole", "role"))?;
        Ok(RoleDescriptor { name: role.role_name().to_owned(), arn: role.arn().to_owned() })
    }

    async fn get_role(&self, name: &str) -> Result<RoleDescriptor, CloudError> {
        let output = self.iam.get_role().role_name(name).send().await.map_err(|error| {
            if error.as_service_error().is_some_and(|e| e.is_no_such_entity_exception()) {
                CloudError::NotFound(format!("role {name}"))
            } else {
                classify(error)
            }
        })?;

        let role = output.role().ok_or_else(|| missing("GetRole", "role"))?;
        Ok(RoleDescriptor { name: role.role_name().to_owned(), arn: role.arn().to_owned() })
    }

    async fn create_policy(
        &self,
        name: &str,
        document: &str,
    ) -> Result<PolicyDescriptor, CloudError> {
        let output = self
            .iam
            .create_policy()
            .policy_name(name)
            .policy_document(document)
            .send()
            .await
            .map_err(|error| {
                if error.as_service_error().is_some_and(|e| e.is_entity_already_exists_exception())
                {
                    CloudError::AlreadyExists(format!("policy {name}"))
                } else {
                    classify(error)
                }
            })?;

        let policy = output.policy().ok_or_else(|| missing("CreatePolicy", "policy"))?;
        Ok(PolicyDescriptor {
            name: policy.policy_name().unwrap_or(name).to_owned(),
            arn: policy.arn().ok_or_else(|| missing("CreatePolicy", "policy arn"))?.to_owned(),
        })
    }

    async fn get_policy(&self, arn: &str) -> Result<PolicyDescriptor, CloudError> {
        let output = self.iam.get_policy().policy_arn(arn).send().await.map_err(|error| {
            if error.as_service_error().is_some_and(|e| e.is_no_such_entity_exception()) {
                CloudError::NotFound(format!("policy {arn}"))
            } else {
                classify(error)
            }
        })?;

        let policy = output.policy().ok_or_else(|| missing("GetPolicy", "policy"))?;
        Ok(PolicyDescriptor {
            name: policy.policy_name().unwrap_or_default().to_owned(),
            arn: policy.arn().unwrap_or(arn).to_owned(),
        })
    }

    async fn attach_role_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<(), CloudError> {
        self.iam
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(classify)?;
        debug!(role = %role_name, policy_arn = %policy_arn, "attach_role_policy");
        Ok(())
    }
}

#[async_trait]
impl FunctionApi for AwsCloud {
    async fn create_function(
        &self,
        spec: &FunctionSpec,
    ) -> Result<FunctionDescriptor, CloudError> {
        let timeout = i32::try_from(spec.timeout_secs).map_err(|_| {
            CloudError::Validation(format!("timeout {}s out of range", spec.timeout_secs))
        })?;
        let memory = i32::try_from(spec.memory_mb).map_err(|_| {
            CloudError::Validation(format!("memory {}MB out of range", spec.memory_mb))
        })?;
        let environment = Environment::builder()
            .set_variables(Some(spec.environment.clone().into_iter().collect()))
            .build();
        let code = FunctionCode::builder().zip_file(Blob::new(spec.archive.clone())).build();

        let output = self
            .lambda
            .create_function()
            .function_name(&spec.name)
            .runtime(Runtime::from(spec.runtime.as_str()))
            .role(&spec.role_arn)
            .handler(&spec.handler)
            .timeout(timeout)
            .memory_size(memory)
            .architectures(Architecture::from(spec.architecture.as_str()))
            .environment(environment)
            .code(code)
            .send()
            .await
            .map_err(|error| {
                if error.as_service_error().is_some_and(|e| e.is_resource_conflict_exception()) {
                    CloudError::AlreadyExists(format!("function {}", spec.name))
                } else {
                    classify(error)
                }
            })?;

        Ok(FunctionDescriptor {
            name: output.function_name().unwrap_or(&spec.name).to_owned(),
            arn: output
                .function_arn()
                .ok_or_else(|| missing("CreateFunction", "function arn"))?
                .to_owned(),
            role_arn: output.role().unwrap_or(&spec.role_arn).to_owned(),
            runtime: output
                .runtime()
                .map(|runtime| runtime.as_str())
                .unwrap_or(&spec.runtime)
                .to_owned(),
        })
    }

    async fn get_function(&self, name: &str) -> Result<FunctionDescriptor, CloudError> {
        let output =
            self.lambda.get_function().function_name(name).send().await.map_err(|error| {
                if error.as_service_error().is_some_and(|e| e.is_resource_not_found_exception()) {
                    CloudError::NotFound(format!("function {name}"))
                } else {
                    classify(error)
                }
            })?;

        let configuration =
            output.configuration().ok_or_else(|| missing("GetFunction", "configuration"))?;
        Ok(FunctionDescriptor {
            name: configuration.function_name().unwrap_or(name).to_owned(),
            arn: configuration
                .function_arn()
                .ok_or_else(|| missing("GetFunction", "function arn"))?
                .to_owned(),
            role_arn: configuration.role().unwrap_or_default().to_owned(),
            runtime: configuration
                .runtime()
                .map(|runtime| runtime.as_str().to_owned())
                .unwrap_or_default(),
        })
    }
}

#[async_trait]
impl AccountApi for AwsCloud {
    async fn caller_account(&self) -> Result<AccountContext, CloudError> {
        let region = self.region.clone().ok_or_else(|| {
            CloudError::Validation("no region configured; set aws.region or AWS_REGION".to_owned())
        })?;
        let output = self.sts.get_caller_identity().send().await.map_err(classify)?;
        let account_id =
            output.account().ok_or_else(|| missing("GetCallerIdentity", "account"))?.to_owned();

        Ok(AccountContext { region, account_id })
    }
}
