use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use zip::ZipArchive;

use ticketdesk_core::domain::resources::{
    AccountContext, TableStatus, LAMBDA_BASIC_EXECUTION_POLICY_ARN,
};
use ticketdesk_provision::{
    ArtifactSource, CloudError, CloudOperation, InMemoryCloud, ProvisionError, ProvisionPlan,
    ProvisionSettings, Provisioned, Provisioner, BOOTSTRAP_ENTRY,
};

fn account() -> AccountContext {
    AccountContext { region: "us-east-1".to_owned(), account_id: "123456789012".to_owned() }
}

fn settings() -> ProvisionSettings {
    ProvisionSettings {
        propagation_delay: Duration::ZERO,
        table_poll_interval: Duration::ZERO,
        table_poll_attempts: 5,
        runtime: "provided.al2023".to_owned(),
        handler: "bootstrap".to_owned(),
        architecture: "x86_64".to_owned(),
        timeout_secs: 60,
        memory_mb: 128,
    }
}

fn plan(knowledge_base_id: Option<&str>) -> ProvisionPlan {
    ProvisionPlan {
        agent_name: "it-support".to_owned(),
        foundation_model: "anthropic.claude-3-haiku-20240307-v1:0".to_owned(),
        knowledge_base_id: knowledge_base_id.map(str::to_owned),
        table_name: "it_support_tickets".to_owned(),
        key_attribute: "ticket_id".to_owned(),
        function_name: "it-support-lambda".to_owned(),
        artifact: ArtifactSource::Bytes(b"handler binary".to_vec()),
    }
}

async fn provisioner(cloud: &Arc<InMemoryCloud>, settings: ProvisionSettings) -> Provisioner {
    Provisioner::bootstrap(Arc::clone(cloud), settings).await.expect("resolve account")
}

fn statement_sids(document: &str) -> Vec<String> {
    let document: Value = serde_json::from_str(document).expect("policy json");
    document["Statement"]
        .as_array()
        .expect("statements")
        .iter()
        .filter_map(|statement| statement["Sid"].as_str().map(str::to_owned))
        .collect()
}

#[tokio::test]
async fn second_run_fetches_every_resource_without_duplicates() {
    let cloud = Arc::new(InMemoryCloud::new(account()));
    let provisioner = provisioner(&cloud, settings()).await;

    let first = provisioner.provision(&plan(None)).await.expect("first run");
    let second = provisioner.provision(&plan(None)).await.expect("second run");

    assert!(first.resources().iter().all(|record| record.outcome == "created"));
    assert!(second.resources().iter().all(|record| record.outcome == "existing"));
    assert_eq!(second.created_count(), 0);

    let arns = |report: &ticketdesk_provision::ProvisionReport| {
        report.resources().into_iter().map(|record| record.arn).collect::<Vec<_>>()
    };
    assert_eq!(arns(&first), arns(&second));
    assert_eq!(first.resources().len(), 6);

    assert_eq!(cloud.table_count(), 1);
    assert_eq!(cloud.role_count(), 2);
    assert_eq!(cloud.policy_count(), 2);
    assert_eq!(cloud.function_count(), 1);
}

#[tokio::test]
async fn fatal_fault_aborts_without_rollback_and_rerun_converges() {
    let cloud = Arc::new(InMemoryCloud::new(account()));
    let provisioner = provisioner(&cloud, settings()).await;
    cloud.fail_next(
        CloudOperation::CreateFunction,
        CloudError::PermissionDenied("not authorized to perform lambda:CreateFunction".to_owned()),
    );

    let error = provisioner.provision(&plan(None)).await.expect_err("function step fails");

    assert!(matches!(
        error,
        ProvisionError::Cloud { step: "create_function", source: CloudError::PermissionDenied(_) }
    ));
    assert_eq!(error.error_class(), "permission_denied");
    assert_eq!(cloud.table_count(), 1);
    assert_eq!(cloud.role_count(), 1);
    assert_eq!(cloud.function_count(), 0);

    let report = provisioner.provision(&plan(None)).await.expect("rerun");

    assert!(matches!(report.table, Provisioned::Existing(_)));
    assert!(matches!(report.compute_identity.role, Provisioned::Existing(_)));
    assert!(matches!(report.function, Provisioned::Created(_)));
    assert!(matches!(report.agent_identity.role, Provisioned::Created(_)));
    assert_eq!(cloud.function_count(), 1);
}

#[tokio::test]
async fn failed_fetch_after_conflict_is_fatal() {
    let cloud = Arc::new(InMemoryCloud::new(account()));
    let provisioner = provisioner(&cloud, settings()).await;
    cloud.fail_next(CloudOperation::CreateRole, CloudError::AlreadyExists("role".to_owned()));

    let error = provisioner
        .ensure_compute_identity("it-support", "it_support_tickets")
        .await
        .expect_err("role cannot be fetched");

    assert!(matches!(
        error,
        ProvisionError::Cloud { step: "get_role", source: CloudError::NotFound(_) }
    ));
}

#[tokio::test]
async fn knowledge_base_statement_only_with_knowledge_base_id() {
    let cloud = Arc::new(InMemoryCloud::new(account()));
    let provisioner = provisioner(&cloud, settings()).await;

    let without = provisioner
        .ensure_agent_identity("plain", "model-a", None)
        .await
        .expect("agent identity");
    let with = provisioner
        .ensure_agent_identity("retriever", "model-a", Some("KB123"))
        .await
        .expect("agent identity with kb");

    let plain_doc =
        cloud.policy_document(&without.policy.resource().arn).expect("plain policy stored");
    let kb_doc = cloud.policy_document(&with.policy.resource().arn).expect("kb policy stored");

    assert_eq!(statement_sids(&plain_doc), vec!["AmazonBedrockAgentBedrockFoundationModelPolicy"]);
    assert_eq!(
        statement_sids(&kb_doc),
        vec!["AmazonBedrockAgentBedrockFoundationModelPolicy", "QueryKB"]
    );
    assert!(kb_doc.contains("arn:aws:bedrock:us-east-1:123456789012:knowledge-base/KB123"));
    assert_eq!(without.role.resource().name, "AmazonBedrockExecutionRoleForAgents_plain");
    assert_eq!(cloud.attached_policies("AmazonBedrockExecutionRoleForAgents_plain").len(), 1);
}

#[tokio::test]
async fn table_is_polled_until_active() {
    let cloud = Arc::new(InMemoryCloud::new(account()).with_activation_polls(3));
    let provisioner = provisioner(&cloud, settings()).await;

    let table = provisioner.ensure_table("it_support_tickets", "ticket_id").await.expect("table");

    assert!(table.was_created());
    assert_eq!(table.resource().status, TableStatus::Active);
    assert_eq!(table.resource().key_attribute, "ticket_id");
    assert_eq!(cloud.calls(CloudOperation::DescribeTable), 3);
}

#[tokio::test]
async fn table_that_never_activates_is_fatal() {
    let cloud = Arc::new(InMemoryCloud::new(account()).with_activation_polls(10));
    let provisioner = provisioner(&cloud, ProvisionSettings { table_poll_attempts: 2, ..settings() }).await;

    let error = provisioner.ensure_table("slow_table", "ticket_id").await.expect_err("times out");

    assert!(matches!(error, ProvisionError::TableNotActive { attempts: 2, .. }));
    assert_eq!(cloud.calls(CloudOperation::DescribeTable), 2);
}

#[tokio::test]
async fn compute_identity_scopes_table_policy_and_attaches_both_policies() {
    let cloud = Arc::new(InMemoryCloud::new(account()));
    let provisioner = provisioner(&cloud, settings()).await;

    let identity = provisioner
        .ensure_compute_identity("it-support", "it_support_tickets")
        .await
        .expect("compute identity");

    let policy = identity.policy.resource();
    assert_eq!(policy.name, "it-support-dynamodb-policy");
    assert_eq!(policy.arn, "arn:aws:iam::123456789012:policy/it-support-dynamodb-policy");

    let document: Value =
        serde_json::from_str(&cloud.policy_document(&policy.arn).expect("document")).expect("json");
    assert_eq!(
        document["Statement"][0]["Resource"][0],
        "arn:aws:dynamodb:us-east-1:123456789012:table/it_support_tickets"
    );

    let attached = cloud.attached_policies("it-support-lambda-role");
    assert!(attached.contains(&LAMBDA_BASIC_EXECUTION_POLICY_ARN.to_owned()));
    assert!(attached.contains(&policy.arn));

    let trust = cloud.trust_policy("it-support-lambda-role").expect("trust policy");
    assert!(trust.contains("lambda.amazonaws.com"));
}

#[tokio::test]
async fn function_is_packaged_and_pointed_at_the_table() {
    let cloud = Arc::new(InMemoryCloud::new(account()));
    let provisioner = provisioner(&cloud, settings()).await;

    provisioner.provision(&plan(None)).await.expect("provision");

    let spec = cloud.function_spec("it-support-lambda").expect("function stored");
    assert_eq!(spec.environment.get("TICKET_TABLE_NAME").map(String::as_str), Some("it_support_tickets"));
    assert_eq!(spec.role_arn, "arn:aws:iam::123456789012:role/it-support-lambda-role");
    assert_eq!(spec.runtime, "provided.al2023");
    assert_eq!(spec.handler, "bootstrap");
    assert_eq!(spec.timeout_secs, 60);

    let mut archive = ZipArchive::new(Cursor::new(spec.archive)).expect("zip archive");
    let entry = archive.by_name(BOOTSTRAP_ENTRY).expect("bootstrap entry");
    assert_eq!(entry.unix_mode().map(|mode| mode & 0o777), Some(0o755));
}

#[tokio::test(start_paused = true)]
async fn propagation_delay_only_follows_role_creation() {
    let cloud = Arc::new(InMemoryCloud::new(account()));
    let provisioner = provisioner(
        &cloud,
        ProvisionSettings { propagation_delay: Duration::from_secs(10), ..settings() },
    )
    .await;

    let started = tokio::time::Instant::now();
    provisioner.provision(&plan(None)).await.expect("first run");
    let first_run = started.elapsed();

    let restarted = tokio::time::Instant::now();
    provisioner.provision(&plan(None)).await.expect("second run");
    let second_run = restarted.elapsed();

    assert!(first_run >= Duration::from_secs(20));
    assert!(second_run < Duration::from_secs(1));
}
