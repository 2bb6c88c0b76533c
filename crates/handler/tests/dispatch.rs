use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use ticketdesk_core::domain::ticket::{Ticket, TicketId};
use ticketdesk_db::{DeleteAck, InMemoryTicketRepository, RepositoryError, TicketRepository};
use ticketdesk_handler::{InvocationEnvelope, Parameter, TicketDispatcher};
use tracing_subscriber::fmt::MakeWriter;

/// Wraps the in-memory store and counts mutations.
#[derive(Default)]
struct RecordingRepository {
    inner: InMemoryTicketRepository,
    saves: AtomicUsize,
    deletes: AtomicUsize,
}

impl RecordingRepository {
    fn mutations(&self) -> usize {
        self.saves.load(Ordering::SeqCst) + self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TicketRepository for RecordingRepository {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(ticket).await
    }

    async fn delete(&self, id: &TicketId) -> Result<DeleteAck, RepositoryError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(id).await
    }
}

struct FailingRepository;

#[async_trait]
impl TicketRepository for FailingRepository {
    async fn find_by_id(&self, _id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        Err(RepositoryError::Service("ResourceNotFoundException: table missing".to_string()))
    }

    async fn save(&self, _ticket: Ticket) -> Result<(), RepositoryError> {
        Err(RepositoryError::Service("ResourceNotFoundException: table missing".to_string()))
    }

    async fn delete(&self, _id: &TicketId) -> Result<DeleteAck, RepositoryError> {
        Ok(DeleteAck { status_code: 500 })
    }
}

/// Collects formatted log lines for assertions.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        let bytes = self.0.lock().expect("log buffer lock").clone();
        String::from_utf8(bytes).expect("log output is utf-8")
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn dispatcher() -> (TicketDispatcher, Arc<RecordingRepository>) {
    let repository = Arc::new(RecordingRepository::default());
    let dispatcher = TicketDispatcher::for_repository(repository.clone());
    (dispatcher, repository)
}

fn create_envelope(priority: &str) -> InvocationEnvelope {
    InvocationEnvelope::new(
        "create_support_ticket",
        vec![
            Parameter::new("occurred_at", "2024-01-01T10:00:00Z"),
            Parameter::new("subject", "login failure"),
            Parameter::new("details", "stack trace X"),
            Parameter::new("priority", priority),
        ],
    )
}

fn lookup(function: &str, ticket_id: &str) -> InvocationEnvelope {
    InvocationEnvelope::new(function, vec![Parameter::new("ticket_id", ticket_id)])
}

fn body_json(body: &str) -> Value {
    serde_json::from_str(body).expect("body should be JSON")
}

#[tokio::test]
async fn create_then_get_returns_stored_ticket_with_integer_priority() {
    let (dispatcher, repository) = dispatcher();

    let created = dispatcher.dispatch(create_envelope("2")).await;
    let ticket_id = body_json(created.body())["ticket_id"]
        .as_str()
        .expect("ticket_id should be a string")
        .to_string();
    assert_eq!(ticket_id.len(), 8);
    assert!(ticket_id.chars().all(|c| c.is_ascii_hexdigit()));

    let fetched = dispatcher.dispatch(lookup("get_support_ticket_details", &ticket_id)).await;

    assert_eq!(
        body_json(fetched.body()),
        json!({
            "ticket_id": ticket_id,
            "occurred_at": "2024-01-01T10:00:00Z",
            "subject": "login failure",
            "details": "stack trace X",
            "priority": 2
        })
    );
    assert_eq!(repository.saves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_id_reports_not_found_message() {
    let (dispatcher, _) = dispatcher();

    let response = dispatcher.dispatch(lookup("get_support_ticket_details", "zzzzzzzz")).await;

    assert_eq!(response.body(), r#"{"message":"No support ticket found with ID zzzzzzzz"}"#);
}

#[tokio::test]
async fn unknown_function_is_rejected_without_mutation() {
    let (dispatcher, repository) = dispatcher();

    let response = dispatcher.dispatch(lookup("update_support_ticket", "abcd1234")).await;

    assert_eq!(response.body(), "Invalid function");
    assert_eq!(response.response.function, "update_support_ticket");
    assert_eq!(repository.mutations(), 0);
}

#[tokio::test]
async fn create_missing_any_required_parameter_is_rejected_without_mutation() {
    for omitted in ["occurred_at", "subject", "details", "priority"] {
        let (dispatcher, repository) = dispatcher();
        let mut envelope = create_envelope("2");
        envelope.parameters.retain(|parameter| parameter.name != omitted);

        let response = dispatcher.dispatch(envelope).await;

        assert_eq!(response.body(), "Missing required parameters", "omitted {omitted}");
        assert_eq!(repository.mutations(), 0, "omitted {omitted}");
    }
}

#[tokio::test]
async fn null_parameters_report_missing_parameter_for_known_function() {
    let (dispatcher, repository) = dispatcher();
    let envelope = InvocationEnvelope::from_value(json!({
        "messageVersion": "1.0",
        "actionGroup": "tickets",
        "function": "get_support_ticket_details",
        "parameters": null
    }));

    let response = dispatcher.dispatch(envelope).await;

    assert_eq!(response.body(), "Missing ticket_id parameter");
    assert_eq!(response.response.action_group, "tickets");
    assert_eq!(response.response.function, "get_support_ticket_details");
    assert_eq!(repository.mutations(), 0);
}

#[tokio::test]
async fn malformed_parameter_entry_does_not_hide_valid_ones() {
    let (dispatcher, _) = dispatcher();
    let envelope = InvocationEnvelope::from_value(json!({
        "messageVersion": "1.0",
        "actionGroup": "tickets",
        "function": "get_support_ticket_details",
        "parameters": [
            {"name": null, "type": "string", "value": "x"},
            {"name": "ticket_id", "type": "string", "value": "zzzzzzzz"}
        ]
    }));

    let response = dispatcher.dispatch(envelope).await;

    assert_eq!(response.body(), r#"{"message":"No support ticket found with ID zzzzzzzz"}"#);
    assert_eq!(response.response.action_group, "tickets");
}

#[tokio::test]
async fn empty_parameter_value_counts_as_missing() {
    let (dispatcher, repository) = dispatcher();

    let get = dispatcher.dispatch(lookup("get_support_ticket_details", "")).await;
    let delete = dispatcher.dispatch(lookup("delete_support_ticket", "")).await;

    assert_eq!(get.body(), "Missing ticket_id parameter");
    assert_eq!(delete.body(), "Missing ticket_id parameter");
    assert_eq!(repository.mutations(), 0);
}

#[tokio::test]
async fn non_integer_priority_yields_error_body_without_mutation() {
    let (dispatcher, repository) = dispatcher();

    let response = dispatcher.dispatch(create_envelope("high")).await;

    let body = body_json(response.body());
    assert!(body["error"].as_str().expect("error message").contains("high"));
    assert_eq!(repository.mutations(), 0);
}

#[tokio::test]
async fn delete_then_get_reports_not_found() {
    let (dispatcher, repository) = dispatcher();
    let created = dispatcher.dispatch(create_envelope("3")).await;
    let ticket_id = body_json(created.body())["ticket_id"].as_str().expect("id").to_string();

    let deleted = dispatcher.dispatch(lookup("delete_support_ticket", &ticket_id)).await;
    let fetched = dispatcher.dispatch(lookup("get_support_ticket_details", &ticket_id)).await;

    assert_eq!(
        body_json(deleted.body()),
        json!({ "message": format!("Support Ticket with ID {ticket_id} deleted successfully") })
    );
    assert_eq!(
        body_json(fetched.body()),
        json!({ "message": format!("No support ticket found with ID {ticket_id}") })
    );
    assert_eq!(repository.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn delete_of_unknown_id_still_reports_success() {
    let (dispatcher, _) = dispatcher();

    let response = dispatcher.dispatch(lookup("delete_support_ticket", "zzzzzzzz")).await;

    assert_eq!(
        response.body(),
        r#"{"message":"Support Ticket with ID zzzzzzzz deleted successfully"}"#
    );
}

#[tokio::test]
async fn storage_faults_are_reported_in_the_body() {
    let dispatcher = TicketDispatcher::for_repository(Arc::new(FailingRepository));

    let get = dispatcher.dispatch(lookup("get_support_ticket_details", "abcd1234")).await;
    let create = dispatcher.dispatch(create_envelope("1")).await;
    let delete = dispatcher.dispatch(lookup("delete_support_ticket", "abcd1234")).await;

    assert!(body_json(get.body())["error"].as_str().expect("error").contains("table missing"));
    assert!(body_json(create.body())["error"].is_string());
    assert_eq!(
        delete.body(),
        r#"{"message":"Failed to delete support ticket with ID abcd1234"}"#
    );
}

#[tokio::test]
async fn response_echoes_action_group_and_version() {
    let (dispatcher, _) = dispatcher();
    let envelope = InvocationEnvelope::from_value(json!({
        "messageVersion": "1.0",
        "actionGroup": "it-support-actions",
        "function": "get_support_ticket_details",
        "parameters": [{"name": "ticket_id", "type": "string", "value": "zzzzzzzz"}]
    }));

    let response = dispatcher.dispatch(envelope).await;
    let wire = serde_json::to_value(&response).expect("serialize");

    assert_eq!(wire["messageVersion"], "1.0");
    assert_eq!(wire["response"]["actionGroup"], "it-support-actions");
    assert_eq!(wire["response"]["function"], "get_support_ticket_details");
    assert!(wire["response"]["functionResponse"]["responseBody"]["TEXT"]["body"].is_string());
}

#[tokio::test]
async fn every_response_is_logged_with_its_outcome_and_body() {
    let logs = CapturedLogs::default();
    let subscriber =
        tracing_subscriber::fmt().with_ansi(false).with_writer(logs.clone()).finish();
    let _guard = tracing::subscriber::set_default(subscriber);
    let (dispatcher, _) = dispatcher();

    dispatcher.dispatch(lookup("get_support_ticket_details", "zzzzzzzz")).await;
    dispatcher.dispatch(lookup("close_ticket", "zzzzzzzz")).await;

    let output = logs.contents();
    assert_eq!(output.matches("handler.dispatch.responded").count(), 2);
    assert!(output.contains("No support ticket found with ID zzzzzzzz"));
    assert!(output.contains("outcome=\"invalid_function\""));
    assert!(output.contains("Invalid function"));
}
