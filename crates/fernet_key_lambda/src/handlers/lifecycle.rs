use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::adapters::response_sender::ResponseSender;
use crate::adapters::secret_store::SecretStore;
use crate::runtime::config::HandlerConfig;
use crate::runtime::contract::{
    extract_response_envelope, parse_lifecycle_event, LifecycleEvent, RequestType,
    ResponseEnvelope,
};
use crate::runtime::keygen::FernetKey;
use crate::runtime::response::{
    resolve_physical_resource_id, CustomResourceResponse, ResponseStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LifecycleOutcome {
    pub request_type: RequestType,
    pub status: ResponseStatus,
    pub physical_resource_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleError {
    pub message: String,
    /// A FAILED document already reached CloudFormation.
    pub response_delivered: bool,
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for LifecycleError {}

/// Runs one custom-resource request end to end: dispatch on `RequestType`,
/// then report SUCCESS or FAILED to the request's `ResponseURL`.
///
/// Returns `Err` whenever the lifecycle operation did not succeed, including
/// when the outcome could not be reported.
pub fn handle_lifecycle_event(
    event: Value,
    config: &HandlerConfig,
    secret_store: &impl SecretStore,
    response_sender: &impl ResponseSender,
) -> Result<LifecycleOutcome, LifecycleError> {
    let Some(envelope) = extract_response_envelope(&event) else {
        let message =
            "Lifecycle event is missing ResponseURL, StackId, RequestId, or LogicalResourceId"
                .to_string();
        log_lifecycle_error("lifecycle_failed", json!({ "error": message.clone() }));
        return Err(LifecycleError {
            message,
            response_delivered: false,
        });
    };
    let physical_resource_id = resolve_physical_resource_id(&envelope);

    let action = parse_lifecycle_event(event)
        .map_err(|error| error.message())
        .and_then(|event| {
            log_lifecycle_info(
                "lifecycle_started",
                json!({
                    "request_type": event.request_type.as_str(),
                    "request_id": event.request_id.clone(),
                    "logical_resource_id": event.logical_resource_id.clone(),
                    "physical_resource_id": physical_resource_id.clone(),
                }),
            );
            dispatch(&event, config, secret_store).map(|data| (event.request_type, data))
        });

    let response = match &action {
        Ok((_, data)) => CustomResourceResponse::success(
            &envelope,
            physical_resource_id.clone(),
            &config.log_stream_name,
            data.clone(),
        ),
        Err(message) => {
            log_lifecycle_error(
                "lifecycle_failed",
                json!({
                    "request_id": envelope.request_id.clone(),
                    "physical_resource_id": physical_resource_id.clone(),
                    "error": message.clone(),
                }),
            );
            CustomResourceResponse::failure(&envelope, physical_resource_id.clone(), message)
        }
    };

    deliver_response(&envelope, &response, response_sender)?;

    match action {
        Ok((request_type, _)) => Ok(LifecycleOutcome {
            request_type,
            status: ResponseStatus::Success,
            physical_resource_id,
        }),
        Err(message) => Err(LifecycleError {
            message,
            response_delivered: true,
        }),
    }
}

/// Maps a lifecycle result to what the Lambda invocation returns.
///
/// CloudFormation invokes the function asynchronously, so an invocation error
/// makes Lambda retry. That is only wanted while the response is undelivered;
/// once a FAILED document reached CloudFormation a retry would just repeat the
/// write.
pub fn invocation_result(
    result: Result<LifecycleOutcome, LifecycleError>,
) -> Result<Value, String> {
    match result {
        Ok(outcome) => Ok(json!({
            "status": outcome.status,
            "request_type": outcome.request_type,
            "physical_resource_id": outcome.physical_resource_id,
        })),
        Err(error) if error.response_delivered => Ok(json!({
            "status": ResponseStatus::Failed,
            "reason": error.message,
        })),
        Err(error) => Err(error.message),
    }
}

fn dispatch(
    event: &LifecycleEvent,
    config: &HandlerConfig,
    secret_store: &impl SecretStore,
) -> Result<BTreeMap<String, Value>, String> {
    match event.request_type {
        // Update rotates the key too, even when no property changed.
        RequestType::Create | RequestType::Update => write_fresh_key(config, secret_store),
        RequestType::Delete => {
            log_lifecycle_info(
                "delete_skipped",
                json!({
                    "request_id": event.request_id.clone(),
                    "reason": "secret lifecycle is owned outside this resource",
                }),
            );
            Ok(BTreeMap::new())
        }
    }
}

fn write_fresh_key(
    config: &HandlerConfig,
    secret_store: &impl SecretStore,
) -> Result<BTreeMap<String, Value>, String> {
    let secret_id = config.secret_id().map_err(|error| error.to_string())?;

    let key = FernetKey::generate();
    let receipt = secret_store
        .put_secret_value(secret_id, &key.to_text())
        .map_err(|error| format!("Failed to write Fernet key to secret '{secret_id}': {error}"))?;

    log_lifecycle_info(
        "secret_written",
        json!({
            "secret_id": secret_id,
            "secret_arn": receipt.arn.clone(),
            "version_id": receipt.version_id.clone(),
        }),
    );

    let mut data = BTreeMap::from([("SecretId".to_string(), Value::from(secret_id))]);
    if let Some(arn) = receipt.arn {
        data.insert("SecretArn".to_string(), Value::from(arn));
    }
    if let Some(version_id) = receipt.version_id {
        data.insert("VersionId".to_string(), Value::from(version_id));
    }
    Ok(data)
}

fn deliver_response(
    envelope: &ResponseEnvelope,
    response: &CustomResourceResponse,
    response_sender: &impl ResponseSender,
) -> Result<(), LifecycleError> {
    let result = response.to_json_bytes().and_then(|body| {
        response_sender
            .send_response(&envelope.response_url, &body)
            .map_err(|error| format!("Failed to deliver custom resource response: {error}"))
    });

    match result {
        Ok(()) => {
            log_lifecycle_info(
                "response_sent",
                json!({
                    "request_id": envelope.request_id.clone(),
                    "status": response.status,
                    "physical_resource_id": response.physical_resource_id.clone(),
                }),
            );
            Ok(())
        }
        Err(message) => {
            log_lifecycle_error(
                "response_failed",
                json!({
                    "request_id": envelope.request_id.clone(),
                    "status": response.status,
                    "error": message.clone(),
                }),
            );
            Err(LifecycleError {
                message,
                response_delivered: false,
            })
        }
    }
}

fn log_lifecycle_info(event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "lifecycle_handler",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

fn log_lifecycle_error(event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "lifecycle_handler",
            "level": "error",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::adapters::secret_store::SecretWriteReceipt;
    use crate::runtime::keygen::FERNET_KEY_TEXT_LEN;

    use super::*;

    struct RecordingSecretStore {
        writes: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSecretStore {
        fn new() -> Self {
            Self {
                writes: Mutex::new(Vec::new()),
            }
        }

        fn writes(&self) -> Vec<(String, String)> {
            self.writes.lock().expect("poisoned mutex").clone()
        }
    }

    impl SecretStore for RecordingSecretStore {
        fn put_secret_value(
            &self,
            secret_id: &str,
            value: &str,
        ) -> Result<SecretWriteReceipt, String> {
            let mut writes = self.writes.lock().expect("poisoned mutex");
            writes.push((secret_id.to_string(), value.to_string()));
            Ok(SecretWriteReceipt {
                arn: Some(format!(
                    "arn:aws:secretsmanager:eu-west-1:123456789012:secret:{secret_id}-AbCdEf"
                )),
                version_id: Some(format!("version-{}", writes.len())),
            })
        }
    }

    struct FailingSecretStore;

    impl SecretStore for FailingSecretStore {
        fn put_secret_value(
            &self,
            _secret_id: &str,
            _value: &str,
        ) -> Result<SecretWriteReceipt, String> {
            Err("ResourceNotFoundException: Secrets Manager can't find the specified secret."
                .to_string())
        }
    }

    struct RecordingSender {
        responses: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl RecordingSender {
        fn new() -> Self {
            Self {
                responses: Mutex::new(Vec::new()),
            }
        }

        fn documents(&self) -> Vec<Value> {
            self.responses
                .lock()
                .expect("poisoned mutex")
                .iter()
                .map(|(_, body)| serde_json::from_slice(body).expect("response should be json"))
                .collect()
        }

        fn raw_bodies(&self) -> Vec<String> {
            self.responses
                .lock()
                .expect("poisoned mutex")
                .iter()
                .map(|(_, body)| String::from_utf8(body.clone()).expect("response should be utf-8"))
                .collect()
        }

        fn urls(&self) -> Vec<String> {
            self.responses
                .lock()
                .expect("poisoned mutex")
                .iter()
                .map(|(url, _)| url.clone())
                .collect()
        }
    }

    impl ResponseSender for RecordingSender {
        fn send_response(&self, response_url: &str, body: &[u8]) -> Result<(), String> {
            self.responses
                .lock()
                .expect("poisoned mutex")
                .push((response_url.to_string(), body.to_vec()));
            Ok(())
        }
    }

    const RESPONSE_URL: &str =
        "https://cloudformation-custom-resource-response-euwest1.s3.amazonaws.com/signed?X-Amz-Signature=abc";

    fn sample_event(request_type: &str) -> Value {
        let mut event = json!({
            "RequestType": request_type,
            "ResponseURL": RESPONSE_URL,
            "StackId": "arn:aws:cloudformation:eu-west-1:123456789012:stack/airflow/4d1c6a10-0000-11ef-9f3a-0a1b2c3d4e5f",
            "RequestId": "2b7f9a4e-5e0d-4a35-9b1e-0f0c0d0e0f10",
            "ResourceType": "Custom::FernetKey",
            "LogicalResourceId": "FernetKeyResource",
            "ResourceProperties": {}
        });
        if request_type != "Create" {
            event["PhysicalResourceId"] = json!("airflow_FernetKeyResource_0a1b2c3d");
        }
        event
    }

    fn sample_config() -> HandlerConfig {
        HandlerConfig::new(Some("app/session-key".to_string()), "2026/10/19/[$LATEST]abc")
    }

    #[test]
    fn update_writes_one_fresh_key_to_configured_secret() {
        let store = RecordingSecretStore::new();
        let sender = RecordingSender::new();

        let outcome =
            handle_lifecycle_event(sample_event("Update"), &sample_config(), &store, &sender)
                .expect("update should succeed");

        assert_eq!(outcome.request_type, RequestType::Update);
        assert_eq!(outcome.status, ResponseStatus::Success);

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "app/session-key");
        assert_eq!(writes[0].1.len(), FERNET_KEY_TEXT_LEN);
        FernetKey::parse(&writes[0].1).expect("written value should be a fernet key");

        let documents = sender.documents();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["Status"], json!("SUCCESS"));
        assert_eq!(documents[0]["Data"]["SecretId"], json!("app/session-key"));
        assert_eq!(documents[0]["Data"]["VersionId"], json!("version-1"));
        assert_eq!(sender.urls(), vec![RESPONSE_URL.to_string()]);
    }

    #[test]
    fn create_generates_a_new_physical_id_and_writes_key() {
        let store = RecordingSecretStore::new();
        let sender = RecordingSender::new();

        let outcome =
            handle_lifecycle_event(sample_event("Create"), &sample_config(), &store, &sender)
                .expect("create should succeed");

        assert_eq!(outcome.request_type, RequestType::Create);
        assert!(outcome
            .physical_resource_id
            .starts_with("airflow_FernetKeyResource_"));
        assert_eq!(store.writes().len(), 1);
        assert_eq!(
            sender.documents()[0]["PhysicalResourceId"],
            json!(outcome.physical_resource_id)
        );
    }

    #[test]
    fn update_echoes_existing_physical_id() {
        let store = RecordingSecretStore::new();
        let sender = RecordingSender::new();

        let outcome =
            handle_lifecycle_event(sample_event("Update"), &sample_config(), &store, &sender)
                .expect("update should succeed");

        assert_eq!(
            outcome.physical_resource_id,
            "airflow_FernetKeyResource_0a1b2c3d"
        );
    }

    #[test]
    fn successive_invocations_write_different_keys() {
        let store = RecordingSecretStore::new();
        let sender = RecordingSender::new();

        handle_lifecycle_event(sample_event("Create"), &sample_config(), &store, &sender)
            .expect("create should succeed");
        handle_lifecycle_event(sample_event("Update"), &sample_config(), &store, &sender)
            .expect("update should succeed");

        let writes = store.writes();
        assert_eq!(writes.len(), 2);
        assert_ne!(writes[0].1, writes[1].1);
    }

    #[test]
    fn delete_makes_no_store_calls_and_reports_success() {
        let store = RecordingSecretStore::new();
        let sender = RecordingSender::new();

        let outcome =
            handle_lifecycle_event(sample_event("Delete"), &sample_config(), &store, &sender)
                .expect("delete should succeed");

        assert_eq!(outcome.request_type, RequestType::Delete);
        assert!(store.writes().is_empty());
        assert_eq!(sender.documents()[0]["Status"], json!("SUCCESS"));
    }

    #[test]
    fn delete_succeeds_with_failing_store_and_missing_secret_name() {
        let sender = RecordingSender::new();
        let config = HandlerConfig::new(None, "stream");

        let outcome =
            handle_lifecycle_event(sample_event("Delete"), &config, &FailingSecretStore, &sender)
                .expect("delete should never fail");

        assert_eq!(outcome.status, ResponseStatus::Success);
        assert_eq!(sender.documents()[0]["Status"], json!("SUCCESS"));
    }

    #[test]
    fn store_failure_reports_failed_response_and_error() {
        let sender = RecordingSender::new();

        let error = handle_lifecycle_event(
            sample_event("Update"),
            &sample_config(),
            &FailingSecretStore,
            &sender,
        )
        .expect_err("store failure should propagate");

        assert!(error.response_delivered);
        assert!(error.message.contains("ResourceNotFoundException"));

        let documents = sender.documents();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["Status"], json!("FAILED"));
        assert!(documents[0]["Reason"]
            .as_str()
            .expect("reason should be a string")
            .contains("app/session-key"));
    }

    #[test]
    fn missing_secret_name_fails_create_without_store_call() {
        let store = RecordingSecretStore::new();
        let sender = RecordingSender::new();
        let config = HandlerConfig::new(None, "stream");

        let error = handle_lifecycle_event(sample_event("Create"), &config, &store, &sender)
            .expect_err("create without secret name should fail");

        assert_eq!(error.message, "SECRET_NAME must be configured");
        assert!(store.writes().is_empty());
        assert_eq!(sender.documents()[0]["Status"], json!("FAILED"));
    }

    #[test]
    fn unknown_request_type_reports_failed_without_store_call() {
        let store = RecordingSecretStore::new();
        let sender = RecordingSender::new();

        let error =
            handle_lifecycle_event(sample_event("Replace"), &sample_config(), &store, &sender)
                .expect_err("unknown request type should fail");

        assert!(error.message.contains("Unsupported RequestType 'Replace'"));
        assert!(error.response_delivered);
        assert!(store.writes().is_empty());
        assert_eq!(sender.documents()[0]["Status"], json!("FAILED"));
    }

    #[test]
    fn response_never_contains_key_material() {
        let store = RecordingSecretStore::new();
        let sender = RecordingSender::new();

        handle_lifecycle_event(sample_event("Create"), &sample_config(), &store, &sender)
            .expect("create should succeed");

        let key = store.writes()[0].1.clone();
        let bodies = sender.raw_bodies();
        assert!(!bodies[0].contains(&key));
        assert_eq!(sender.documents()[0]["NoEcho"], json!(true));
    }

    #[test]
    fn unroutable_event_fails_without_response_or_store_call() {
        let store = RecordingSecretStore::new();
        let sender = RecordingSender::new();
        let mut event = sample_event("Create");
        event
            .as_object_mut()
            .expect("sample event is an object")
            .remove("ResponseURL");

        let error = handle_lifecycle_event(event, &sample_config(), &store, &sender)
            .expect_err("event without response url should fail");

        assert!(!error.response_delivered);
        assert!(store.writes().is_empty());
        assert!(sender.documents().is_empty());
    }

    #[test]
    fn undeliverable_response_is_an_error_even_after_successful_write() {
        let store = RecordingSecretStore::new();
        let sender =
            |_url: &str, _body: &[u8]| -> Result<(), String> { Err("connection reset".to_string()) };

        let error = handle_lifecycle_event(sample_event("Create"), &sample_config(), &store, &sender)
            .expect_err("undeliverable response should fail");

        assert!(!error.response_delivered);
        assert!(error.message.contains("connection reset"));
        assert_eq!(store.writes().len(), 1);
    }

    #[test]
    fn successful_outcome_becomes_invocation_summary() {
        let result = invocation_result(Ok(LifecycleOutcome {
            request_type: RequestType::Create,
            status: ResponseStatus::Success,
            physical_resource_id: "airflow_FernetKeyResource_0a1b2c3d".to_string(),
        }));

        assert_eq!(
            result,
            Ok(json!({
                "status": "SUCCESS",
                "request_type": "Create",
                "physical_resource_id": "airflow_FernetKeyResource_0a1b2c3d",
            }))
        );
    }

    #[test]
    fn delivered_failure_completes_the_invocation() {
        let sender = RecordingSender::new();
        let result = handle_lifecycle_event(
            sample_event("Update"),
            &sample_config(),
            &FailingSecretStore,
            &sender,
        );

        let summary = invocation_result(result).expect("delivered failure must not be retried");

        assert_eq!(summary["status"], json!("FAILED"));
        assert!(summary["reason"]
            .as_str()
            .expect("reason should be a string")
            .contains("ResourceNotFoundException"));
        assert_eq!(sender.documents().len(), 1);
    }

    #[test]
    fn undelivered_response_fails_the_invocation() {
        let store = RecordingSecretStore::new();
        let sender =
            |_url: &str, _body: &[u8]| -> Result<(), String> { Err("connection reset".to_string()) };
        let result = handle_lifecycle_event(sample_event("Create"), &sample_config(), &store, &sender);

        let error = invocation_result(result).expect_err("undelivered response should be retried");

        assert!(error.contains("connection reset"));
    }
}
