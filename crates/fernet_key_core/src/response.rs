use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::contract::ResponseEnvelope;

/// CloudFormation rejects response documents above this size.
pub const MAX_RESPONSE_BYTES: usize = 4_096;
/// Budget for the JSON-escaped `Reason`, leaving room for the other fields.
pub const MAX_REASON_BYTES: usize = 3_500;
pub const PHYSICAL_ID_HASH_CHARS: usize = 8;

const TRUNCATION_MARKER: &str = "...";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceResponse {
    pub status: ResponseStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub no_echo: bool,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

impl CustomResourceResponse {
    pub fn success(
        envelope: &ResponseEnvelope,
        physical_resource_id: impl Into<String>,
        log_stream_name: &str,
        data: BTreeMap<String, Value>,
    ) -> Self {
        Self::build(
            envelope,
            ResponseStatus::Success,
            format!("See the details in CloudWatch Log Stream: {log_stream_name}"),
            physical_resource_id.into(),
            data,
        )
    }

    pub fn failure(
        envelope: &ResponseEnvelope,
        physical_resource_id: impl Into<String>,
        reason: &str,
    ) -> Self {
        Self::build(
            envelope,
            ResponseStatus::Failed,
            truncate_reason(reason),
            physical_resource_id.into(),
            BTreeMap::new(),
        )
    }

    fn build(
        envelope: &ResponseEnvelope,
        status: ResponseStatus,
        reason: String,
        physical_resource_id: String,
        data: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            status,
            reason,
            physical_resource_id,
            stack_id: envelope.stack_id.clone(),
            request_id: envelope.request_id.clone(),
            logical_resource_id: envelope.logical_resource_id.clone(),
            no_echo: true,
            data,
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, String> {
        let body = serde_json::to_vec(self)
            .map_err(|error| format!("failed to serialize custom resource response: {error}"))?;
        if body.len() > MAX_RESPONSE_BYTES {
            return Err(format!(
                "custom resource response is {} bytes, above the {MAX_RESPONSE_BYTES} byte limit",
                body.len()
            ));
        }
        Ok(body)
    }
}

/// Echoes the id CloudFormation already knows; a changed id on Update would
/// be treated as a replacement. Create derives a stable id from the request.
pub fn resolve_physical_resource_id(envelope: &ResponseEnvelope) -> String {
    if let Some(existing) = envelope
        .physical_resource_id
        .as_deref()
        .filter(|value| !value.trim().is_empty())
    {
        return existing.to_string();
    }

    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}/{}/{}",
        envelope.stack_id, envelope.logical_resource_id, envelope.request_id
    ));
    let digest = format!("{:x}", hasher.finalize());

    format!(
        "{}_{}_{}",
        stack_name(&envelope.stack_id),
        envelope.logical_resource_id,
        &digest[..PHYSICAL_ID_HASH_CHARS]
    )
}

/// `arn:aws:cloudformation:<region>:<account>:stack/<name>/<uuid>` -> `<name>`.
fn stack_name(stack_id: &str) -> &str {
    stack_id
        .split('/')
        .nth(1)
        .filter(|name| !name.is_empty())
        .unwrap_or(stack_id)
}

/// Cuts `reason` so that its JSON-escaped form fits in `MAX_REASON_BYTES`.
/// Quotes and control characters grow when escaped, so raw length is not enough.
pub fn truncate_reason(reason: &str) -> String {
    if escaped_len(reason) <= MAX_REASON_BYTES {
        return reason.to_string();
    }

    let budget = MAX_REASON_BYTES - TRUNCATION_MARKER.len();
    let mut used = 0;
    let mut end = 0;
    let mut buf = [0u8; 4];
    for (index, ch) in reason.char_indices() {
        let width = escaped_len(ch.encode_utf8(&mut buf));
        if used + width > budget {
            break;
        }
        used += width;
        end = index + ch.len_utf8();
    }
    format!("{}{TRUNCATION_MARKER}", &reason[..end])
}

/// Length of `text` once written as a JSON string, without the quotes.
fn escaped_len(text: &str) -> usize {
    serde_json::to_string(text)
        .map(|quoted| quoted.len() - 2)
        .unwrap_or(usize::MAX)
}
