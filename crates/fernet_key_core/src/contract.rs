use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle operation declared by CloudFormation in `RequestType`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ContractError> {
        match raw {
            "Create" => Ok(Self::Create),
            "Update" => Ok(Self::Update),
            "Delete" => Ok(Self::Delete),
            other => Err(ContractError::UnsupportedRequestType(other.to_string())),
        }
    }
}

/// Custom-resource request as delivered to the Lambda function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    pub request_type: RequestType,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    #[serde(default)]
    pub resource_type: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<Value>,
}

/// Fields needed to answer a request, readable even when the rest of the
/// event is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub physical_resource_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    Malformed(String),
    UnsupportedRequestType(String),
}

impl ContractError {
    pub fn message(&self) -> String {
        match self {
            Self::Malformed(message) => message.clone(),
            Self::UnsupportedRequestType(raw) => {
                format!("Unsupported RequestType '{raw}' (expected Create, Update, or Delete)")
            }
        }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for ContractError {}

pub fn parse_lifecycle_event(event: Value) -> Result<LifecycleEvent, ContractError> {
    let Some(object) = event.as_object() else {
        return Err(ContractError::Malformed(
            "Lifecycle event must be a JSON object".to_string(),
        ));
    };

    let request_type = match object.get("RequestType") {
        Some(Value::String(raw)) => raw.as_str(),
        Some(_) => {
            return Err(ContractError::Malformed(
                "RequestType must be a string".to_string(),
            ))
        }
        None => {
            return Err(ContractError::Malformed(
                "RequestType is required".to_string(),
            ))
        }
    };
    RequestType::parse(request_type)?;

    serde_json::from_value(event)
        .map_err(|error| ContractError::Malformed(format!("Malformed lifecycle event: {error}")))
}

/// Reads the response routing fields without validating the rest of the event.
pub fn extract_response_envelope(event: &Value) -> Option<ResponseEnvelope> {
    let field = |name: &str| {
        event
            .get(name)
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string)
    };

    Some(ResponseEnvelope {
        response_url: field("ResponseURL")?,
        stack_id: field("StackId")?,
        request_id: field("RequestId")?,
        logical_resource_id: field("LogicalResourceId")?,
        physical_resource_id: field("PhysicalResourceId"),
    })
}
