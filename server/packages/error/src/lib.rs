use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Validation,
    InvalidRequest,
    NotFound,
    AdapterProtocol,
    Internal,
}

impl ErrorType {
    pub fn as_urn(&self) -> &'static str {
        match self {
            Self::Validation => "urn:nlui:error:validation",
            Self::InvalidRequest => "urn:nlui:error:invalid_request",
            Self::NotFound => "urn:nlui:error:not_found",
            Self::AdapterProtocol => "urn:nlui:error:adapter_protocol",
            Self::Internal => "urn:nlui:error:internal",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Validation => "Validation Failed",
            Self::InvalidRequest => "Invalid Request",
            Self::NotFound => "Not Found",
            Self::AdapterProtocol => "Adapter Protocol Error",
            Self::Internal => "Internal Server Error",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::InvalidRequest => 400,
            Self::NotFound => 404,
            Self::AdapterProtocol => 500,
            Self::Internal => 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_: String,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl ProblemDetails {
    pub fn new(error_type: ErrorType, detail: Option<String>) -> Self {
        Self {
            type_: error_type.as_urn().to_string(),
            title: error_type.title().to_string(),
            status: error_type.status_code(),
            detail,
            instance: None,
            extensions: Map::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NluiError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("instance not found: {instance_id}")]
    NotFound { instance_id: String },
    #[error("adapter protocol error: {message}")]
    AdapterProtocol { message: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl NluiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn validation_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::Validation { .. } => ErrorType::Validation,
            Self::InvalidRequest { .. } => ErrorType::InvalidRequest,
            Self::NotFound { .. } => ErrorType::NotFound,
            Self::AdapterProtocol { .. } => ErrorType::AdapterProtocol,
            Self::Internal { .. } => ErrorType::Internal,
        }
    }

    /// Problem document safe to hand to HTTP clients. Internal failures are
    /// reported with a generic detail so nothing from the failing payload
    /// leaks out.
    pub fn to_problem_details(&self) -> ProblemDetails {
        let detail = match self {
            Self::Internal { .. } | Self::AdapterProtocol { .. } => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let mut problem = ProblemDetails::new(self.error_type(), Some(detail));

        let mut extensions = Map::new();
        match self {
            Self::Validation {
                field: Some(field), ..
            } => {
                extensions.insert("field".to_string(), Value::String(field.clone()));
            }
            Self::NotFound { instance_id } => {
                extensions.insert("instanceId".to_string(), Value::String(instance_id.clone()));
            }
            _ => {}
        }
        problem.extensions = extensions;
        problem
    }
}

impl From<NluiError> for ProblemDetails {
    fn from(value: NluiError) -> Self {
        value.to_problem_details()
    }
}

impl From<&NluiError> for ProblemDetails {
    fn from(value: &NluiError) -> Self {
        value.to_problem_details()
    }
}

impl From<serde_json::Error> for NluiError {
    fn from(value: serde_json::Error) -> Self {
        Self::internal(value.to_string())
    }
}
