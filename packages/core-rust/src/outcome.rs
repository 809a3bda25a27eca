//! Business outcome taxonomy and the JSON response envelope.
//!
//! Every request ends in exactly one [`ResponseEnvelope`]. Business code
//! reports its result as a [`BusinessOutcome`] whose [`ApiStatus`] comes from
//! a closed set; the transport layer maps that status to an HTTP code.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// ApiStatus
// ---------------------------------------------------------------------------

/// Closed error taxonomy shared by business code and the pipeline stages.
///
/// Serializes as its integer wire code (see [`ApiStatus::code`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ApiStatus {
    /// The request succeeded.
    NoError,
    /// Identity or authorization failure.
    AuthFailed,
    /// A create conflicted with an existing entity.
    EntityAlreadyExists,
    /// A referenced entity does not exist.
    EntityDoesNotExist,
    /// Required input (path parameter, body) is absent.
    MissingRequiredItem,
    /// The request references an item the service does not recognize.
    UnknownItemRequested,
    /// Uncategorized failure.
    Unexpected,
}

impl ApiStatus {
    /// All statuses, in wire-code order.
    pub const ALL: [ApiStatus; 7] = [
        ApiStatus::NoError,
        ApiStatus::AuthFailed,
        ApiStatus::EntityAlreadyExists,
        ApiStatus::EntityDoesNotExist,
        ApiStatus::MissingRequiredItem,
        ApiStatus::UnknownItemRequested,
        ApiStatus::Unexpected,
    ];

    /// Stable integer code written to the envelope's `error.code` field.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::NoError => 0,
            Self::AuthFailed => 1,
            Self::EntityAlreadyExists => 2,
            Self::EntityDoesNotExist => 3,
            Self::MissingRequiredItem => 4,
            Self::UnknownItemRequested => 5,
            Self::Unexpected => 6,
        }
    }

    /// Short machine-readable name, used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoError => "no_error",
            Self::AuthFailed => "auth_failed",
            Self::EntityAlreadyExists => "entity_already_exists",
            Self::EntityDoesNotExist => "entity_does_not_exist",
            Self::MissingRequiredItem => "missing_required_item",
            Self::UnknownItemRequested => "unknown_item_requested",
            Self::Unexpected => "unexpected",
        }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::NoError)
    }
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ApiStatus> for i32 {
    fn from(status: ApiStatus) -> Self {
        status.code()
    }
}

/// Error returned when decoding an integer that is not a known status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown api status code: {0}")]
pub struct UnknownStatusCode(pub i32);

impl TryFrom<i32> for ApiStatus {
    type Error = UnknownStatusCode;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|status| status.code() == code)
            .ok_or(UnknownStatusCode(code))
    }
}

// ---------------------------------------------------------------------------
// BusinessOutcome
// ---------------------------------------------------------------------------

/// Structured result of a business function.
///
/// A successful outcome carries a payload and no message; a failed outcome
/// carries no payload but always has a message and a diagnostic detail.
/// The constructors are the only way to build one, so the two shapes never
/// mix.
#[derive(Debug, Clone, PartialEq)]
pub struct BusinessOutcome {
    status: ApiStatus,
    payload: Option<Value>,
    message: String,
    detail: String,
}

impl BusinessOutcome {
    /// Successful outcome with the given payload.
    ///
    /// A payload that fails to serialize becomes an `Unexpected` failure.
    pub fn ok<T: Serialize>(payload: T) -> Self {
        match serde_json::to_value(payload) {
            Ok(value) => Self::ok_value(value),
            Err(err) => Self::fail(
                ApiStatus::Unexpected,
                "Failed to encode response payload",
                err.to_string(),
            ),
        }
    }

    /// Successful outcome with an already-encoded payload.
    #[must_use]
    pub fn ok_value(payload: Value) -> Self {
        Self {
            status: ApiStatus::NoError,
            payload: Some(payload),
            message: String::new(),
            detail: String::new(),
        }
    }

    /// Failed outcome.
    ///
    /// `NoError` is not a failure status; passing it yields `Unexpected`.
    /// An empty message or detail is replaced by the status name, so a
    /// failure never reaches the wire without both.
    pub fn fail(
        status: ApiStatus,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        let status = if status.is_success() {
            ApiStatus::Unexpected
        } else {
            status
        };
        Self {
            status,
            payload: None,
            message: non_empty(message.into(), status),
            detail: non_empty(detail.into(), status),
        }
    }

    /// Failed outcome whose detail is the full error chain of `err`.
    pub fn from_error(
        status: ApiStatus,
        message: impl Into<String>,
        err: &anyhow::Error,
    ) -> Self {
        Self::fail(status, message, format!("{err:#}"))
    }

    #[must_use]
    pub fn status(&self) -> ApiStatus {
        self.status
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Response payload; `None` for failures.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Human-facing message; empty for successes.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Diagnostic detail for developers; empty for successes.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Build the wire envelope for this outcome.
    #[must_use]
    pub fn to_envelope(&self, corr_id: &str) -> ResponseEnvelope {
        if self.is_success() {
            ResponseEnvelope::success(corr_id, self.payload.clone())
        } else {
            ResponseEnvelope::failure(self.status, &self.message, &self.detail, corr_id)
        }
    }
}

fn non_empty(text: String, status: ApiStatus) -> String {
    if text.is_empty() {
        status.as_str().to_string()
    } else {
        text
    }
}

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

/// `error` object of the response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorModel {
    pub code: ApiStatus,
    pub msg: String,
    #[serde(rename = "devMsg")]
    pub dev_msg: String,
    #[serde(rename = "corrId")]
    pub corr_id: String,
}

/// Body of every response: `{"error": {...}, "data": ...}`.
///
/// `data` is omitted from the JSON when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub error: ErrorModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseEnvelope {
    /// Success envelope: code `NoError`, empty messages.
    #[must_use]
    pub fn success(corr_id: &str, data: Option<Value>) -> Self {
        Self {
            error: ErrorModel {
                code: ApiStatus::NoError,
                msg: String::new(),
                dev_msg: String::new(),
                corr_id: corr_id.to_string(),
            },
            data,
        }
    }

    /// Error envelope without data.
    #[must_use]
    pub fn failure(status: ApiStatus, msg: &str, dev_msg: &str, corr_id: &str) -> Self {
        Self {
            error: ErrorModel {
                code: status,
                msg: msg.to_string(),
                dev_msg: dev_msg.to_string(),
                corr_id: corr_id.to_string(),
            },
            data: None,
        }
    }
}
