//! Per-request correlation context threaded through every log line.

use std::fmt;

use uuid::Uuid;

/// One extra diagnostic key/value attached to a correlation context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogField {
    pub key: String,
    pub value: String,
}

impl LogField {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for LogField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Correlation id plus an ordered list of extra diagnostic fields.
///
/// The id never changes after construction; extras are append-only and
/// admit duplicates. `Clone` copies the extras, [`clone_without_extras`]
/// starts a fresh list under the same id.
///
/// [`clone_without_extras`]: CorrelationContext::clone_without_extras
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationContext {
    corr_id: String,
    extras: Vec<LogField>,
}

impl CorrelationContext {
    /// Context for a caller-supplied correlation id.
    pub fn new(corr_id: impl Into<String>) -> Self {
        Self {
            corr_id: corr_id.into(),
            extras: Vec::new(),
        }
    }

    /// Context with a freshly generated UUID v4 correlation id.
    #[must_use]
    pub fn generated() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn corr_id(&self) -> &str {
        &self.corr_id
    }

    pub fn add_extra(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extras.push(LogField::new(key, value));
    }

    pub fn extend_extras(&mut self, extras: impl IntoIterator<Item = LogField>) {
        self.extras.extend(extras);
    }

    #[must_use]
    pub fn extras(&self) -> &[LogField] {
        &self.extras
    }

    #[must_use]
    pub fn clone_without_extras(&self) -> Self {
        Self::new(self.corr_id.clone())
    }

    /// Extras rendered as `k=v` pairs separated by spaces, for log fields.
    #[must_use]
    pub fn extras_display(&self) -> String {
        self.extras
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
