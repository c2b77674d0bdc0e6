// Notification data model: declarative specifications, triggers and built artifacts

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod artifact;
pub mod content;
pub mod platform;
pub mod style;
pub mod trigger;

pub use artifact::{
    Artifact, ArtifactBuilder, Bitmap, BuiltAction, FullScreenIntent, IntentKind, PendingIntent,
    ResourceHandle,
};
pub use content::{NotificationSpec, RenderedText};
pub use platform::{
    ActionSpec, BadgeIconType, DefaultFlags, GroupAlertBehavior, Lights, PlatformSpec,
    PressAction, ProgressSpec, RemoteInput,
};
pub use style::{MessageSpec, PersonSpec, ResolvedMessage, ResolvedPerson, ResolvedStyle, StyleSpec};
pub use trigger::{RepeatFrequency, TimeUnit, TriggerRecord, TriggerSpec, WorkKind};

/// Platform-side identity of a displayed notification.
///
/// Derived from the notification id with the 31-polynomial string hash over
/// UTF-16 code units, so the same id always maps to the same handle across
/// processes and redisplay/cancel by id is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationHandle(i32);

impl NotificationHandle {
    pub fn from_id(id: &str) -> Self {
        let hash = id
            .encode_utf16()
            .fold(0i32, |acc, unit| acc.wrapping_mul(31).wrapping_add(i32::from(unit)));
        Self(hash)
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for NotificationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attention level of a notification, mirroring the platform priority scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Min = -2,
    Low = -1,
    Default = 0,
    High = 1,
    Max = 2,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Default
    }
}

impl Priority {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

/// Lock screen visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Secret = -1,
    Private = 0,
    Public = 1,
}

impl Default for Visibility {
    fn default() -> Self {
        Self::Private
    }
}

/// Error taxonomy shared by the pipeline, the scheduler and the collaborators.
///
/// `Resolution` is the only hard pipeline failure. `AssetTimeout` and
/// `AssetFailure` are soft: the pipeline logs them and continues with a
/// degraded artifact.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationError {
    /// Named launch surface does not exist
    #[error("Unable to resolve launch surface '{surface}'")]
    Resolution { surface: String },

    /// Asset resolution exceeded its bounded wait
    #[error("Timed out after {timeout:?} resolving asset '{reference}'")]
    AssetTimeout {
        reference: String,
        timeout: Duration,
    },

    /// Asset could not be fetched or decoded
    #[error("Failed to resolve asset '{reference}': {message}")]
    AssetFailure { reference: String, message: String },

    /// Platform surface refused or failed the post
    #[error("Delivery failed: {message}")]
    Delivery { message: String },

    /// Content validation error
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Trigger store error: {0}")]
    Store(String),

    #[error("Work facility error: {0}")]
    Work(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl NotificationError {
    /// Distinguishing code for soft-failure log lines
    pub fn failure_cause(&self) -> &'static str {
        match self {
            NotificationError::AssetTimeout { .. } => "timeout",
            _ => "error",
        }
    }
}

impl From<rusqlite::Error> for NotificationError {
    fn from(error: rusqlite::Error) -> Self {
        NotificationError::Store(error.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(error: serde_json::Error) -> Self {
        NotificationError::Serialization(error.to_string())
    }
}

/// Type alias for notification results
pub type NotificationResult<T> = Result<T, NotificationError>;
