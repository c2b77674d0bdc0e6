// Built notification artifact and the in-progress builder state threaded
// through the pipeline stages

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::{Rgba, RgbaImage};

use super::content::{NotificationSpec, RenderedText};
use super::platform::{BadgeIconType, DefaultFlags, GroupAlertBehavior, PressAction, ProgressSpec, RemoteInput};
use super::style::ResolvedStyle;
use super::{NotificationError, NotificationHandle, NotificationResult, Priority, Visibility};

/// Decoded RGBA bitmap, cheap to clone
#[derive(Clone, PartialEq)]
pub struct Bitmap(Arc<RgbaImage>);

impl Bitmap {
    pub fn from_rgba(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    /// Decode any supported image format
    pub fn decode(reference: &str, bytes: &[u8]) -> NotificationResult<Self> {
        let image = image::load_from_memory(bytes).map_err(|e| NotificationError::AssetFailure {
            reference: reference.to_string(),
            message: format!("Failed to decode image: {}", e),
        })?;
        Ok(Self::from_rgba(image.to_rgba8()))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.0
    }

    /// Center-cropped square with everything outside the inscribed circle
    /// made transparent
    pub fn circular(&self) -> Bitmap {
        let side = self.width().min(self.height());
        let x_offset = (self.width() - side) / 2;
        let y_offset = (self.height() - side) / 2;
        let radius = side as f32 / 2.0;

        let masked = RgbaImage::from_fn(side, side, |x, y| {
            let dx = x as f32 + 0.5 - radius;
            let dy = y as f32 + 0.5 - radius;
            if dx * dx + dy * dy <= radius * radius {
                *self.0.get_pixel(x + x_offset, y + y_offset)
            } else {
                Rgba([0, 0, 0, 0])
            }
        });

        Bitmap::from_rgba(masked)
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bitmap({}x{})", self.width(), self.height())
    }
}

/// Platform resource resolved from a logical reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceHandle {
    /// The platform's default resource of that kind
    Default,
    /// A file the platform can load directly
    Path(PathBuf),
    /// A remote or content URI
    Uri(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentKind {
    Press,
    Delete,
    ActionPress,
}

/// Deferred intent handed to the platform.
///
/// Press and delete intents carry the full spec so the receiver can rebuild
/// context from the intent alone.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingIntent {
    pub kind: IntentKind,
    pub request_code: i32,
    pub notification: NotificationSpec,
    pub press_action: Option<PressAction>,
}

impl PendingIntent {
    pub fn new(kind: IntentKind, notification: &NotificationSpec, press_action: Option<PressAction>) -> Self {
        Self {
            kind,
            request_code: notification.handle().as_i32(),
            notification: notification.clone(),
            press_action,
        }
    }
}

/// Full-screen launch request
#[derive(Debug, Clone, PartialEq)]
pub struct FullScreenIntent {
    pub request_code: i32,
    /// Resolved launch surface
    pub surface: String,
    pub notification_id: String,
    pub main_component: Option<String>,
    pub flags: Option<i32>,
    pub high_priority: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltAction {
    pub title: RenderedText,
    pub icon: Option<Bitmap>,
    pub intent: PendingIntent,
    pub remote_input: Option<RemoteInput>,
}

/// Fully-built, platform-displayable notification
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub handle: NotificationHandle,
    pub channel_id: String,
    pub extras: BTreeMap<String, String>,
    pub content_title: Option<RenderedText>,
    pub sub_text: Option<RenderedText>,
    pub content_text: Option<RenderedText>,
    pub content_intent: Option<PendingIntent>,
    pub delete_intent: Option<PendingIntent>,
    pub badge_icon_type: Option<BadgeIconType>,
    pub category: Option<String>,
    pub color: Option<u32>,
    pub colorized: bool,
    pub chronometer_count_down: bool,
    pub uses_chronometer: bool,
    pub group: Option<String>,
    pub group_alert_behavior: GroupAlertBehavior,
    pub group_summary: bool,
    pub remote_input_history: Option<Vec<String>>,
    /// (argb, on ms, off ms)
    pub lights: Option<(u32, u32, u32)>,
    pub local_only: bool,
    pub number: Option<u32>,
    pub sound: Option<ResourceHandle>,
    pub defaults: DefaultFlags,
    pub ongoing: bool,
    pub only_alert_once: bool,
    pub priority: Priority,
    pub progress: Option<ProgressSpec>,
    pub shortcut_id: Option<String>,
    pub show_when: bool,
    pub small_icon: Option<(String, Option<i32>)>,
    pub sort_key: Option<String>,
    pub ticker: Option<String>,
    pub timeout_after: Option<Duration>,
    pub vibrate: Option<Vec<u64>>,
    pub visibility: Visibility,
    pub when: Option<i64>,
    pub auto_cancel: bool,
    pub large_icon: Option<Bitmap>,
    pub full_screen_intent: Option<FullScreenIntent>,
    pub actions: Vec<BuiltAction>,
    pub style: Option<ResolvedStyle>,
}

/// In-progress builder state passed from stage to stage
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactBuilder(Artifact);

impl ArtifactBuilder {
    pub fn new(handle: NotificationHandle, channel_id: impl Into<String>) -> Self {
        Self(Artifact {
            handle,
            channel_id: channel_id.into(),
            extras: BTreeMap::new(),
            content_title: None,
            sub_text: None,
            content_text: None,
            content_intent: None,
            delete_intent: None,
            badge_icon_type: None,
            category: None,
            color: None,
            colorized: false,
            chronometer_count_down: false,
            uses_chronometer: false,
            group: None,
            group_alert_behavior: GroupAlertBehavior::default(),
            group_summary: false,
            remote_input_history: None,
            lights: None,
            local_only: false,
            number: None,
            sound: None,
            defaults: DefaultFlags::ALL,
            ongoing: false,
            only_alert_once: false,
            priority: Priority::default(),
            progress: None,
            shortcut_id: None,
            show_when: false,
            small_icon: None,
            sort_key: None,
            ticker: None,
            timeout_after: None,
            vibrate: None,
            visibility: Visibility::default(),
            when: None,
            auto_cancel: true,
            large_icon: None,
            full_screen_intent: None,
            actions: Vec::new(),
            style: None,
        })
    }

    pub fn add_action(&mut self, action: BuiltAction) {
        self.0.actions.push(action);
    }

    pub fn build(self) -> Artifact {
        self.0
    }
}

impl Deref for ArtifactBuilder {
    type Target = Artifact;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ArtifactBuilder {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_mask_crops_and_clears_corners() {
        let source = RgbaImage::from_pixel(40, 20, Rgba([255, 0, 0, 255]));
        let circle = Bitmap::from_rgba(source).circular();
        assert_eq!((circle.width(), circle.height()), (20, 20));
        assert_eq!(circle.as_rgba().get_pixel(0, 0)[3], 0);
        assert_eq!(*circle.as_rgba().get_pixel(10, 10), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn intents_use_notification_handle_as_request_code() {
        let spec = NotificationSpec::new("n1", "default");
        let intent = PendingIntent::new(IntentKind::Delete, &spec, None);
        assert_eq!(intent.request_code, NotificationHandle::from_id("n1").as_i32());
    }
}
