// Platform sub-specification: channel, visual attributes, progress, grouping,
// press actions and interactive actions

use serde::{Deserialize, Serialize};

use super::style::StyleSpec;
use super::{NotificationError, NotificationResult, Priority, Visibility};

/// Platform-specific part of a notification specification.
///
/// Every optional field is omitted from the artifact when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlatformSpec {
    pub channel_id: String,
    pub as_foreground_service: bool,
    pub auto_cancel: bool,
    pub badge_icon_type: Option<BadgeIconType>,
    pub category: Option<String>,
    /// `#RRGGBB` or `#AARRGGBB`
    pub color: Option<String>,
    pub colorized: bool,
    pub chronometer_count_down: bool,
    pub show_chronometer: bool,
    pub defaults: Option<DefaultFlags>,
    pub group_id: Option<String>,
    pub group_alert_behavior: GroupAlertBehavior,
    pub group_summary: bool,
    pub input_history: Option<Vec<String>>,
    pub large_icon: Option<String>,
    pub circular_large_icon: bool,
    pub lights: Option<Lights>,
    pub local_only: bool,
    pub number: Option<u32>,
    pub ongoing: bool,
    pub only_alert_once: bool,
    pub priority: Priority,
    pub progress: Option<ProgressSpec>,
    pub shortcut_id: Option<String>,
    pub show_timestamp: bool,
    pub small_icon: Option<String>,
    pub small_icon_level: Option<i32>,
    pub sort_key: Option<String>,
    pub sound: Option<String>,
    pub ticker: Option<String>,
    /// Milliseconds after which the platform removes the notification
    pub timeout_after: Option<u64>,
    pub timestamp: Option<i64>,
    pub vibration_pattern: Vec<u64>,
    pub visibility: Visibility,
    pub press_action: Option<PressAction>,
    pub full_screen_action: Option<PressAction>,
    pub actions: Vec<ActionSpec>,
    pub style: Option<StyleSpec>,
}

impl Default for PlatformSpec {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl PlatformSpec {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            as_foreground_service: false,
            auto_cancel: true,
            badge_icon_type: None,
            category: None,
            color: None,
            colorized: false,
            chronometer_count_down: false,
            show_chronometer: false,
            defaults: None,
            group_id: None,
            group_alert_behavior: GroupAlertBehavior::default(),
            group_summary: false,
            input_history: None,
            large_icon: None,
            circular_large_icon: false,
            lights: None,
            local_only: false,
            number: None,
            ongoing: false,
            only_alert_once: false,
            priority: Priority::default(),
            progress: None,
            shortcut_id: None,
            show_timestamp: false,
            small_icon: None,
            small_icon_level: None,
            sort_key: None,
            sound: None,
            ticker: None,
            timeout_after: None,
            timestamp: None,
            vibration_pattern: Vec::new(),
            visibility: Visibility::default(),
            press_action: Some(PressAction::default()),
            full_screen_action: None,
            actions: Vec::new(),
            style: None,
        }
    }

    pub fn with_large_icon(mut self, reference: impl Into<String>, circular: bool) -> Self {
        self.large_icon = Some(reference.into());
        self.circular_large_icon = circular;
        self
    }

    pub fn with_action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_style(mut self, style: StyleSpec) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_full_screen_action(mut self, action: PressAction) -> Self {
        self.full_screen_action = Some(action);
        self
    }

    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    pub fn as_foreground_service(mut self) -> Self {
        self.as_foreground_service = true;
        self
    }

    /// Parsed ARGB color, if one was specified
    pub fn color_argb(&self) -> NotificationResult<Option<u32>> {
        self.color.as_deref().map(parse_color).transpose()
    }

    /// Default alert flags given what the base stage found.
    ///
    /// Unset `defaults` means all defaults. Explicitly customised sound,
    /// vibration or lights each remove their default.
    pub fn resolved_defaults(&self, has_custom_sound: bool) -> DefaultFlags {
        let mut flags = self.defaults.unwrap_or(DefaultFlags::ALL);
        if has_custom_sound {
            flags = flags.without(DefaultFlags::SOUND);
        }
        if !self.vibration_pattern.is_empty() {
            flags = flags.without(DefaultFlags::VIBRATE);
        }
        if self.lights.is_some() {
            flags = flags.without(DefaultFlags::LIGHTS);
        }
        flags
    }
}

/// What happens when the notification body or an action is pressed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PressAction {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_activity_flags: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_component: Option<String>,
}

impl Default for PressAction {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            launch_activity: Some("default".to_string()),
            launch_activity_flags: None,
            main_component: None,
        }
    }
}

impl PressAction {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            launch_activity: None,
            launch_activity_flags: None,
            main_component: None,
        }
    }

    pub fn with_launch_activity(mut self, activity: impl Into<String>) -> Self {
        self.launch_activity = Some(activity.into());
        self
    }

    pub fn with_main_component(mut self, component: impl Into<String>) -> Self {
        self.main_component = Some(component.into());
        self
    }
}

/// Interactive action rendered under the notification, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub press_action: PressAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<RemoteInput>,
}

impl ActionSpec {
    pub fn new(title: impl Into<String>, press_action: PressAction) -> Self {
        Self {
            title: title.into(),
            icon: None,
            press_action,
            input: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_input(mut self, input: RemoteInput) -> Self {
        self.input = Some(input);
        self
    }
}

/// Inline reply descriptor attached to an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteInput {
    pub allow_free_form_input: bool,
    pub allow_generated_replies: bool,
    pub choices: Vec<String>,
    pub placeholder: Option<String>,
    pub editable_choices: bool,
}

impl Default for RemoteInput {
    fn default() -> Self {
        Self {
            allow_free_form_input: true,
            allow_generated_replies: true,
            choices: Vec::new(),
            placeholder: None,
            editable_choices: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSpec {
    pub max: u32,
    pub current: u32,
    #[serde(default)]
    pub indeterminate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lights {
    pub color: String,
    pub on_ms: u32,
    pub off_ms: u32,
}

impl Lights {
    pub fn color_argb(&self) -> NotificationResult<u32> {
        parse_color(&self.color)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeIconType {
    None,
    Small,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupAlertBehavior {
    #[default]
    All,
    Summary,
    Children,
}

/// Platform default alert behaviours (sound, vibration, lights)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefaultFlags(u8);

impl DefaultFlags {
    pub const NONE: DefaultFlags = DefaultFlags(0);
    pub const SOUND: DefaultFlags = DefaultFlags(1);
    pub const VIBRATE: DefaultFlags = DefaultFlags(1 << 1);
    pub const LIGHTS: DefaultFlags = DefaultFlags(1 << 2);
    pub const ALL: DefaultFlags = DefaultFlags(0b111);

    pub fn union(self, other: DefaultFlags) -> Self {
        Self(self.0 | other.0)
    }

    pub fn without(self, other: DefaultFlags) -> Self {
        Self(self.0 & !other.0)
    }

    pub fn contains(self, other: DefaultFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

fn parse_color(color: &str) -> NotificationResult<u32> {
    let invalid = || NotificationError::Validation {
        field: "color".to_string(),
        message: format!("'{}' is not a #RRGGBB or #AARRGGBB color", color),
    };

    let hex = color.strip_prefix('#').ok_or_else(invalid)?;
    let value = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
    match hex.len() {
        6 => Ok(0xFF00_0000 | value),
        8 => Ok(value),
        _ => Err(invalid()),
    }
}
