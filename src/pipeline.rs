// Construction pipeline: five forward-only stages turning a spec into an
// artifact. Only the base and full-screen stages can fail; asset fetches in the
// other stages degrade the artifact and are logged.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::backends::{LaunchSurfaces, ResourceResolver, resolve_bitmap_within};
use crate::components::{
    Artifact, ArtifactBuilder, Bitmap, BuiltAction, FullScreenIntent, IntentKind, NotificationError,
    NotificationResult, NotificationSpec, PendingIntent, RenderedText,
};
use crate::config::NotifyConfig;
use crate::events::{BusEvent, EventBus};

/// Launch surface used when a full-screen action names none
const DEFAULT_LAUNCH_SURFACE: &str = "default";

pub struct NotificationPipeline {
    resolver: Arc<dyn ResourceResolver>,
    launch_surfaces: Arc<dyn LaunchSurfaces>,
    events: Arc<dyn EventBus>,
    handle: Handle,
    asset_timeout: Duration,
    style_timeout: Duration,
}

impl NotificationPipeline {
    pub fn new(
        resolver: Arc<dyn ResourceResolver>,
        launch_surfaces: Arc<dyn LaunchSurfaces>,
        events: Arc<dyn EventBus>,
        handle: Handle,
    ) -> Self {
        let defaults = NotifyConfig::default();
        Self {
            resolver,
            launch_surfaces,
            events,
            handle,
            asset_timeout: defaults.asset_timeout(),
            style_timeout: defaults.style_timeout(),
        }
    }

    pub fn with_config(mut self, config: &NotifyConfig) -> Self {
        self.asset_timeout = config.asset_timeout();
        self.style_timeout = config.style_timeout();
        self
    }

    /// Run every stage in order and produce the finished artifact
    pub async fn build(&self, spec: &NotificationSpec) -> NotificationResult<Artifact> {
        let builder = self.base_stage(spec)?;
        let builder = self.large_icon_stage(spec, builder).await;
        let builder = self.full_screen_stage(spec, builder)?;
        let builder = self.actions_stage(spec, builder).await;
        let builder = self.style_stage(spec, builder).await;
        Ok(builder.build())
    }

    /// Every field that needs no I/O. Fails on malformed colors.
    pub fn base_stage(&self, spec: &NotificationSpec) -> NotificationResult<ArtifactBuilder> {
        let platform = &spec.platform;
        let mut builder = ArtifactBuilder::new(spec.handle(), platform.channel_id.clone());

        builder.extras = spec.data.clone();
        builder.delete_intent = Some(PendingIntent::new(IntentKind::Delete, spec, None));
        builder.content_intent = Some(PendingIntent::new(
            IntentKind::Press,
            spec,
            platform.press_action.clone(),
        ));

        builder.content_title = spec.title.as_deref().map(RenderedText::from_html);
        builder.sub_text = spec.subtitle.as_deref().map(RenderedText::from_html);
        builder.content_text = spec.body.as_deref().map(RenderedText::from_html);

        builder.badge_icon_type = platform.badge_icon_type;
        builder.category = platform.category.clone();
        builder.color = platform.color_argb()?;
        builder.colorized = platform.colorized;
        builder.chronometer_count_down = platform.chronometer_count_down;
        builder.uses_chronometer = platform.show_chronometer;
        builder.group = platform.group_id.clone();
        builder.group_alert_behavior = platform.group_alert_behavior;
        builder.group_summary = platform.group_summary;
        builder.remote_input_history = platform.input_history.clone();

        if let Some(lights) = &platform.lights {
            builder.lights = Some((lights.color_argb()?, lights.on_ms, lights.off_ms));
        }

        builder.local_only = platform.local_only;
        builder.number = platform.number;

        let mut has_custom_sound = false;
        if let Some(sound) = &platform.sound {
            match self.resolver.resolve_sound(sound) {
                Some(handle) => {
                    has_custom_sound = true;
                    builder.sound = Some(handle);
                },
                None => {
                    tracing::warn!(notification_id = %spec.id, sound = %sound, "Unable to retrieve sound for notification");
                },
            }
        }

        builder.defaults = platform.resolved_defaults(has_custom_sound);
        builder.ongoing = platform.ongoing;
        builder.only_alert_once = platform.only_alert_once;
        builder.priority = platform.priority;
        builder.progress = platform.progress;
        builder.shortcut_id = platform.shortcut_id.clone();
        builder.show_when = platform.show_timestamp;
        builder.small_icon = platform
            .small_icon
            .clone()
            .map(|icon| (icon, platform.small_icon_level));
        builder.sort_key = platform.sort_key.clone();
        builder.ticker = platform.ticker.clone();
        builder.timeout_after = platform.timeout_after.map(Duration::from_millis);
        if !platform.vibration_pattern.is_empty() {
            builder.vibrate = Some(platform.vibration_pattern.clone());
        }
        builder.visibility = platform.visibility;
        builder.when = platform.timestamp.filter(|timestamp| *timestamp > -1);
        builder.auto_cancel = platform.auto_cancel;

        Ok(builder)
    }

    async fn large_icon_stage(&self, spec: &NotificationSpec, mut builder: ArtifactBuilder) -> ArtifactBuilder {
        let Some(reference) = spec.platform.large_icon.as_deref() else {
            return builder;
        };

        match resolve_bitmap_within(self.resolver.as_ref(), reference, self.asset_timeout).await {
            Ok(bitmap) => {
                builder.large_icon = Some(if spec.platform.circular_large_icon {
                    bitmap.circular()
                } else {
                    bitmap
                });
            },
            Err(e) => {
                tracing::error!(
                    notification_id = %spec.id,
                    asset = %reference,
                    cause = e.failure_cause(),
                    "Unable to retrieve large icon: {}",
                    e
                );
            },
        }

        builder
    }

    fn full_screen_stage(&self, spec: &NotificationSpec, mut builder: ArtifactBuilder) -> NotificationResult<ArtifactBuilder> {
        let Some(action) = &spec.platform.full_screen_action else {
            return Ok(builder);
        };

        let requested = action.launch_activity.as_deref().unwrap_or(DEFAULT_LAUNCH_SURFACE);
        let surface = self
            .launch_surfaces
            .resolve(requested)
            .ok_or_else(|| NotificationError::Resolution {
                surface: requested.to_string(),
            })?;

        // Lets the host pre-warm the component before the intent fires
        if let Some(component) = &action.main_component {
            self.events.post_sticky(BusEvent::MainComponent(component.clone()));
        }

        builder.full_screen_intent = Some(FullScreenIntent {
            request_code: spec.handle().as_i32(),
            surface,
            notification_id: spec.id.clone(),
            main_component: action.main_component.clone(),
            flags: action.launch_activity_flags.filter(|flags| *flags != -1),
            high_priority: true,
        });

        Ok(builder)
    }

    async fn actions_stage(&self, spec: &NotificationSpec, mut builder: ArtifactBuilder) -> ArtifactBuilder {
        let actions = &spec.platform.actions;
        if actions.is_empty() {
            return builder;
        }

        // Icons resolve concurrently, each with its own bounded wait
        let fetches: Vec<_> = actions
            .iter()
            .map(|action| {
                let reference = action.icon.clone()?;
                let resolver = Arc::clone(&self.resolver);
                let timeout = self.asset_timeout;
                Some(self.handle.spawn(async move {
                    let result = resolve_bitmap_within(resolver.as_ref(), &reference, timeout).await;
                    (reference, result)
                }))
            })
            .collect();

        for (action, fetch) in actions.iter().zip(fetches) {
            let icon = match fetch {
                Some(task) => self.join_icon(spec, task).await,
                None => None,
            };

            builder.add_action(BuiltAction {
                title: RenderedText::from_html(&action.title),
                icon,
                intent: PendingIntent::new(IntentKind::ActionPress, spec, Some(action.press_action.clone())),
                remote_input: action.input.clone(),
            });
        }

        builder
    }

    async fn join_icon(
        &self,
        spec: &NotificationSpec,
        task: tokio::task::JoinHandle<(String, NotificationResult<Bitmap>)>,
    ) -> Option<Bitmap> {
        match task.await {
            Ok((_, Ok(bitmap))) => Some(bitmap),
            Ok((reference, Err(e))) => {
                tracing::error!(
                    notification_id = %spec.id,
                    asset = %reference,
                    cause = e.failure_cause(),
                    "Unable to retrieve action icon: {}",
                    e
                );
                None
            },
            Err(e) => {
                tracing::error!(notification_id = %spec.id, cause = "error", "Action icon task failed: {}", e);
                None
            },
        }
    }

    async fn style_stage(&self, spec: &NotificationSpec, mut builder: ArtifactBuilder) -> ArtifactBuilder {
        let Some(style) = &spec.platform.style else {
            return builder;
        };

        let resolution = style.resolve(Arc::clone(&self.resolver), self.asset_timeout);
        match tokio::time::timeout(self.style_timeout, resolution).await {
            Ok(resolved) => builder.style = Some(resolved),
            Err(_) => {
                tracing::error!(
                    notification_id = %spec.id,
                    asset = style.name(),
                    cause = "timeout",
                    "Style resolution exceeded {:?}, delivering unstyled",
                    self.style_timeout
                );
            },
        }

        builder
    }
}
