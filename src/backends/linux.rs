// Linux D-Bus notification surface (org.freedesktop.Notifications)

use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use zbus::Connection;
use zbus::zvariant::Value;

use super::{BoxFuture, NotificationSurface};
use crate::components::{Artifact, NotificationError, NotificationHandle, NotificationResult, Priority};

#[zbus::proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    /// Send a notification to the desktop notification daemon
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: Vec<&str>,
        hints: HashMap<&str, Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;

    /// Get the capabilities supported by the notification server
    fn get_capabilities(&self) -> zbus::Result<Vec<String>>;

    /// Close a notification
    fn close_notification(&self, id: u32) -> zbus::Result<()>;
}

fn dbus_error(context: &str, error: zbus::Error) -> NotificationError {
    NotificationError::Delivery {
        message: format!("{}: {:?}", context, error),
    }
}

pub struct LinuxSurface {
    app_name: String,
    connection: OnceCell<Connection>,
    capabilities: OnceCell<Vec<String>>,
    /// Notification handle -> server-assigned id, for replace and close
    server_ids: DashMap<NotificationHandle, u32>,
}

impl LinuxSurface {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            connection: OnceCell::new(),
            capabilities: OnceCell::new(),
            server_ids: DashMap::new(),
        }
    }

    async fn proxy(&self) -> NotificationResult<NotificationsProxy<'static>> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                Connection::session()
                    .await
                    .map_err(|e| dbus_error("Failed to connect to D-Bus session", e))
            })
            .await?
            .clone();

        NotificationsProxy::new(&connection)
            .await
            .map_err(|e| dbus_error("Failed to create D-Bus proxy", e))
    }

    async fn supports_markup(&self, proxy: &NotificationsProxy<'static>) -> bool {
        self.capabilities
            .get_or_try_init(|| async { proxy.get_capabilities().await })
            .await
            .map(|caps| caps.iter().any(|cap| cap == "body-markup"))
            .unwrap_or(false)
    }

    fn create_hints(artifact: &Artifact) -> HashMap<&'static str, Value<'static>> {
        let mut hints = HashMap::new();

        let urgency = match artifact.priority {
            Priority::Min | Priority::Low => 0u8,
            Priority::Default => 1u8,
            Priority::High | Priority::Max => 2u8,
        };
        hints.insert("urgency", Value::U8(urgency));

        if let Some(category) = &artifact.category {
            hints.insert("category", Value::from(category.clone()));
        }

        if artifact.ongoing {
            hints.insert("resident", Value::Bool(true));
        }

        hints
    }
}

impl NotificationSurface for LinuxSurface {
    fn notify<'a>(&'a self, handle: NotificationHandle, artifact: &'a Artifact) -> BoxFuture<'a, NotificationResult<()>> {
        Box::pin(async move {
            let proxy = self.proxy().await?;
            let markup = self.supports_markup(&proxy).await;

            let summary = artifact
                .content_title
                .as_ref()
                .map(|title| title.plain.clone())
                .unwrap_or_default();
            let body = artifact
                .content_text
                .as_ref()
                .map(|text| if markup { text.to_pango_markup() } else { text.plain.clone() })
                .unwrap_or_default();

            let mut actions = Vec::with_capacity(artifact.actions.len() * 2);
            for action in &artifact.actions {
                let key = action
                    .intent
                    .press_action
                    .as_ref()
                    .map(|press| press.id.as_str())
                    .unwrap_or("default");
                actions.push(key);
                actions.push(action.title.plain.as_str());
            }

            let expire_timeout = artifact
                .timeout_after
                .map(|timeout| i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX))
                .unwrap_or(-1);
            let replaces_id = self.server_ids.get(&handle).map(|id| *id).unwrap_or(0);

            let server_id = proxy
                .notify(
                    &self.app_name,
                    replaces_id,
                    artifact.small_icon.as_ref().map(|(icon, _)| icon.as_str()).unwrap_or(""),
                    &summary,
                    &body,
                    actions,
                    Self::create_hints(artifact),
                    expire_timeout,
                )
                .await
                .map_err(|e| dbus_error("Failed to send D-Bus notification", e))?;

            self.server_ids.insert(handle, server_id);
            tracing::debug!(handle = %handle, server_id, "Posted D-Bus notification");
            Ok(())
        })
    }

    fn cancel(&self, handle: NotificationHandle) -> BoxFuture<'_, NotificationResult<()>> {
        Box::pin(async move {
            let Some((_, server_id)) = self.server_ids.remove(&handle) else {
                return Ok(());
            };
            self.proxy()
                .await?
                .close_notification(server_id)
                .await
                .map_err(|e| dbus_error("Failed to close D-Bus notification", e))
        })
    }

    fn cancel_all(&self) -> BoxFuture<'_, NotificationResult<()>> {
        Box::pin(async move {
            let handles: Vec<NotificationHandle> = self.server_ids.iter().map(|entry| *entry.key()).collect();
            for handle in handles {
                if let Err(e) = self.cancel(handle).await {
                    tracing::warn!(handle = %handle, "Failed to close notification: {}", e);
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ArtifactBuilder;

    #[test]
    fn hints_follow_priority_and_flags() {
        let mut artifact = ArtifactBuilder::new(NotificationHandle::from_id("n1"), "default").build();
        artifact.priority = Priority::High;
        artifact.category = Some("call".to_string());
        artifact.ongoing = true;

        let hints = LinuxSurface::create_hints(&artifact);
        assert_eq!(hints.get("urgency"), Some(&Value::U8(2)));
        assert_eq!(hints.get("category"), Some(&Value::from("call".to_string())));
        assert_eq!(hints.get("resident"), Some(&Value::Bool(true)));

        let quiet = ArtifactBuilder::new(NotificationHandle::from_id("n2"), "default").build();
        let hints = LinuxSurface::create_hints(&quiet);
        assert_eq!(hints.get("urgency"), Some(&Value::U8(1)));
        assert!(!hints.contains_key("resident"));
    }
}
