// Platform notification styles
// Resolving a style may fetch bitmaps (big picture, messaging person icons)

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::artifact::Bitmap;
use super::content::RenderedText;
use crate::backends::{ResourceResolver, resolve_bitmap_within};

/// Requested style, one variant per platform style
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StyleSpec {
    BigPicture {
        picture: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        large_icon: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    BigText {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    Inbox {
        lines: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    Messaging {
        person: PersonSpec,
        messages: Vec<MessageSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default)]
        group: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub important: bool,
}

impl PersonSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            icon: None,
            bot: false,
            important: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSpec {
    pub text: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person: Option<PersonSpec>,
}

/// Style as attached to the artifact
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedStyle {
    BigPicture {
        picture: Option<Bitmap>,
        large_icon: Option<Bitmap>,
        title: Option<RenderedText>,
        summary: Option<RenderedText>,
    },
    BigText {
        text: RenderedText,
        title: Option<RenderedText>,
        summary: Option<RenderedText>,
    },
    Inbox {
        lines: Vec<RenderedText>,
        title: Option<RenderedText>,
        summary: Option<RenderedText>,
    },
    Messaging {
        person: ResolvedPerson,
        messages: Vec<ResolvedMessage>,
        title: Option<RenderedText>,
        group: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPerson {
    pub name: String,
    pub id: Option<String>,
    pub icon: Option<Bitmap>,
    pub bot: bool,
    pub important: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMessage {
    pub text: RenderedText,
    pub timestamp: i64,
    pub person: Option<ResolvedPerson>,
}

fn render(text: &Option<String>) -> Option<RenderedText> {
    text.as_deref().map(RenderedText::from_html)
}

impl StyleSpec {
    pub fn name(&self) -> &'static str {
        match self {
            StyleSpec::BigPicture { .. } => "bigPicture",
            StyleSpec::BigText { .. } => "bigText",
            StyleSpec::Inbox { .. } => "inbox",
            StyleSpec::Messaging { .. } => "messaging",
        }
    }

    /// Resolve into an attachable style.
    ///
    /// Bitmaps are fetched concurrently, each with `asset_timeout`; a failed
    /// fetch leaves that bitmap out and is logged, the rest of the style is
    /// still produced. Must run inside a tokio runtime.
    pub async fn resolve(
        &self,
        resolver: Arc<dyn ResourceResolver>,
        asset_timeout: Duration,
    ) -> ResolvedStyle {
        match self {
            StyleSpec::BigPicture {
                picture,
                large_icon,
                title,
                summary,
            } => {
                let large_icon_fetch = async {
                    match large_icon {
                        Some(reference) => {
                            fetch_soft(&resolver, reference, asset_timeout, "bigPicture.largeIcon").await
                        },
                        None => None,
                    }
                };
                let (picture, large_icon) = tokio::join!(
                    fetch_soft(&resolver, picture, asset_timeout, "bigPicture"),
                    large_icon_fetch
                );
                ResolvedStyle::BigPicture {
                    picture,
                    large_icon,
                    title: render(title),
                    summary: render(summary),
                }
            },
            StyleSpec::BigText {
                text,
                title,
                summary,
            } => ResolvedStyle::BigText {
                text: RenderedText::from_html(text),
                title: render(title),
                summary: render(summary),
            },
            StyleSpec::Inbox {
                lines,
                title,
                summary,
            } => ResolvedStyle::Inbox {
                lines: lines.iter().map(|line| RenderedText::from_html(line)).collect(),
                title: render(title),
                summary: render(summary),
            },
            StyleSpec::Messaging {
                person,
                messages,
                title,
                group,
            } => {
                // Every icon is fetched at once, the joins below keep message order
                let user = spawn_person(&resolver, person, asset_timeout);
                let senders: Vec<_> = messages
                    .iter()
                    .map(|message| {
                        message
                            .person
                            .as_ref()
                            .map(|sender| (sender, spawn_person(&resolver, sender, asset_timeout)))
                    })
                    .collect();

                let user = join_person(person, user).await;
                let mut resolved_messages = Vec::with_capacity(messages.len());
                for (message, sender) in messages.iter().zip(senders) {
                    let sender = match sender {
                        Some((spec, task)) => Some(join_person(spec, task).await),
                        None => None,
                    };
                    resolved_messages.push(ResolvedMessage {
                        text: RenderedText::from_html(&message.text),
                        timestamp: message.timestamp,
                        person: sender,
                    });
                }
                ResolvedStyle::Messaging {
                    person: user,
                    messages: resolved_messages,
                    title: render(title),
                    group: *group,
                }
            },
        }
    }
}

fn person_without_icon(person: &PersonSpec) -> ResolvedPerson {
    ResolvedPerson {
        name: person.name.clone(),
        id: person.id.clone(),
        icon: None,
        bot: person.bot,
        important: person.important,
    }
}

fn spawn_person(
    resolver: &Arc<dyn ResourceResolver>,
    person: &PersonSpec,
    asset_timeout: Duration,
) -> JoinHandle<ResolvedPerson> {
    let resolver = Arc::clone(resolver);
    let person = person.clone();
    tokio::spawn(async move {
        let mut resolved = person_without_icon(&person);
        if let Some(reference) = &person.icon {
            resolved.icon = fetch_soft(&resolver, reference, asset_timeout, "person.icon").await;
        }
        resolved
    })
}

async fn join_person(person: &PersonSpec, task: JoinHandle<ResolvedPerson>) -> ResolvedPerson {
    match task.await {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!(person = %person.name, cause = "error", "Person icon task failed: {}", e);
            person_without_icon(person)
        },
    }
}

async fn fetch_soft(
    resolver: &Arc<dyn ResourceResolver>,
    reference: &str,
    asset_timeout: Duration,
    slot: &'static str,
) -> Option<Bitmap> {
    match resolve_bitmap_within(resolver.as_ref(), reference, asset_timeout).await {
        Ok(bitmap) => Some(bitmap),
        Err(e) => {
            tracing::error!(
                asset = %reference,
                cause = e.failure_cause(),
                slot,
                "Unable to retrieve style image: {}",
                e
            );
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_uses_tagged_representation() {
        let style: StyleSpec = serde_json::from_str(
            r#"{"type":"bigPicture","picture":"https://example.com/p.png","largeIcon":"icon"}"#,
        )
        .unwrap();
        assert_eq!(
            style,
            StyleSpec::BigPicture {
                picture: "https://example.com/p.png".to_string(),
                large_icon: Some("icon".to_string()),
                title: None,
                summary: None,
            }
        );

        let unknown = serde_json::from_str::<StyleSpec>(r#"{"type":"carousel"}"#);
        assert!(unknown.is_err());
    }
}
