// Notification specification and rich text rendering
// Title, subtitle and body are HTML-capable strings rendered in the base stage

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::platform::PlatformSpec;
use super::{NotificationError, NotificationHandle, NotificationResult};

/// Declarative description of a notification.
///
/// Immutable once submitted to the pipeline. Equality and hashing are by `id`
/// only, which is what dedup and replace semantics key on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSpec {
    /// Stable identity, survives serialization and rehydration
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Opaque payload carried through to the artifact extras
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub platform: PlatformSpec,
}

impl NotificationSpec {
    pub fn new(id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            subtitle: None,
            body: None,
            data: BTreeMap::new(),
            platform: PlatformSpec::new(channel_id),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_platform(mut self, platform: PlatformSpec) -> Self {
        self.platform = platform;
        self
    }

    /// Platform notification handle for this spec
    pub fn handle(&self) -> NotificationHandle {
        NotificationHandle::from_id(&self.id)
    }

    pub fn validate(&self) -> NotificationResult<()> {
        if self.id.is_empty() {
            return Err(NotificationError::Validation {
                field: "id".to_string(),
                message: "Notification id cannot be empty".to_string(),
            });
        }

        if self.platform.channel_id.is_empty() {
            return Err(NotificationError::Validation {
                field: "platform.channelId".to_string(),
                message: "Channel id cannot be empty".to_string(),
            });
        }

        for (index, action) in self.platform.actions.iter().enumerate() {
            if action.title.is_empty() {
                return Err(NotificationError::Validation {
                    field: format!("platform.actions[{}].title", index),
                    message: "Action title cannot be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Serialized form stored in trigger records and handed to foreground services
    pub fn to_bytes(&self) -> NotificationResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> NotificationResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl PartialEq for NotificationSpec {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NotificationSpec {}

impl std::hash::Hash for NotificationSpec {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Text as rendered onto the artifact: a plain fallback plus sanitized markup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedText {
    pub plain: String,
    pub markup: String,
}

impl RenderedText {
    /// Render an HTML-capable notification string
    pub fn from_html(source: &str) -> Self {
        Self {
            plain: convert_html_to_plain(source),
            markup: sanitize_html(source),
        }
    }

    /// Pango markup for Linux D-Bus notifications.
    /// Supports: <b>, <i>, <u>, <s>, <tt>, <a href="...">
    pub fn to_pango_markup(&self) -> String {
        convert_html_to_pango(&self.markup)
    }
}

// Utility functions for content processing

fn sanitize_html(html: &str) -> String {
    use ammonia::Builder;

    // clean() never fails, disallowed content is stripped
    Builder::default()
        .add_tags(&["p", "br", "strong", "em", "b", "i", "u", "s", "ul", "ol", "li", "a", "span", "div", "font"])
        .add_tag_attributes("a", &["href", "title"])
        .add_tag_attributes("span", &["class"])
        .add_tag_attributes("font", &["color"])
        .link_rel(Some("noopener noreferrer"))
        // Only http/https URLs (blocks javascript:, data:, vbscript:)
        .url_schemes(HashSet::from(["https", "http"]))
        .clean(html)
        .to_string()
}

fn convert_html_to_plain(html: &str) -> String {
    let decoded = decode_html_entities(html);

    // Block-level elements become newlines
    let step1 = match regex::Regex::new(
        r"(?i)</?(?:p|div|br\s*/?\s*|h[1-6]|li|ul|ol|table|tr|td|th|blockquote|pre)[^>]*>",
    ) {
        Ok(re) => re.replace_all(&decoded, "\n").to_string(),
        Err(_) => decoded.clone(),
    };

    let step2 = match regex::Regex::new(r"<[^>]+>") {
        Ok(re) => re.replace_all(&step1, "").to_string(),
        Err(_) => step1,
    };

    step2
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_html_entities(html: &str) -> String {
    // &amp; last to prevent double-decoding (e.g., &amp;lt; -> &lt; -> <)
    html.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn convert_html_to_pango(html: &str) -> String {
    let mut result = decode_html_entities(html);

    let rewrites: [(&str, &str); 8] = [
        (r"(?i)<strong[^>]*>", "<b>"),
        (r"(?i)</strong>", "</b>"),
        (r"(?i)<em[^>]*>", "<i>"),
        (r"(?i)</em>", "</i>"),
        (r"(?i)<(code|pre)[^>]*>", "<tt>"),
        (r"(?i)</(code|pre)>", "</tt>"),
        (r"(?i)<(del|strike)[^>]*>", "<s>"),
        (r"(?i)</(del|strike)>", "</s>"),
    ];
    for (pattern, replacement) in rewrites {
        if let Ok(re) = regex::Regex::new(pattern) {
            result = re.replace_all(&result, replacement).to_string();
        }
    }

    // Links keep href only
    if let Ok(re) = regex::Regex::new(r#"(?i)<a\s+[^>]*href="([^"]+)"[^>]*>"#) {
        result = re.replace_all(&result, r#"<a href="$1">"#).to_string();
    }

    if let Ok(re) = regex::Regex::new(r"(?i)</?(div|p|li|tr)[^>]*>|<br\s*/?\s*>") {
        result = re.replace_all(&result, "\n").to_string();
    }

    // Strip remaining unsupported tags, keep b, i, u, s, tt, a
    if let Ok(re) = regex::Regex::new(r"</?([a-zA-Z][a-zA-Z0-9]*)[^>]*>") {
        let allowed_tags = ["b", "i", "u", "s", "tt", "a"];
        result = re
            .replace_all(&result, |caps: &regex::Captures| {
                let tag_name = caps.get(1).map_or("", |m| m.as_str()).to_lowercase();
                if allowed_tags.contains(&tag_name.as_str()) {
                    caps.get(0).map_or("", |m| m.as_str()).to_string()
                } else {
                    String::new()
                }
            })
            .to_string();
    }

    if let Ok(re) = regex::Regex::new(r"\n{3,}") {
        result = re.replace_all(&result, "\n\n").to_string();
    }

    result.trim().to_string()
}
