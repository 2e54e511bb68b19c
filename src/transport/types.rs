//! Chat message types shared by transports, the classifier and the event wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ChannelType;

// ── Conversations ───────────────────────────────────────────────────

/// A resolved conversation that commands can be sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Channel id the transport sends into.
    pub id: String,
    /// Display name used in log lines.
    pub name: String,
    pub kind: ChannelType,
}

impl Target {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ChannelType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }
}

/// The account the transport is logged in as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    /// `name#discriminator` style tag for display.
    pub tag: String,
}

// ── Inbound messages ────────────────────────────────────────────────

/// A message delivered by the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    #[serde(default)]
    pub id: String,
    pub author_id: String,
    /// Conversation the message was posted in.
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Embed>,
}

impl IncomingMessage {
    pub fn new(author_id: &str, content: &str) -> Self {
        Self {
            author_id: author_id.to_string(),
            content: content.to_string(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_channel(mut self, channel_id: &str) -> Self {
        self.channel_id = channel_id.to_string();
        self
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    /// Only the first embed is ever inspected.
    pub fn first_embed(&self) -> Option<&Embed> {
        self.embeds.first()
    }
}

/// Rich embed payload, in the normalized shape forwarded to the host shell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// 24-bit RGB.
    #[serde(default)]
    pub color: Option<u32>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    #[serde(default)]
    pub author: Option<EmbedAuthor>,
    #[serde(default)]
    pub footer: Option<EmbedFooter>,
    /// Thumbnail URL.
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Image URL.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Embed {
    pub fn titled(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_field(mut self, name: &str, value: &str, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.to_string(),
            value: value.to_string(),
            inline,
        });
        self
    }

    /// Drop empty strings so downstream consumers only see real content.
    pub fn normalized(&self) -> Self {
        let keep = |s: &Option<String>| s.as_ref().filter(|v| !v.is_empty()).cloned();
        Self {
            title: keep(&self.title),
            description: keep(&self.description),
            color: self.color.filter(|c| *c != 0),
            fields: self.fields.clone(),
            author: self.author.clone(),
            footer: self.footer.clone(),
            thumbnail: keep(&self.thumbnail),
            image: keep(&self.image),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(rename = "iconURL", default)]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(rename = "iconURL", default)]
    pub icon_url: Option<String>,
}
