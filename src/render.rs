//! Embed rendering for the host shell.
//!
//! [`format_chat_text`] turns chat markup into safe HTML, [`embed_to_html`]
//! renders a whole embed card, and [`embed_summary`]/[`embed_to_text`]
//! produce terminal output.

use std::fmt::Write as _;
use std::sync::LazyLock;

use chrono::Local;
use regex::{Captures, Regex};

use crate::transport::Embed;

const EMOJI_CDN: &str = "https://cdn.discordapp.com/emojis";

// Patterns run on already-escaped text, hence `&lt;` / `&gt;` / `&amp;`.
static EMOJI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&lt;(a?):([A-Za-z0-9_]+):(\d+)&gt;").unwrap());
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.*?)\*").unwrap());
static STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~(.*?)~~").unwrap());
static UNDERLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__(.*?)__").unwrap());
static CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`(.*?)`").unwrap());
static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(https?://[^\s<]+)").unwrap());
static USER_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&lt;@!?(\d+)&gt;").unwrap());
static ROLE_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&lt;@&amp;(\d+)&gt;").unwrap());
static CHANNEL_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&lt;#(\d+)&gt;").unwrap());
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x00(\d+)\x00").unwrap());

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Render chat markup as HTML.
///
/// Input is escaped first. Custom emoji are swapped for placeholders before
/// the markdown passes so their names never pick up formatting.
pub fn format_chat_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let escaped = escape_html(text);
    let mut emoji = Vec::new();
    let text = EMOJI.replace_all(&escaped, |caps: &Captures| {
        let ext = if caps[1].is_empty() { "webp" } else { "gif" };
        let name = &caps[2];
        emoji.push(format!(
            r#"<span class="emoji-container"><img class="discord-emoji" alt=":{name}:" src="{EMOJI_CDN}/{id}.{ext}"></span>"#,
            id = &caps[3],
        ));
        format!("\u{0}{}\u{0}", emoji.len() - 1)
    });

    let text = BOLD.replace_all(&text, "<strong>$1</strong>");
    let text = ITALIC.replace_all(&text, "<em>$1</em>");
    let text = STRIKE.replace_all(&text, "<del>$1</del>");
    let text = UNDERLINE.replace_all(&text, "<u>$1</u>");
    let text = CODE.replace_all(&text, "<code>$1</code>");
    let text = URL.replace_all(
        &text,
        r#"<a href="$1" target="_blank" rel="noopener noreferrer">$1</a>"#,
    );
    let text = USER_MENTION.replace_all(&text, r#"<span class="discord-mention">@user</span>"#);
    let text = ROLE_MENTION.replace_all(&text, r#"<span class="discord-mention">@role</span>"#);
    let text =
        CHANNEL_MENTION.replace_all(&text, r#"<span class="discord-mention">#channel</span>"#);
    let text = text.replace('\n', "<br>");

    PLACEHOLDER
        .replace_all(&text, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| emoji.get(i).cloned())
                .unwrap_or_default()
        })
        .into_owned()
}

/// Render an embed card in the layout of the chat client.
pub fn embed_to_html(embed: &Embed) -> String {
    let mut html = String::from(r#"<div class="discord-embed">"#);

    if let Some(color) = embed.color {
        let _ = write!(
            html,
            r#"<div class="embed-color-bar" style="background-color: #{:06x}"></div>"#,
            color & 0xff_ffff
        );
    }

    html.push_str(r#"<div class="embed-content">"#);

    if let Some(author) = &embed.author {
        html.push_str(r#"<div class="embed-author">"#);
        if let Some(icon) = &author.icon_url {
            let _ = write!(
                html,
                r#"<img class="embed-author-icon" src="{}">"#,
                escape_html(icon)
            );
        }
        let _ = write!(html, "<span>{}</span></div>", escape_html(&author.name));
    }

    if let Some(title) = &embed.title {
        let _ = write!(html, r#"<div class="embed-title">{}</div>"#, escape_html(title));
    }

    if let Some(description) = &embed.description {
        let _ = write!(
            html,
            r#"<div class="embed-description">{}</div>"#,
            format_chat_text(description)
        );
    }

    if !embed.fields.is_empty() {
        html.push_str(r#"<div class="embed-fields">"#);
        for field in &embed.fields {
            let class = if field.inline {
                "embed-field embed-field-inline"
            } else {
                "embed-field"
            };
            let _ = write!(
                html,
                r#"<div class="{class}"><div class="embed-field-name">{}</div><div class="embed-field-value">{}</div></div>"#,
                escape_html(&field.name),
                format_chat_text(&field.value)
            );
        }
        html.push_str("</div>");
    }

    if let Some(image) = &embed.image {
        let _ = write!(html, r#"<img class="embed-image" src="{}">"#, escape_html(image));
    }

    if let Some(footer) = &embed.footer {
        html.push_str(r#"<div class="embed-footer">"#);
        if let Some(icon) = &footer.icon_url {
            let _ = write!(
                html,
                r#"<img class="embed-footer-icon" src="{}">"#,
                escape_html(icon)
            );
        }
        let _ = write!(html, "<span>{}</span>", escape_html(&footer.text));
        if let Some(ts) = embed.timestamp {
            let _ = write!(
                html,
                r#"<span class="embed-footer-timestamp"> • {}</span>"#,
                ts.with_timezone(&Local).format("%H:%M:%S")
            );
        }
        html.push_str("</div>");
    }

    html.push_str("</div>");

    // The thumbnail sits beside the content column.
    if let Some(thumbnail) = &embed.thumbnail {
        let _ = write!(
            html,
            r#"<div class="embed-thumbnail-container"><img class="embed-thumbnail" src="{}"></div>"#,
            escape_html(thumbnail)
        );
    }

    html.push_str("</div>");
    html
}

/// One log line announcing a received embed.
pub fn embed_summary(embed: &Embed) -> String {
    match embed.title.as_deref().filter(|t| !t.is_empty()) {
        Some(title) => format!("Received a message from fishing bot: \"{title}\""),
        None => "Received a message from fishing bot".to_string(),
    }
}

/// Plain-text card for terminals.
pub fn embed_to_text(embed: &Embed) -> String {
    let mut lines = Vec::new();
    if let Some(author) = &embed.author {
        lines.push(format!("  {}", author.name));
    }
    if let Some(title) = &embed.title {
        lines.push(format!("  ┃ {title}"));
    }
    if let Some(description) = &embed.description {
        lines.extend(description.lines().map(|l| format!("  ┃ {l}")));
    }
    for field in &embed.fields {
        lines.push(format!("  ┃ {}: {}", field.name, field.value));
    }
    if let Some(footer) = &embed.footer {
        lines.push(format!("  {}", footer.text));
    }
    lines.join("\n")
}
