//! Verification-code extraction for counterpart messages.
//!
//! The counterpart occasionally interrupts the cycle with an anti-macro
//! check that has to be answered with `/verify <code>`. The code can show
//! up in several places, so extraction is an ordered list of rules:
//!
//! 1. embed description, `code: XXXX`
//! 2. embed description, ``verify with ... `XXXX` ``
//! 3. embed description, any quoted 4–10 char token, when the title mentions "verify"
//! 4. embed fields in order, `code: XXXX`
//! 5. plain message content, `code: XXXX`
//!
//! Only the first embed of a message is inspected.

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::transport::{Embed, IncomingMessage};

/// "code" must be followed by a colon or an opening quote, so prose such
/// as "no code here" never yields a token.
const CODE_PATTERN: &str = r#"(?i)\bcode(?::\s*[`"']?|\s*[`"'])([A-Za-z0-9]+)[`"']?"#;
const VERIFY_WITH_PATTERN: &str = r#"(?i)verify with[^`"']*[`"']([A-Za-z0-9]+)[`"']"#;
const QUOTED_TOKEN_PATTERN: &str = r#"[`"']([A-Za-z0-9]{4,10})[`"']"#;

/// Which part of the message a rule reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    EmbedDescription,
    /// Each field value in order; the first matching field wins.
    EmbedFields,
    Content,
}

impl RuleSource {
    pub fn is_embed(&self) -> bool {
        !matches!(self, Self::Content)
    }
}

/// A single extraction rule. The code is capture group 1.
#[derive(Debug, Clone)]
pub struct CodeRule {
    pub name: String,
    pub regex: Regex,
    pub source: RuleSource,
    /// Only applies when the embed title contains this text (case-insensitive).
    pub title_hint: Option<String>,
}

/// A code found by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub code: String,
    pub rule: String,
    pub source: RuleSource,
}

/// Ordered, first-match-wins code extractor.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<CodeRule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::default_rules()
    }
}

impl Classifier {
    /// The built-in rule chain.
    pub fn default_rules() -> Self {
        let rules = vec![
            CodeRule {
                name: "description_code".into(),
                regex: Regex::new(CODE_PATTERN).unwrap(),
                source: RuleSource::EmbedDescription,
                title_hint: None,
            },
            CodeRule {
                name: "description_verify_with".into(),
                regex: Regex::new(VERIFY_WITH_PATTERN).unwrap(),
                source: RuleSource::EmbedDescription,
                title_hint: None,
            },
            CodeRule {
                name: "verify_title_hint".into(),
                regex: Regex::new(QUOTED_TOKEN_PATTERN).unwrap(),
                source: RuleSource::EmbedDescription,
                title_hint: Some("verify".into()),
            },
            CodeRule {
                name: "field_code".into(),
                regex: Regex::new(CODE_PATTERN).unwrap(),
                source: RuleSource::EmbedFields,
                title_hint: None,
            },
            CodeRule {
                name: "content_code".into(),
                regex: Regex::new(CODE_PATTERN).unwrap(),
                source: RuleSource::Content,
                title_hint: None,
            },
        ];

        Self { rules }
    }

    /// A classifier with no rules (for custom chains and tests).
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule to the end of the chain.
    pub fn push_rule(
        &mut self,
        name: &str,
        pattern: &str,
        source: RuleSource,
        title_hint: Option<&str>,
    ) -> Result<(), regex::Error> {
        self.rules.push(CodeRule {
            name: name.into(),
            regex: Regex::new(pattern)?,
            source,
            title_hint: title_hint.map(str::to_lowercase),
        });
        Ok(())
    }

    pub fn rules(&self) -> &[CodeRule] {
        &self.rules
    }

    /// First code found by any rule, in chain order.
    pub fn classify(&self, message: &IncomingMessage) -> Option<Detection> {
        self.rules.iter().find_map(|rule| apply(rule, message))
    }

    /// Every independent detection for a message.
    ///
    /// Embed rules and content rules are separate chains: a message can
    /// yield one embed-derived code and one content-derived code, and
    /// each is answered on its own.
    pub fn scan(&self, message: &IncomingMessage) -> Vec<Detection> {
        let from_embed = self
            .rules
            .iter()
            .filter(|r| r.source.is_embed())
            .find_map(|rule| apply(rule, message));
        let from_content = self
            .rules
            .iter()
            .filter(|r| !r.source.is_embed())
            .find_map(|rule| apply(rule, message));

        from_embed.into_iter().chain(from_content).collect()
    }
}

fn apply(rule: &CodeRule, message: &IncomingMessage) -> Option<Detection> {
    let code = match rule.source {
        RuleSource::EmbedDescription => {
            let embed = message.first_embed()?;
            if !title_matches(rule, embed) {
                return None;
            }
            capture(&rule.regex, embed.description.as_deref()?)
        }
        RuleSource::EmbedFields => {
            let embed = message.first_embed()?;
            if !title_matches(rule, embed) {
                return None;
            }
            embed
                .fields
                .iter()
                .filter(|f| !f.value.is_empty())
                .find_map(|f| capture(&rule.regex, &f.value))
        }
        RuleSource::Content => capture(&rule.regex, &message.content),
    }?;

    debug!(rule = %rule.name, code = %code, "Found verification code");
    Some(Detection {
        code,
        rule: rule.name.clone(),
        source: rule.source,
    })
}

fn title_matches(rule: &CodeRule, embed: &Embed) -> bool {
    match &rule.title_hint {
        None => true,
        Some(hint) => embed
            .title
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(hint.as_str())),
    }
}

fn capture(regex: &Regex, haystack: &str) -> Option<String> {
    regex
        .captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
}
