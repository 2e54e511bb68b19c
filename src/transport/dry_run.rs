//! Dry-run transport: logs outgoing commands instead of sending them.
//!
//! Inbound traffic can be simulated with a JSON-lines feed file, one
//! [`IncomingMessage`] per line, replayed at a fixed pace after login.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::config::ChannelType;
use crate::error::TransportError;
use crate::transport::{ChatTransport, IncomingMessage, Session, Target, UserInfo};

/// Transport that never talks to the network.
pub struct DryRunTransport {
    token: SecretString,
    feed: Option<PathBuf>,
    pace: Duration,
}

impl DryRunTransport {
    pub fn new(token: SecretString) -> Self {
        Self {
            token,
            feed: None,
            pace: Duration::from_secs(1),
        }
    }

    /// Replay `path` as inbound traffic, one message every `pace`.
    pub fn with_feed(mut self, path: impl Into<PathBuf>, pace: Duration) -> Self {
        self.feed = Some(path.into());
        self.pace = pace;
        self
    }
}

/// Platform ids are decimal snowflakes.
fn is_snowflake(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Parse one feed line; blank lines and `#` comments are skipped.
pub fn parse_feed_line(line: &str) -> Result<Option<IncomingMessage>, TransportError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| TransportError::InvalidMessage(e.to_string()))
}

#[async_trait]
impl ChatTransport for DryRunTransport {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn connect(&self) -> Result<Session, TransportError> {
        if self.token.expose_secret().trim().is_empty() {
            return Err(TransportError::ConnectFailed {
                name: "dry-run".into(),
                reason: "empty token".into(),
            });
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        if let Some(path) = self.feed.clone() {
            let file = tokio::fs::File::open(&path).await?;
            let pace = self.pace;

            tokio::spawn(async move {
                info!(feed = %path.display(), "Replaying inbound feed");
                let mut lines = BufReader::new(file).lines();

                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => match parse_feed_line(&line) {
                            Ok(Some(msg)) => {
                                tokio::time::sleep(pace).await;
                                if tx.send(msg).is_err() {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => warn!("Skipping feed line: {e}"),
                        },
                        Ok(None) => {
                            debug!("Feed exhausted");
                            break;
                        }
                        Err(e) => {
                            warn!("Error reading feed: {e}");
                            break;
                        }
                    }
                }

                // Keep the session open after the feed runs dry.
                tx.closed().await;
            });
        } else {
            // No feed: the stream stays open until shutdown.
            tokio::spawn(async move { tx.closed().await });
        }

        Ok(Session {
            user: UserInfo {
                id: "0".into(),
                tag: "dry-run#0000".into(),
            },
            messages: Box::pin(UnboundedReceiverStream::new(rx)),
        })
    }

    async fn resolve_channel(&self, channel_id: &str) -> Result<Target, TransportError> {
        if !is_snowflake(channel_id) {
            return Err(TransportError::TargetNotFound {
                kind: "channel".into(),
                id: channel_id.into(),
            });
        }
        Ok(Target::new(channel_id, format!("channel-{channel_id}"), ChannelType::Server))
    }

    async fn open_dm(&self, user_id: &str) -> Result<Target, TransportError> {
        if !is_snowflake(user_id) {
            return Err(TransportError::TargetNotFound {
                kind: "user".into(),
                id: user_id.into(),
            });
        }
        Ok(Target::new(user_id, format!("user-{user_id}"), ChannelType::Dm))
    }

    async fn send_slash(
        &self,
        target: &Target,
        bot_id: &str,
        command: &str,
        args: &[String],
    ) -> Result<(), TransportError> {
        info!(
            channel = %target.name,
            bot = %bot_id,
            args = %args.join(" "),
            "[dry-run] /{command}"
        );
        Ok(())
    }

    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), TransportError> {
        info!(channel = %channel_id, "[dry-run] {text}");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        info!("Dry-run transport shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use futures::StreamExt;

    use super::*;

    fn transport() -> DryRunTransport {
        DryRunTransport::new(SecretString::from("tok".to_string()))
    }

    #[test]
    fn feed_line_parsing() {
        assert!(parse_feed_line("").unwrap().is_none());
        assert!(parse_feed_line("# comment").unwrap().is_none());
        assert!(parse_feed_line("{not json").is_err());

        let msg = parse_feed_line(r#"{"authorId": "1", "content": "Code: AB12"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(msg.content, "Code: AB12");
    }

    #[tokio::test]
    async fn empty_token_refused() {
        let transport = DryRunTransport::new(SecretString::from(String::new()));
        assert!(matches!(
            transport.connect().await,
            Err(TransportError::ConnectFailed { .. })
        ));
    }

    #[tokio::test]
    async fn resolves_numeric_ids_only() {
        let transport = transport();
        let target = transport.resolve_channel("1234").await.unwrap();
        assert_eq!(target.kind, ChannelType::Server);
        assert!(matches!(
            transport.resolve_channel("general").await,
            Err(TransportError::TargetNotFound { .. })
        ));
        assert_eq!(transport.open_dm("99").await.unwrap().kind, ChannelType::Dm);
        assert!(transport.open_dm("").await.is_err());
    }

    #[tokio::test]
    async fn replays_feed_messages() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"authorId": "7", "content": "first"}}"#).unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file, r#"{{"authorId": "7", "content": "second"}}"#).unwrap();

        let transport = transport().with_feed(file.path(), Duration::from_millis(1));
        let mut session = transport.connect().await.unwrap();

        let first = session.messages.next().await.unwrap();
        let second = session.messages.next().await.unwrap();
        assert_eq!(first.content, "first");
        assert_eq!(second.content, "second");
    }

    #[tokio::test]
    async fn missing_feed_file_is_an_error() {
        let transport = transport().with_feed("/nonexistent/feed.jsonl", Duration::from_millis(1));
        assert!(matches!(transport.connect().await, Err(TransportError::Io(_))));
    }
}
