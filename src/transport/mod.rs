//! Chat transport abstraction.
//!
//! The chat platform client is an external collaborator. Everything the
//! automation needs from it is captured by [`ChatTransport`]: log in, hand
//! over a stream of inbound messages, resolve conversations and send
//! slash commands to the counterpart.

pub mod dry_run;
pub mod types;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::TransportError;

pub use dry_run::DryRunTransport;
pub use types::*;

/// Stream of inbound messages, live for the duration of a session.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A logged-in session.
pub struct Session {
    pub user: UserInfo,
    pub messages: MessageStream,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport name (for logging).
    fn name(&self) -> &str;

    /// Log in and start receiving messages.
    async fn connect(&self) -> Result<Session, TransportError>;

    /// Look up a guild channel by id.
    async fn resolve_channel(&self, channel_id: &str) -> Result<Target, TransportError>;

    /// Open (or reuse) a DM conversation with a user.
    async fn open_dm(&self, user_id: &str) -> Result<Target, TransportError>;

    /// Invoke `/command args..` of application `bot_id` in `target`.
    async fn send_slash(
        &self,
        target: &Target,
        bot_id: &str,
        command: &str,
        args: &[String],
    ) -> Result<(), TransportError>;

    /// Post a plain text message into a channel.
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), TransportError>;

    /// Release the connection.
    async fn shutdown(&self) -> Result<(), TransportError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording transport shared by unit tests.

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentCommand {
        pub target: String,
        pub bot_id: String,
        pub command: String,
        pub args: Vec<String>,
    }

    #[derive(Default)]
    pub struct RecordingTransport {
        pub sent: Mutex<Vec<SentCommand>>,
        pub texts: Mutex<Vec<(String, String)>>,
        pub fail_sends: AtomicBool,
    }

    impl RecordingTransport {
        pub fn sent(&self) -> Vec<SentCommand> {
            self.sent.lock().unwrap().clone()
        }

        /// Plain-text replies as `(channel_id, text)`.
        pub fn texts(&self) -> Vec<(String, String)> {
            self.texts.lock().unwrap().clone()
        }

        pub fn count(&self, command: &str) -> usize {
            self.sent().iter().filter(|c| c.command == command).count()
        }

        pub fn set_failing(&self, failing: bool) {
            self.fail_sends.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        async fn connect(&self) -> Result<Session, TransportError> {
            Ok(Session {
                user: UserInfo {
                    id: "self".into(),
                    tag: "tester#0001".into(),
                },
                messages: Box::pin(futures::stream::pending()),
            })
        }

        async fn resolve_channel(&self, channel_id: &str) -> Result<Target, TransportError> {
            Ok(Target::new(channel_id, format!("#{channel_id}"), crate::config::ChannelType::Server))
        }

        async fn open_dm(&self, user_id: &str) -> Result<Target, TransportError> {
            Ok(Target::new(user_id, format!("@{user_id}"), crate::config::ChannelType::Dm))
        }

        async fn send_slash(
            &self,
            target: &Target,
            bot_id: &str,
            command: &str,
            args: &[String],
        ) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(SentCommand {
                target: target.id.clone(),
                bot_id: bot_id.to_string(),
                command: command.to_string(),
                args: args.to_vec(),
            });
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(TransportError::SendFailed {
                    name: "recording".into(),
                    command: command.into(),
                    reason: "simulated outage".into(),
                });
            }
            Ok(())
        }

        async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), TransportError> {
            self.texts
                .lock()
                .unwrap()
                .push((channel_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }
}
