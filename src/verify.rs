//! Delayed `/verify` replies.
//!
//! Each detected code gets its own one-shot timer with a random delay in
//! `[1500, 2500)` ms. Scheduled replies are neither cancelled by stopping
//! the cycle nor deduplicated.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::events::EventSink;
use crate::transport::{ChatTransport, Target};

/// Slash command used to answer a verification check.
pub const VERIFY_COMMAND: &str = "verify";

/// Reply delay window, in milliseconds.
pub const VERIFY_DELAY_MS: Range<u64> = 1500..2500;

/// Schedules verify sends to the counterpart.
pub struct VerifyDispatcher {
    transport: Arc<dyn ChatTransport>,
    sink: Arc<dyn EventSink>,
    bot_id: String,
    delay_ms: Range<u64>,
}

impl VerifyDispatcher {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        sink: Arc<dyn EventSink>,
        bot_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            sink,
            bot_id: bot_id.into(),
            delay_ms: VERIFY_DELAY_MS,
        }
    }

    /// Override the delay window. An empty range means no delay.
    pub fn with_delay(mut self, delay_ms: Range<u64>) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    fn pick_delay(&self) -> Duration {
        if self.delay_ms.is_empty() {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.delay_ms.clone()))
    }

    /// Schedule `/verify <code>` in `target`. Returns the chosen delay and
    /// the task handle; dropping the handle does not cancel the send.
    pub fn schedule(&self, target: Target, code: String) -> (Duration, JoinHandle<()>) {
        let delay = self.pick_delay();
        let transport = Arc::clone(&self.transport);
        let sink = Arc::clone(&self.sink);
        let bot_id = self.bot_id.clone();

        info!(code = %code, delay_ms = delay.as_millis() as u64, "Using verification code");

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let args = [code.clone()];
            match transport
                .send_slash(&target, &bot_id, VERIFY_COMMAND, &args)
                .await
            {
                Ok(()) => {
                    info!(code = %code, "Sent verification code");
                    sink.on_log(&format!("🔑 Sent verification code {code}"));
                }
                Err(e) => {
                    error!(code = %code, "Error sending verification code: {e}");
                    sink.on_log(&format!("❌ Error sending verification code: {e}"));
                }
            }
        });

        (delay, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelType;
    use crate::events::{ChannelSink, ProcessEvent};
    use crate::transport::testing::RecordingTransport;

    fn setup() -> (Arc<RecordingTransport>, VerifyDispatcher) {
        let transport = Arc::new(RecordingTransport::default());
        let (sink, _rx) = ChannelSink::new();
        let dispatcher = VerifyDispatcher::new(transport.clone(), Arc::new(sink), "bot");
        (transport, dispatcher)
    }

    fn target() -> Target {
        Target::new("c1", "pond", ChannelType::Server)
    }

    #[tokio::test(start_paused = true)]
    async fn delay_within_window() {
        let (_transport, dispatcher) = setup();
        for _ in 0..50 {
            let (delay, _) = dispatcher.schedule(target(), "ABC".into());
            assert!(delay >= Duration::from_millis(1500));
            assert!(delay < Duration::from_millis(2500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sends_after_delay() {
        let (transport, dispatcher) = setup();
        let (_, handle) = dispatcher.schedule(target(), "ABC123".into());

        tokio::time::sleep(Duration::from_millis(1400)).await;
        assert!(transport.sent().is_empty());

        handle.await.unwrap();
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].command, "verify");
        assert_eq!(sent[0].args, vec!["ABC123".to_string()]);
        assert_eq!(sent[0].bot_id, "bot");
    }

    #[tokio::test(start_paused = true)]
    async fn same_code_twice_is_sent_twice() {
        let (transport, dispatcher) = setup();
        let (_, a) = dispatcher.schedule(target(), "DUP1".into());
        let (_, b) = dispatcher.schedule(target(), "DUP1".into());
        a.await.unwrap();
        b.await.unwrap();
        assert_eq!(transport.count("verify"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_logged_not_raised() {
        let transport = Arc::new(RecordingTransport::default());
        transport.set_failing(true);
        let (sink, mut rx) = ChannelSink::new();
        let dispatcher =
            VerifyDispatcher::new(transport.clone(), Arc::new(sink), "bot").with_delay(0..0);

        let (delay, handle) = dispatcher.schedule(target(), "ERR1".into());
        assert_eq!(delay, Duration::ZERO);
        handle.await.unwrap();

        match rx.recv().await {
            Some(ProcessEvent::Log { content }) => {
                assert!(content.contains("Error sending verification code"))
            }
            other => panic!("expected log, got {other:?}"),
        }
    }
}
