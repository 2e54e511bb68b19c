//! Automation process runtime.
//!
//! Logs in through the transport, resolves the target conversation, then
//! multiplexes three inputs until shutdown:
//! - inbound chat messages (counterpart checks and owner commands)
//! - control commands from the host shell
//! - SIGINT / SIGTERM

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::classifier::{Classifier, Detection};
use crate::config::{ChannelType, FishingConfig};
use crate::controller::{FishingController, StartOutcome, ToggleOutcome};
use crate::error::TransportError;
use crate::events::{ControlCommand, EventSink, Status};
use crate::transport::{ChatTransport, IncomingMessage, Target, UserInfo};
use crate::verify::VerifyDispatcher;

/// Delay between a shutdown request and process exit.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Why [`FishingBot::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `shutdown` control command.
    Command,
    /// SIGINT or SIGTERM.
    Signal(&'static str),
    /// The transport ended the message stream.
    TransportClosed,
}

enum Flow {
    Continue,
    Shutdown,
}

/// The automation process: one transport session, one controller.
pub struct FishingBot {
    config: FishingConfig,
    transport: Arc<dyn ChatTransport>,
    sink: Arc<dyn EventSink>,
    controller: FishingController,
    classifier: Classifier,
    verifier: VerifyDispatcher,
    user: OnceLock<UserInfo>,
    grace: Duration,
}

impl FishingBot {
    pub fn new(
        config: FishingConfig,
        transport: Arc<dyn ChatTransport>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let controller = FishingController::new(
            Arc::clone(&transport),
            Arc::clone(&sink),
            config.bot_id.clone(),
            config.interval,
        );
        let verifier =
            VerifyDispatcher::new(Arc::clone(&transport), Arc::clone(&sink), config.bot_id.clone());

        Self {
            config,
            transport,
            sink,
            controller,
            classifier: Classifier::default_rules(),
            verifier,
            user: OnceLock::new(),
            grace: SHUTDOWN_GRACE,
        }
    }

    /// Replace the verification rule chain.
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replace the verify dispatcher (custom delay window).
    pub fn with_verifier(mut self, verifier: VerifyDispatcher) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn controller(&self) -> &FishingController {
        &self.controller
    }

    /// Run until shutdown. `control` carries commands from the host shell;
    /// when it ends the bot keeps running and only signals can stop it.
    pub async fn run<S>(&self, control: S) -> Result<ExitReason, TransportError>
    where
        S: Stream<Item = ControlCommand> + Send,
    {
        let session = self.transport.connect().await?;
        let mut messages = session.messages;
        let user = self.user.get_or_init(|| session.user);

        info!(user = %user.tag, transport = %self.transport.name(), "Ready to fish");
        self.sink.on_ready();
        self.sink.on_status(Status::Running);
        self.sink.on_log(&format!("Logged in as {}", user.tag));

        self.resolve_target().await;

        let mut control = std::pin::pin!(control);
        let mut control_open = true;
        let mut signal = std::pin::pin!(shutdown_signal());

        let reason = loop {
            tokio::select! {
                msg = messages.next() => match msg {
                    Some(msg) => {
                        self.handle_message(&msg).await;
                    }
                    None => break ExitReason::TransportClosed,
                },
                cmd = control.next(), if control_open => match cmd {
                    Some(cmd) => {
                        if let Flow::Shutdown = self.handle_command(cmd) {
                            break ExitReason::Command;
                        }
                    }
                    None => {
                        debug!("Control channel closed");
                        control_open = false;
                    }
                },
                name = &mut signal => break ExitReason::Signal(name),
            }
        };

        info!(?reason, "Shutting down");
        self.controller.stop();
        if let Err(e) = self.transport.shutdown().await {
            warn!("Transport shutdown failed: {e}");
        }
        tokio::time::sleep(self.grace).await;
        Ok(reason)
    }

    /// Resolve the configured conversation and auto-start if enabled.
    pub async fn resolve_target(&self) -> Option<Target> {
        let (kind_label, resolved) = match (self.config.channel_type, self.config.target_id()) {
            (_, None) => {
                self.sink
                    .on_log("❌ No target channel or user configured; fishing is unavailable");
                return None;
            }
            (ChannelType::Server, Some(id)) => ("channel", self.transport.resolve_channel(id).await),
            (ChannelType::Dm, Some(id)) => ("DM channel", self.transport.open_dm(id).await),
        };

        let target = match resolved {
            Ok(target) => target,
            Err(TransportError::TargetNotFound { kind, id }) => {
                warn!(%kind, %id, "Target not found");
                self.sink.on_log(&format!("❌ Could not find {kind} with ID: {id}"));
                return None;
            }
            Err(e) => {
                warn!("Error setting up {kind_label}: {e}");
                self.sink
                    .on_log(&format!("❌ Error setting up {kind_label}: {e}"));
                return None;
            }
        };

        let line = match target.kind {
            ChannelType::Server => format!("Found target server channel: {}", target.name),
            ChannelType::Dm => format!("Created DM channel with user: {}", target.name),
        };
        info!("{line}");
        self.sink.on_log(&line);

        self.controller.set_target(target.clone());
        if self.config.auto_start {
            self.controller.start(None);
        }
        Some(target)
    }

    /// Route one inbound message. Returns the codes scheduled for reply.
    pub async fn handle_message(&self, msg: &IncomingMessage) -> Vec<Detection> {
        if msg.author_id == self.config.bot_id {
            return self.handle_counterpart(msg);
        }
        if self.user.get().is_some_and(|u| u.id == msg.author_id) {
            self.handle_owner_command(msg).await;
        }
        Vec::new()
    }

    fn handle_counterpart(&self, msg: &IncomingMessage) -> Vec<Detection> {
        if !self.controller.is_active() {
            return Vec::new();
        }
        let Some(target) = self.controller.target() else {
            return Vec::new();
        };

        debug!(message_id = %msg.id, "Received message from fishing bot");
        if let Some(embed) = msg.first_embed() {
            self.sink.on_embed(embed, &msg.id);
        }

        let detections = self.classifier.scan(msg);
        for detection in &detections {
            self.sink.on_log(&format!(
                "🔎 Found verification code {} ({})",
                detection.code, detection.rule
            ));
            self.verifier.schedule(target.clone(), detection.code.clone());
        }
        detections
    }

    /// `!fish <#channel>` and `!togglefish`, typed by the logged-in account.
    async fn handle_owner_command(&self, msg: &IncomingMessage) {
        let mut words = msg.content.split_whitespace();
        let reply = match words.next() {
            Some("!fish") => {
                if self.controller.stop() {
                    "⚠️ Stopped fishing session.".to_string()
                } else {
                    match words.next() {
                        None => "❌ Please specify a channel: !fish <channel>".to_string(),
                        Some(mention) => self.start_in_mention(mention).await,
                    }
                }
            }
            Some("!togglefish") if self.controller.target().is_some() => {
                match self.controller.toggle(None) {
                    ToggleOutcome::Stopped => "⚠️ Stopped fishing session.".to_string(),
                    ToggleOutcome::Started => self.started_line(),
                    ToggleOutcome::NotReady => return,
                }
            }
            _ => return,
        };

        if let Err(e) = self.transport.send_text(&msg.channel_id, &reply).await {
            warn!("Failed to reply to owner command: {e}");
        }
    }

    async fn start_in_mention(&self, mention: &str) -> String {
        let channel_id = mention.trim_start_matches("<#").trim_end_matches('>');
        match self.transport.resolve_channel(channel_id).await {
            Ok(target) => {
                self.controller.start(Some(target));
                format!("✅ Started fishing in <#{channel_id}>")
            }
            Err(TransportError::TargetNotFound { .. }) => {
                "❌ Cannot find the specified channel.".to_string()
            }
            Err(e) => {
                warn!("Error setting up fishing session: {e}");
                "❌ An error occurred while setting up the fishing session.".to_string()
            }
        }
    }

    fn started_line(&self) -> String {
        let name = self
            .controller
            .target()
            .map(|t| t.name)
            .unwrap_or_default();
        format!("✅ Started fishing in {name}")
    }

    fn handle_command(&self, cmd: ControlCommand) -> Flow {
        debug!(?cmd, "Received control command");
        match cmd {
            ControlCommand::ToggleFishing => match self.controller.toggle(None) {
                ToggleOutcome::Stopped => self.sink.on_log("⚠️ Fishing stopped via UI button"),
                ToggleOutcome::Started => self
                    .sink
                    .on_log(&format!("{} via UI button", self.started_line())),
                ToggleOutcome::NotReady => self
                    .sink
                    .on_log("❌ Cannot start fishing: No channel available"),
            },
            ControlCommand::StartFishing => {
                if self.controller.start(None) == StartOutcome::Started {
                    self.sink
                        .on_log(&format!("{} automatically", self.started_line()));
                }
            }
            ControlCommand::StopFishing => {
                if self.controller.stop() {
                    self.sink.on_log("⚠️ Fishing stopped automatically");
                }
            }
            ControlCommand::Shutdown => {
                info!("Received shutdown command");
                return Flow::Shutdown;
            }
            ControlCommand::Unknown => debug!("Ignoring unknown control command"),
        }
        Flow::Continue
    }
}

/// Resolves on SIGINT or (unix) SIGTERM.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
