//! End-to-end tests for the automation runtime.
//!
//! Each test runs `FishingBot::run` against a scripted transport, feeds it
//! control commands and inbound messages, and checks what the bot sends and
//! which events it emits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use autofish::bot::{ExitReason, FishingBot};
use autofish::config::{ChannelType, FishingConfig};
use autofish::error::TransportError;
use autofish::events::{ChannelSink, ControlCommand, ProcessEvent, Status};
use autofish::transport::{ChatTransport, Embed, IncomingMessage, Session, Target, UserInfo};

const BOT_ID: &str = "574652751745777665";
const PERIOD: Duration = Duration::from_millis(3000);

/// Transport whose inbound messages come from a test-held channel.
struct ScriptedTransport {
    inbound: Mutex<Option<mpsc::UnboundedReceiver<IncomingMessage>>>,
    sent: Mutex<Vec<(String, String, Vec<String>)>>,
}

impl ScriptedTransport {
    fn new() -> (Arc<Self>, mpsc::UnboundedSender<IncomingMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            inbound: Mutex::new(Some(rx)),
            sent: Mutex::new(Vec::new()),
        });
        (transport, tx)
    }

    fn count(&self, command: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c, _)| c == command)
            .count()
    }

    fn args_of(&self, command: &str) -> Vec<Vec<String>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c, _)| c == command)
            .map(|(_, _, args)| args.clone())
            .collect()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(&self) -> Result<Session, TransportError> {
        let rx = self
            .inbound
            .lock()
            .unwrap()
            .take()
            .expect("connect called twice");
        Ok(Session {
            user: UserInfo {
                id: "owner".into(),
                tag: "tester#0001".into(),
            },
            messages: Box::pin(UnboundedReceiverStream::new(rx)),
        })
    }

    async fn resolve_channel(&self, channel_id: &str) -> Result<Target, TransportError> {
        if channel_id == "404" {
            return Err(TransportError::TargetNotFound {
                kind: "channel".into(),
                id: channel_id.into(),
            });
        }
        Ok(Target::new(channel_id, "general", ChannelType::Server))
    }

    async fn open_dm(&self, user_id: &str) -> Result<Target, TransportError> {
        Ok(Target::new(user_id, "Virtual Fisher", ChannelType::Dm))
    }

    async fn send_slash(
        &self,
        target: &Target,
        _bot_id: &str,
        command: &str,
        args: &[String],
    ) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((target.id.clone(), command.to_string(), args.to_vec()));
        Ok(())
    }

    async fn send_text(&self, _channel_id: &str, _text: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

fn config(pairs: &[(&str, &str)]) -> FishingConfig {
    let mut map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    map.entry("DISCORD_TOKEN".into()).or_insert_with(|| "tok".into());
    FishingConfig::from_lookup(move |key| map.get(key).cloned()).unwrap()
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ProcessEvent>) -> Vec<ProcessEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn logs(events: &[ProcessEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ProcessEvent::Log { content } => Some(content.clone()),
            _ => None,
        })
        .collect()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn control_commands_drive_the_cycle() {
    let (transport, _inbound) = ScriptedTransport::new();
    let (sink, mut events) = ChannelSink::new();
    let bot = FishingBot::new(
        config(&[("DISCORD_BOT_CHANNEL", "123")]),
        transport.clone(),
        Arc::new(sink),
    );
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    let driver = async {
        settle().await;
        let startup = drain(&mut events);
        assert_eq!(startup[0], ProcessEvent::Ready);
        assert_eq!(
            startup[1],
            ProcessEvent::Status {
                status: Status::Running
            }
        );
        assert_eq!(
            logs(&startup),
            vec![
                "Logged in as tester#0001".to_string(),
                "Found target server channel: general".to_string(),
            ]
        );
        assert_eq!(transport.count("fish"), 0);

        control_tx.send(ControlCommand::StartFishing).unwrap();
        settle().await;
        assert_eq!(transport.count("fish"), 1);
        tokio::time::sleep(PERIOD).await;
        assert_eq!(transport.count("fish"), 2);

        control_tx.send(ControlCommand::ToggleFishing).unwrap();
        settle().await;
        tokio::time::sleep(PERIOD * 3).await;
        assert_eq!(transport.count("fish"), 2);

        let events = drain(&mut events);
        assert!(logs(&events).contains(&"✅ Started fishing in general automatically".to_string()));
        assert!(logs(&events).contains(&"⚠️ Fishing stopped via UI button".to_string()));
        assert!(events.contains(&ProcessEvent::Status {
            status: Status::NotFishing
        }));

        control_tx.send(ControlCommand::Shutdown).unwrap();
    };

    let (reason, ()) = tokio::join!(bot.run(UnboundedReceiverStream::new(control_rx)), driver);
    assert_eq!(reason.unwrap(), ExitReason::Command);
    assert!(!bot.controller().is_active());
}

#[tokio::test(start_paused = true)]
async fn verification_code_is_answered() {
    let (transport, inbound) = ScriptedTransport::new();
    let (sink, mut events) = ChannelSink::new();
    let bot = FishingBot::new(
        config(&[
            ("DISCORD_BOT_CHANNEL", "123"),
            ("AUTO_START_FISHING", "true"),
        ]),
        transport.clone(),
        Arc::new(sink),
    );
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    let driver = async {
        settle().await;
        assert!(bot.controller().is_active());
        drain(&mut events);

        // Someone else quoting a code is ignored.
        inbound
            .send(IncomingMessage::new("stranger", "code: NOPE1"))
            .unwrap();
        inbound
            .send(
                IncomingMessage::new(BOT_ID, "")
                    .with_id("m-1")
                    .with_embed(Embed::titled("Anti-bot").with_description("Your code: ABC123")),
            )
            .unwrap();
        settle().await;
        assert_eq!(transport.count("verify"), 0);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(transport.args_of("verify"), vec![vec!["ABC123".to_string()]]);

        let events = drain(&mut events);
        assert!(events.iter().any(|e| matches!(
            e,
            ProcessEvent::Embed { message_id, source, .. }
                if message_id == "m-1" && source == "fishing-bot"
        )));
        assert!(logs(&events).contains(&"🔑 Sent verification code ABC123".to_string()));

        control_tx.send(ControlCommand::Shutdown).unwrap();
    };

    let (reason, ()) = tokio::join!(bot.run(UnboundedReceiverStream::new(control_rx)), driver);
    assert_eq!(reason.unwrap(), ExitReason::Command);
}

#[tokio::test(start_paused = true)]
async fn unresolvable_channel_keeps_cycle_idle() {
    let (transport, inbound) = ScriptedTransport::new();
    let (sink, mut events) = ChannelSink::new();
    let bot = FishingBot::new(
        config(&[
            ("DISCORD_BOT_CHANNEL", "404"),
            ("AUTO_START_FISHING", "true"),
        ]),
        transport.clone(),
        Arc::new(sink),
    );
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    let driver = async {
        settle().await;
        control_tx.send(ControlCommand::ToggleFishing).unwrap();
        settle().await;
        // Closing the control channel leaves the bot running.
        drop(control_tx);
        tokio::time::sleep(PERIOD * 2).await;

        let logs = logs(&drain(&mut events));
        assert!(logs.contains(&"❌ Could not find channel with ID: 404".to_string()));
        assert!(logs.contains(&"❌ Cannot start fishing: No channel available".to_string()));
        assert_eq!(transport.count("fish"), 0);

        // The transport hanging up ends the run.
        drop(inbound);
    };

    let (reason, ()) = tokio::join!(bot.run(UnboundedReceiverStream::new(control_rx)), driver);
    assert_eq!(reason.unwrap(), ExitReason::TransportClosed);
    assert!(!bot.controller().is_active());
}

#[tokio::test(start_paused = true)]
async fn dm_mode_targets_the_counterpart() {
    let (transport, _inbound) = ScriptedTransport::new();
    let (sink, mut events) = ChannelSink::new();
    let bot = FishingBot::new(
        config(&[("CHANNEL_TYPE", "dm"), ("AUTO_START_FISHING", "true")]),
        transport.clone(),
        Arc::new(sink),
    );
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    let driver = async {
        settle().await;
        let target = bot.controller().target().unwrap();
        assert_eq!(target.id, BOT_ID);
        assert_eq!(target.kind, ChannelType::Dm);
        assert!(logs(&drain(&mut events))
            .contains(&"Created DM channel with user: Virtual Fisher".to_string()));
        assert_eq!(transport.count("fish"), 1);
        control_tx.send(ControlCommand::Shutdown).unwrap();
    };

    let (reason, ()) = tokio::join!(bot.run(UnboundedReceiverStream::new(control_rx)), driver);
    assert_eq!(reason.unwrap(), ExitReason::Command);
}
