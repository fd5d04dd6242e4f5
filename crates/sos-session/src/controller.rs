//! Session controller: binds the crypto core to the transport
//!
//! Outbound text is sealed under the key for the current PIN and
//! submitted to the transport mailbox. Inbound ciphertext is tried
//! against the current bucket's key, then the previous and next buckets
//! (clock skew, bucket boundary crossed in flight); the winning key is
//! cached and tried first on the next message. Messages that fail under
//! every candidate are dropped with a `KeyMismatch` notice.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sos_crypto::pin::{self, ROTATION_PERIOD_SECS};
use sos_crypto::{kdf, secretbox, RoomCredentials, RoomKey, RoomMode};
use sos_proto::WireMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::unix_now;
use crate::error::Result;
use crate::events::{SessionEvent, TransportEvent};
use crate::transport::{TransportHandle, TransportSender};

/// Derived keys per anchor, so each 15-second bucket pays the Argon2
/// cost once
struct KeyCache {
    keys: HashMap<u64, RoomKey>,
    /// Anchor that last decrypted successfully; tried first
    active_anchor: Option<u64>,
}

impl KeyCache {
    fn new() -> Self {
        Self {
            keys: HashMap::new(),
            active_anchor: None,
        }
    }

    fn key_for(&mut self, creds: &RoomCredentials, anchor: u64) -> Result<RoomKey> {
        if let Some(key) = self.keys.get(&anchor) {
            return Ok(key.clone());
        }
        let pin = pin_for_anchor(creds, anchor);
        let key = kdf::derive_key(creds.emojis(), &pin, anchor)?;
        self.keys.insert(anchor, key.clone());
        Ok(key)
    }

    /// Keep only anchors near the current one; old bucket keys are dead
    /// weight and key material should not linger
    fn prune(&mut self, current_anchor: u64) {
        let horizon = 2 * ROTATION_PERIOD_SECS;
        self.keys
            .retain(|anchor, _| anchor.abs_diff(current_anchor) <= horizon);
    }
}

/// PIN feeding the key for a given anchor
fn pin_for_anchor(creds: &RoomCredentials, anchor: u64) -> String {
    match creds.mode() {
        RoomMode::Fixed => creds
            .fixed_pin()
            .map(str::to_string)
            .unwrap_or_else(pin::generate_pin),
        RoomMode::Rotating => pin::rotating_pin(creds.emojis(), anchor / ROTATION_PERIOD_SECS),
    }
}

/// The crypto engine of a session: credentials plus the key cache.
/// Single-owner; it lives inside the controller task.
struct SessionCrypto {
    creds: RoomCredentials,
    cache: KeyCache,
}

impl SessionCrypto {
    fn new(creds: RoomCredentials) -> Self {
        Self {
            creds,
            cache: KeyCache::new(),
        }
    }

    /// Seal text under the key in force at `now`, base64 for the wire
    fn encrypt(&mut self, text: &str, now: f64) -> Result<String> {
        let anchor = kdf::anchor_at(&self.creds, now);
        let key = self.cache.key_for(&self.creds, anchor)?;
        self.cache.prune(anchor);
        let blob = secretbox::seal(text.as_bytes(), &key)?;
        Ok(BASE64.encode(blob))
    }

    /// Candidate anchors for an inbound message received at `now`:
    /// the cached winner first, then current, previous, next bucket.
    fn candidate_anchors(&self, now: f64) -> Vec<u64> {
        match self.creds.mode() {
            RoomMode::Fixed => vec![self.creds.created_at() as u64],
            RoomMode::Rotating => {
                let current = kdf::anchor_at(&self.creds, now);
                let mut anchors = Vec::with_capacity(4);
                if let Some(active) = self.cache.active_anchor {
                    anchors.push(active);
                }
                for anchor in [
                    current,
                    current.saturating_sub(ROTATION_PERIOD_SECS),
                    current + ROTATION_PERIOD_SECS,
                ] {
                    if !anchors.contains(&anchor) {
                        anchors.push(anchor);
                    }
                }
                anchors
            }
        }
    }

    /// Decode and decrypt an inbound payload, updating the cached
    /// winning anchor. `None` means no candidate key verified.
    fn decrypt(&mut self, content_b64: &str, now: f64) -> Option<String> {
        let blob = BASE64.decode(content_b64).ok()?;

        for anchor in self.candidate_anchors(now) {
            let key = match self.cache.key_for(&self.creds, anchor) {
                Ok(key) => key,
                Err(e) => {
                    warn!("key derivation failed for anchor {anchor}: {e}");
                    continue;
                }
            };
            if let Ok(plaintext) = secretbox::open(&blob, &key) {
                self.cache.active_anchor = Some(anchor);
                return String::from_utf8(plaintext).ok();
            }
        }
        None
    }
}

/// Commands the controller task drains from the UI
#[derive(Debug)]
enum ControllerCommand {
    SendText(String),
}

/// Handle to a running session: outbound text plus teardown
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<ControllerCommand>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    transport: TransportHandle,
}

impl SessionHandle {
    /// Encrypt and submit a text message. Returns `false` when the
    /// session has already shut down.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.commands
            .send(ControllerCommand::SendText(text.into()))
            .is_ok()
    }

    /// Tear the session down: stop the controller, cancel the poll task,
    /// best-effort leave. Never raises.
    pub async fn leave(self) {
        self.cancel.cancel();
        if self.task.await.is_err() {
            debug!("controller task ended abnormally during leave");
        }
        self.transport.leave().await;
    }
}

/// Spawns and owns the controller task
pub struct SessionController;

impl SessionController {
    /// Start a session over an already-established transport.
    ///
    /// `nickname` rides along as the display hint on outbound sends.
    /// Returns the UI handle and the decrypted event stream.
    pub fn spawn(
        creds: RoomCredentials,
        nickname: impl Into<String>,
        transport: TransportHandle,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run(
            SessionCrypto::new(creds),
            nickname.into(),
            transport.sender(),
            command_rx,
            transport_events,
            events,
            cancel.clone(),
        ));

        (
            SessionHandle {
                commands,
                cancel,
                task,
                transport,
            },
            event_rx,
        )
    }
}

/// Controller event loop: one owner for the key cache, fed by the UI
/// command mailbox on one side and transport events on the other
async fn run(
    mut crypto: SessionCrypto,
    nickname: String,
    sender: TransportSender,
    mut commands: mpsc::UnboundedReceiver<ControllerCommand>,
    mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            command = commands.recv() => {
                let Some(command) = command else { break };
                match command {
                    ControllerCommand::SendText(text) => {
                        match crypto.encrypt(&text, unix_now()) {
                            Ok(payload) => {
                                sender.send(payload, nickname.clone());
                            }
                            Err(e) => warn!("failed to encrypt outbound message: {e}"),
                        }
                    }
                }
            }
            event = transport_events.recv() => {
                let Some(event) = event else { break };
                let forwarded = translate(&mut crypto, event);
                if let Some(session_event) = forwarded {
                    if events.send(session_event).is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// Map a transport event to its session event, decrypting payloads
fn translate(crypto: &mut SessionCrypto, event: TransportEvent) -> Option<SessionEvent> {
    match event {
        TransportEvent::Message(msg) => Some(decrypt_message(crypto, msg)),
        TransportEvent::StateChange(state) => Some(SessionEvent::StateChange(state)),
        TransportEvent::MembersUpdate(members) => Some(SessionEvent::MembersUpdate(members)),
        TransportEvent::RoomExpire => Some(SessionEvent::RoomExpire),
    }
}

fn decrypt_message(crypto: &mut SessionCrypto, msg: WireMessage) -> SessionEvent {
    match crypto.decrypt(&msg.content, unix_now()) {
        Some(text) => SessionEvent::Message {
            sender: msg.sender,
            text,
            timestamp: msg.timestamp,
        },
        None => {
            debug!(id = %msg.id, "dropping undecryptable message");
            SessionEvent::KeyMismatch
        }
    }
}
