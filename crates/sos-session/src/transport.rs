//! Relay transport: HTTP over an optional SOCKS5 tunnel
//!
//! Bring-up probes the local DNS-tunnel SOCKS5 proxy and falls through
//! to direct HTTP when it is not listening. After setup the transport
//! moves into a single owning poll task; UI sends arrive on a command
//! mailbox drained exclusively by that task, so the send queue has one
//! owner and no locks. Link loss flips the state to `Reconnecting`,
//! preserves all session state, and retries with exponential backoff.

use std::collections::VecDeque;

use sos_proto::{
    CreateRoomRequest, ErrorBody, JoinRequest, JoinResponse, LeaveRequest, PollResponse,
    RoomCreated, RoomInfo, RoomMode, SendRequest,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{
    unix_now, TransportConfig, BACKOFF_INITIAL, BACKOFF_MAX, BACKOFF_MULTIPLIER, CONNECT_TIMEOUT,
    HEALTH_PROBE_TIMEOUT, LEAVE_TIMEOUT, POLL_INTERVAL, QUEUE_MAX_AGE_SECS, REQUEST_TIMEOUT,
};
use crate::error::{Result, SessionError};
use crate::events::{ConnectionState, TransportEvent};

/// A send captured while the link was down
#[derive(Debug, Clone)]
struct QueuedSend {
    content: String,
    sender: String,
    queued_at: f64,
}

/// Commands the poll task drains from its mailbox
#[derive(Debug)]
enum Command {
    Send { content: String, sender: String },
}

/// Clone-able submitter for outbound messages; the poll task does the
/// actual HTTP work
#[derive(Debug, Clone)]
pub struct TransportSender {
    commands: mpsc::UnboundedSender<Command>,
}

impl TransportSender {
    /// Enqueue an already-encrypted payload for delivery. Returns `false`
    /// if the poll task has already exited.
    pub fn send(&self, content: String, sender: String) -> bool {
        self.commands.send(Command::Send { content, sender }).is_ok()
    }
}

/// Handle to a spawned transport: command submission plus cooperative
/// shutdown
pub struct TransportHandle {
    sender: TransportSender,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TransportHandle {
    /// Submitter handle for the controller
    pub fn sender(&self) -> TransportSender {
        self.sender.clone()
    }

    /// Cancel the poll task, run a best-effort leave, and wait for the
    /// task to finish. Never panics the caller.
    pub async fn leave(self) {
        self.cancel.cancel();
        if self.task.await.is_err() {
            debug!("transport task ended abnormally during leave");
        }
    }
}

/// Client-side relay transport and connection state machine
pub struct Transport {
    config: TransportConfig,
    state: ConnectionState,
    client: Option<reqwest::Client>,
    room_hash: Option<String>,
    member_id: Option<String>,
    last_message_ts: f64,
    pending: VecDeque<QueuedSend>,
    backoff: f64,
    room_gone: bool,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Transport {
    /// Build a transport and the event stream it reports into
    pub fn new(config: TransportConfig) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let transport = Self {
            config,
            state: ConnectionState::Disconnected,
            client: None,
            room_hash: None,
            member_id: None,
            last_message_ts: 0.0,
            pending: VecDeque::new(),
            backoff: BACKOFF_INITIAL,
            room_gone: false,
            events,
        };
        (transport, event_rx)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "transport state change");
            self.state = state;
            let _ = self.events.send(TransportEvent::StateChange(state));
        }
    }

    fn base_url(&self) -> String {
        self.config.base_url()
    }

    /// Build the HTTP client: SOCKS5 tunnel when the local proxy answers
    /// a health probe inside its budget, direct HTTP otherwise.
    async fn build_client(&self) -> Result<reqwest::Client> {
        if !self.config.use_direct {
            if let Ok(proxy) = reqwest::Proxy::all(self.config.socks_url()) {
                if let Ok(client) = reqwest::Client::builder()
                    .proxy(proxy)
                    .timeout(REQUEST_TIMEOUT)
                    .connect_timeout(CONNECT_TIMEOUT)
                    .build()
                {
                    let probe = client
                        .get(format!("{}/health", self.base_url()))
                        .timeout(HEALTH_PROBE_TIMEOUT)
                        .send()
                        .await;
                    match probe {
                        Ok(_) => {
                            info!(socks = %self.config.socks_addr, "relay reachable via SOCKS5 tunnel");
                            return Ok(client);
                        }
                        Err(e) => debug!("SOCKS5 probe failed, falling back to direct: {e}"),
                    }
                }
            }
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(client)
    }

    /// Initial bring-up. Failure here is terminal (`Error` state); use
    /// the poll task's reconnection path for anything after that.
    pub async fn connect(&mut self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        match self.build_client().await {
            Ok(client) => {
                self.client = Some(client);
                self.backoff = BACKOFF_INITIAL;
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Error);
                Err(e)
            }
        }
    }

    /// Re-establish the client after link loss. Leaves the state in
    /// `Reconnecting` on failure so the caller keeps backing off.
    async fn reconnect(&mut self) -> bool {
        match self.build_client().await {
            Ok(client) => {
                self.client = Some(client);
                self.set_state(ConnectionState::Connected);
                true
            }
            Err(_) => false,
        }
    }

    fn client(&self) -> Result<&reqwest::Client> {
        self.client.as_ref().ok_or(SessionError::NoRoom)
    }

    /// Create a room on the relay and adopt its member token
    pub async fn create_room(&mut self, room_hash: &str, mode: RoomMode) -> Result<RoomCreated> {
        if self.client.is_none() {
            self.connect().await?;
        }
        let url = format!("{}/room", self.base_url());
        let result = self
            .client()?
            .post(url)
            .json(&CreateRoomRequest {
                room_hash: room_hash.to_string(),
                mode,
            })
            .send()
            .await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.set_state(ConnectionState::Reconnecting);
                return Err(e.into());
            }
        };

        match response.status().as_u16() {
            200 => {
                let created: RoomCreated = response.json().await?;
                self.room_hash = Some(created.room_hash.clone());
                self.member_id = Some(created.member_id.clone());
                self.last_message_ts = 0.0;
                self.room_gone = false;
                Ok(created)
            }
            429 => {
                let body: ErrorBody = response.json().await.unwrap_or_else(|_| ErrorBody::rate_limited(10));
                Err(SessionError::RateLimited {
                    retry_after: body.retry_after.unwrap_or(10),
                })
            }
            409 => Err(SessionError::RoomExists),
            status => Err(SessionError::UnexpectedStatus(status)),
        }
    }

    /// Join an existing room. On success the response's `created_at` is
    /// the fixed-mode key anchor; callers must copy it into their
    /// credentials.
    pub async fn join_room(&mut self, room_hash: &str, nickname: &str) -> Result<JoinResponse> {
        if self.client.is_none() {
            self.connect().await?;
        }
        let url = format!("{}/room/{}/join", self.base_url(), room_hash);
        let result = self
            .client()?
            .post(url)
            .json(&JoinRequest {
                nickname: nickname.to_string(),
            })
            .send()
            .await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.set_state(ConnectionState::Reconnecting);
                return Err(e.into());
            }
        };

        match response.status().as_u16() {
            200 => {
                let joined: JoinResponse = response.json().await?;
                self.room_hash = Some(joined.room_hash.clone());
                self.member_id = Some(joined.member_id.clone());
                self.last_message_ts = joined.last_message_ts;
                self.room_gone = false;
                Ok(joined)
            }
            404 => Err(SessionError::RoomGone),
            401 => Err(SessionError::InvalidKey),
            status => Err(SessionError::UnexpectedStatus(status)),
        }
    }

    /// Read-only room projection
    pub async fn room_info(&mut self) -> Result<RoomInfo> {
        let room_hash = self.room_hash.clone().ok_or(SessionError::NoRoom)?;
        let url = format!("{}/room/{}/info", self.base_url(), room_hash);
        let response = self.client()?.get(url).send().await?;
        match response.status().as_u16() {
            200 => Ok(response.json().await?),
            404 => Err(SessionError::RoomGone),
            status => Err(SessionError::UnexpectedStatus(status)),
        }
    }

    /// Send an encrypted payload now, or queue it when the link is down.
    /// Returns `true` only when the relay acknowledged delivery.
    async fn send_message(&mut self, content: &str, sender: &str) -> bool {
        if self.room_hash.is_none() {
            return false;
        }
        if self.client.is_none() || self.state != ConnectionState::Connected {
            self.enqueue(content, sender);
            return false;
        }

        match self.post_send(content, sender).await {
            Ok(ok) => ok,
            Err(_) => {
                self.enqueue(content, sender);
                self.set_state(ConnectionState::Reconnecting);
                false
            }
        }
    }

    async fn post_send(&self, content: &str, sender: &str) -> Result<bool> {
        let room_hash = self.room_hash.as_deref().ok_or(SessionError::NoRoom)?;
        let url = format!("{}/room/{}/send", self.base_url(), room_hash);
        let response = self
            .client()?
            .post(url)
            .json(&SendRequest {
                content: content.to_string(),
                sender: sender.to_string(),
                member_id: self.member_id.clone(),
            })
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    fn enqueue(&mut self, content: &str, sender: &str) {
        self.pending.push_back(QueuedSend {
            content: content.to_string(),
            sender: sender.to_string(),
            queued_at: unix_now(),
        });
    }

    /// Poll for messages newer than the high-water mark, delivering them
    /// and roster/expiry signals onto the event stream
    async fn poll_once(&mut self) {
        let Some(room_hash) = self.room_hash.clone() else {
            return;
        };
        let Ok(client) = self.client() else { return };

        let url = format!("{}/room/{}/poll", self.base_url(), room_hash);
        let request = client
            .get(url)
            .query(&[("since", self.last_message_ts.to_string())]);
        let request = match &self.member_id {
            Some(id) => request.query(&[("member_id", id.as_str())]),
            None => request,
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("poll failed: {e}");
                self.set_state(ConnectionState::Reconnecting);
                return;
            }
        };

        match response.status().as_u16() {
            200 => {
                let poll: PollResponse = match response.json().await {
                    Ok(poll) => poll,
                    Err(e) => {
                        debug!("malformed poll body: {e}");
                        return;
                    }
                };

                for msg in &poll.messages {
                    self.last_message_ts = self.last_message_ts.max(msg.timestamp);
                }
                if !poll.members.is_empty() {
                    let _ = self.events.send(TransportEvent::MembersUpdate(poll.members));
                }
                if poll.expires_at > 0.0 && unix_now() > poll.expires_at {
                    self.room_gone = true;
                    let _ = self.events.send(TransportEvent::RoomExpire);
                }
                for msg in poll.messages {
                    let _ = self.events.send(TransportEvent::Message(msg));
                }
            }
            404 => {
                // Permanent room loss; polling ends
                info!("room gone (404 on poll)");
                self.room_gone = true;
                let _ = self.events.send(TransportEvent::RoomExpire);
            }
            status => debug!(status, "unexpected poll status"),
        }
    }

    /// Drain the send queue oldest-first, discarding stale entries.
    /// Stops (re-queuing the head) as soon as the link drops again.
    async fn drain_pending(&mut self) {
        let now = unix_now();
        while let Some(entry) = self.pending.pop_front() {
            if now - entry.queued_at >= QUEUE_MAX_AGE_SECS {
                debug!("dropping stale queued message");
                continue;
            }
            if self.state != ConnectionState::Connected {
                self.pending.push_front(entry);
                break;
            }
            match self.post_send(&entry.content, &entry.sender).await {
                Ok(_) => {}
                Err(_) => {
                    self.pending.push_front(entry);
                    self.set_state(ConnectionState::Reconnecting);
                    break;
                }
            }
        }
    }

    /// Move the transport into its owning poll task
    pub fn spawn(self) -> TransportHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cmd_rx, cancel.clone()));
        TransportHandle {
            sender: TransportSender { commands: cmd_tx },
            cancel,
            task,
        }
    }

    /// The poll loop. Cycles at the poll cadence while connected,
    /// reconnects with doubling backoff otherwise, and exits on
    /// cancellation or permanent room loss.
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            while let Ok(command) = commands.try_recv() {
                self.handle_command(command).await;
            }

            match self.state {
                ConnectionState::Connected => {
                    self.poll_once().await;
                    if self.room_gone {
                        break;
                    }
                    self.drain_pending().await;
                    if self.state == ConnectionState::Connected {
                        self.backoff = BACKOFF_INITIAL;
                    }
                }
                ConnectionState::Reconnecting => {
                    if !self.reconnect().await {
                        let delay = std::time::Duration::from_secs_f64(self.backoff);
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                        self.backoff = (self.backoff * BACKOFF_MULTIPLIER).min(BACKOFF_MAX);
                    }
                }
                _ => {}
            }

            // Sleep out the cycle, but wake early for cancellation or a
            // fresh command so user sends are not held for the cadence
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    // Every handle is gone; nobody can cancel us anymore
                    None => break,
                },
            }
        }

        self.shutdown().await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send { content, sender } => {
                self.send_message(&content, &sender).await;
            }
        }
    }

    /// Best-effort leave and teardown. Never raises.
    async fn shutdown(&mut self) {
        if let (Some(client), Some(room_hash)) = (self.client.as_ref(), self.room_hash.as_deref()) {
            let url = format!("{}/room/{}/leave", self.base_url(), room_hash);
            let result = client
                .post(url)
                .timeout(LEAVE_TIMEOUT)
                .json(&LeaveRequest {
                    member_id: self.member_id.clone(),
                })
                .send()
                .await;
            if let Err(e) = result {
                debug!("best-effort leave failed: {e}");
            }
        }

        self.room_hash = None;
        self.member_id = None;
        self.client = None;
        self.set_state(ConnectionState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> (Transport, mpsc::UnboundedReceiver<TransportEvent>) {
        Transport::new(TransportConfig::new("127.0.0.1", 1)) // nothing listens on port 1
    }

    #[tokio::test]
    async fn test_send_without_room_is_dropped() {
        let (mut t, _events) = transport();
        assert!(!t.send_message("XYZ==", "me").await);
        assert!(t.pending.is_empty());
    }

    #[tokio::test]
    async fn test_send_while_disconnected_queues() {
        let (mut t, _events) = transport();
        t.room_hash = Some("a1b2c3d4e5f6a7b8".to_string());

        assert!(!t.send_message("XYZ==", "me").await);
        assert_eq!(t.pending.len(), 1);
        assert_eq!(t.pending[0].content, "XYZ==");
    }

    #[tokio::test]
    async fn test_drain_discards_stale_entries() {
        let (mut t, _events) = transport();
        t.room_hash = Some("a1b2c3d4e5f6a7b8".to_string());
        t.pending.push_back(QueuedSend {
            content: "old".to_string(),
            sender: "me".to_string(),
            queued_at: unix_now() - QUEUE_MAX_AGE_SECS - 1.0,
        });

        // Not connected: the stale entry is dropped, nothing is sent
        t.drain_pending().await;
        assert!(t.pending.is_empty());
    }

    #[tokio::test]
    async fn test_drain_requeues_head_when_disconnected() {
        let (mut t, _events) = transport();
        t.room_hash = Some("a1b2c3d4e5f6a7b8".to_string());
        t.pending.push_back(QueuedSend {
            content: "fresh".to_string(),
            sender: "me".to_string(),
            queued_at: unix_now(),
        });

        t.drain_pending().await;
        assert_eq!(t.pending.len(), 1, "fresh entry must survive an outage");
    }

    #[tokio::test]
    async fn test_state_change_events_deduplicated() {
        let (mut t, mut events) = transport();
        t.set_state(ConnectionState::Connecting);
        t.set_state(ConnectionState::Connecting);
        t.set_state(ConnectionState::Connected);

        let mut seen = Vec::new();
        while let Ok(ev) = events.try_recv() {
            if let TransportEvent::StateChange(s) = ev {
                seen.push(s);
            }
        }
        assert_eq!(
            seen,
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
    }

    #[tokio::test]
    async fn test_direct_connect_skips_probe() {
        let mut config = TransportConfig::new("127.0.0.1", 1);
        config.use_direct = true;
        let (mut t, _events) = Transport::new(config);

        // Client construction does no I/O; the first real request is
        // what detects a dead relay.
        assert!(t.connect().await.is_ok());
        assert_eq!(t.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_session_state_survives_reconnecting() {
        let (mut t, _events) = transport();
        t.room_hash = Some("a1b2c3d4e5f6a7b8".to_string());
        t.member_id = Some("deadbeef".to_string());
        t.last_message_ts = 42.0;

        t.set_state(ConnectionState::Reconnecting);
        assert_eq!(t.room_hash.as_deref(), Some("a1b2c3d4e5f6a7b8"));
        assert_eq!(t.member_id.as_deref(), Some("deadbeef"));
        assert_eq!(t.last_message_ts, 42.0);
    }

    #[tokio::test]
    async fn test_spawned_transport_leave_completes() {
        let (t, _events) = transport();
        let handle = t.spawn();
        // Cancellation is cooperative and must not hang or panic
        tokio::time::timeout(std::time::Duration::from_secs(5), handle.leave())
            .await
            .expect("leave must complete promptly");
    }
}
