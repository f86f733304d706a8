//! # Session Coordinator
//!
//! The coordinator owns the active-call table and drives every call from
//! INVITE to teardown. It runs as one event loop fed by three channels:
//!
//! - SIP messages from the [`SipTransport`] receive task
//! - [`MediaEvent`]s from the per-call relays (digits, quality snapshots)
//! - internal events posted by timers, collaborator tasks and the public API
//!
//! Only the loop mutates call entries. Collaborators run on their own tasks
//! and hand their decisions back through the internal channel, so a slow
//! collaborator never stalls signaling for other calls.
//!
//! ```rust,no_run
//! use switchboard_infra_common::config::SwitchboardConfig;
//! use switchboard_session_core::{CollaboratorRegistry, SessionCoordinator};
//!
//! # async fn demo() -> switchboard_session_core::Result<()> {
//! let coordinator = SessionCoordinator::new(SwitchboardConfig::default(), CollaboratorRegistry::new()).await?;
//! let handle = coordinator.start();
//! let mut events = coordinator.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! coordinator.shutdown().await;
//! handle.await.ok();
//! # Ok(())
//! # }
//! ```

mod entry;
mod events;
mod inbound;
mod media;
mod outbound;
mod timers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use switchboard_infra_common::config::SwitchboardConfig;
use switchboard_media_core::quality::QualityAggregate;
use switchboard_media_core::{
    MediaEvent, PortAllocator, QualityHistory, QualityThresholds, RelayConfig,
};
use switchboard_sip_core::types::Message;
use switchboard_sip_core::{CodecNegotiator, DeviceProfile};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::call::{CallEvent, CallState};
use crate::collaborator::CollaboratorRegistry;
use crate::dialog::{LocalEndpoint, UacDialog};
use crate::error::{Result, SessionError};
use crate::routing::DialPlan;
use crate::transport::{SipTransport, TransportEvent};

use entry::CallEntry;
pub use events::{CallRecord, CoordinatorEvent};
use events::Internal;
pub use timers::{T1, T2, TIMER_B};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
/// Collaborator redirects followed before a call is failed
const MAX_REDIRECTS: u8 = 4;

struct Receivers {
    transport: mpsc::Receiver<TransportEvent>,
    internal: mpsc::UnboundedReceiver<Internal>,
    media: mpsc::UnboundedReceiver<MediaEvent>,
}

/// Who asked for a call to end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Party {
    Caller,
    Callee,
    Local,
}

/// Owns the call table and runs the signaling loop
pub struct SessionCoordinator {
    config: SwitchboardConfig,
    transport: SipTransport,
    endpoint: LocalEndpoint,
    negotiator: CodecNegotiator,
    dial_plan: DialPlan,
    collaborators: CollaboratorRegistry,
    ports: PortAllocator,
    relay_config: RelayConfig,
    thresholds: QualityThresholds,
    calls: DashMap<String, CallEntry>,
    /// Outbound leg Call-ID to the call it belongs to
    legs: DashMap<String, String>,
    /// Outbound legs cancelled before a final response arrived
    abandoned: DashMap<String, (UacDialog, tokio::time::Instant)>,
    history: Mutex<QualityHistory>,
    events_tx: broadcast::Sender<CoordinatorEvent>,
    records_tx: broadcast::Sender<CallRecord>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    media_tx: mpsc::UnboundedSender<MediaEvent>,
    receivers: Mutex<Option<Receivers>>,
}

impl SessionCoordinator {
    /// Bind the signaling socket and build the coordinator
    pub async fn new(config: SwitchboardConfig, collaborators: CollaboratorRegistry) -> Result<Arc<Self>> {
        let (transport, transport_rx) = SipTransport::bind(config.signaling.bind_addr, None).await?;
        let local = transport.local_addr();
        let endpoint = LocalEndpoint::new(advertise(local, &config), config.signaling.user_agent.clone());

        let profiles = config
            .devices
            .iter()
            .map(|d| DeviceProfile::new(d.user_agent_contains.clone(), d.allowed_codecs.clone()))
            .collect();
        let negotiator = CodecNegotiator::new(config.media.dtmf_payload_type).with_profiles(profiles);
        let ports = PortAllocator::new(config.media.bind_ip, config.media.rtp_port_start, config.media.rtp_port_end);
        let relay_config = RelayConfig::from_sections(&config.media, &config.quality);
        let thresholds = QualityThresholds::from(&config.quality);
        let history = QualityHistory::new(config.quality.history_capacity, config.quality.alert_capacity);

        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (records_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (media_tx, media_rx) = mpsc::unbounded_channel();

        info!(
            signaling = %local,
            collaborators = collaborators.len(),
            "session coordinator created"
        );

        Ok(Arc::new(Self {
            dial_plan: DialPlan::new(config.dialplan.clone()),
            config,
            transport,
            endpoint,
            negotiator,
            collaborators,
            ports,
            relay_config,
            thresholds,
            calls: DashMap::new(),
            legs: DashMap::new(),
            abandoned: DashMap::new(),
            history: Mutex::new(history),
            events_tx,
            records_tx,
            internal_tx,
            media_tx,
            receivers: Mutex::new(Some(Receivers {
                transport: transport_rx,
                internal: internal_rx,
                media: media_rx,
            })),
        }))
    }

    /// Spawn [`run`](Self::run) on the current runtime
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.run().await {
                error!(error = %e, "session coordinator stopped");
            }
        })
    }

    /// Run the signaling loop until shutdown or transport closure
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let Some(mut rx) = self.receivers.lock().take() else {
            return Err(SessionError::transport("coordinator is already running"));
        };
        info!(signaling = %self.transport.local_addr(), "session coordinator running");

        loop {
            tokio::select! {
                event = rx.transport.recv() => match event {
                    Some(TransportEvent::MessageReceived { message, source }) => {
                        if let Err(e) = self.handle_message(message, source).await {
                            warn!(%source, error = %e, "failed to handle SIP message");
                        }
                    }
                    Some(TransportEvent::Closed) | None => {
                        info!("signaling transport closed");
                        break;
                    }
                },
                Some(event) = rx.media.recv() => self.handle_media_event(event).await,
                Some(internal) = rx.internal.recv() => {
                    if let Internal::Shutdown { done } = internal {
                        self.shutdown_calls().await;
                        self.transport.close();
                        let _ = done.send(());
                        break;
                    }
                    self.handle_internal(internal).await;
                }
            }
        }
        info!("session coordinator stopped");
        Ok(())
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn config(&self) -> &SwitchboardConfig {
        &self.config
    }

    /// Live call events
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events_tx.subscribe()
    }

    /// One record per finished call
    pub fn subscribe_records(&self) -> broadcast::Receiver<CallRecord> {
        self.records_tx.subscribe()
    }

    pub fn call_state(&self, call_id: &str) -> Option<CallState> {
        self.calls.get(call_id).map(|entry| entry.call.state())
    }

    pub fn active_calls(&self) -> Vec<String> {
        self.calls.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn quality_aggregate(&self) -> QualityAggregate {
        self.history.lock().aggregate()
    }

    /// Run `f` against the quality history
    pub fn with_history<R>(&self, f: impl FnOnce(&QualityHistory) -> R) -> R {
        f(&self.history.lock())
    }

    /// Blind-transfer an active call to `target`, a dialed number
    pub fn transfer(&self, call_id: &str, target: impl Into<String>) -> Result<()> {
        let state = self
            .call_state(call_id)
            .ok_or_else(|| SessionError::call_not_found(call_id))?;
        if state != CallState::Active {
            return Err(SessionError::InvalidTransition {
                from: state,
                event: CallEvent::TransferStart,
            });
        }
        self.post(Internal::Transfer {
            call_id: call_id.to_string(),
            target: target.into(),
        })
    }

    /// End a call from the switchboard side
    pub fn hangup(&self, call_id: &str) -> Result<()> {
        if !self.calls.contains_key(call_id) {
            return Err(SessionError::call_not_found(call_id));
        }
        self.post(Internal::Hangup {
            call_id: call_id.to_string(),
        })
    }

    /// End every call, stop the relays and close the transport
    pub async fn shutdown(&self) {
        let (done, wait) = oneshot::channel();
        if self.internal_tx.send(Internal::Shutdown { done }).is_err() || wait.await.is_err() {
            // loop not running
            self.shutdown_calls().await;
            self.transport.close();
        }
    }

    fn post(&self, event: Internal) -> Result<()> {
        self.internal_tx
            .send(event)
            .map_err(|_| SessionError::transport("coordinator loop stopped"))
    }

    async fn handle_message(&self, message: Message, source: SocketAddr) -> Result<()> {
        match message {
            Message::Request(request) => self.handle_request(request, source).await,
            Message::Response(response) => self.handle_response(response, source).await,
        }
    }

    async fn handle_internal(&self, event: Internal) {
        match event {
            Internal::Decision {
                call_id,
                hops,
                collaborator,
                result,
            } => self.on_decision(&call_id, hops, collaborator, result).await,
            Internal::TransferDecision {
                call_id,
                target,
                destination,
                hops,
                collaborator,
                result,
            } => {
                self.on_transfer_decision(&call_id, &target, destination, hops, collaborator, result)
                    .await
            }
            Internal::Transfer { call_id, target } => self.start_transfer(&call_id, &target).await,
            Internal::Hangup { call_id } => self.local_hangup(&call_id).await,
            Internal::AckTimeout { call_id } => self.on_ack_timeout(&call_id).await,
            Internal::NoAnswer { call_id } => self.on_no_answer(&call_id).await,
            Internal::InviteTimeout { call_id, leg_call_id } => {
                self.on_invite_timeout(&call_id, &leg_call_id).await
            }
            Internal::Shutdown { done } => {
                let _ = done.send(());
            }
        }
    }

    /// Run `f` on a call entry without holding the table lock across an await
    fn with_call<R>(&self, call_id: &str, f: impl FnOnce(&mut CallEntry) -> R) -> Option<R> {
        self.calls.get_mut(call_id).map(|mut entry| f(&mut entry))
    }

    /// Apply `event` to a call, publishing the new state
    fn transition(&self, entry: &mut CallEntry, event: CallEvent) -> Option<CallState> {
        match entry.call.apply(event, tokio::time::Instant::now()) {
            Ok(state) => {
                self.emit(CoordinatorEvent::StateChanged {
                    call_id: entry.call.call_id.clone(),
                    state,
                });
                Some(state)
            }
            Err(e) => {
                debug!(call_id = %entry.call.call_id, error = %e, "ignored call event");
                None
            }
        }
    }

    fn emit(&self, event: CoordinatorEvent) {
        // no subscribers is fine
        let _ = self.events_tx.send(event);
    }

    /// Send without failing the caller; transport errors are already logged
    async fn send(&self, message: impl Into<Message>, destination: SocketAddr) {
        if let Err(e) = self.transport.send(message, destination).await {
            debug!(%destination, error = %e, "send failed");
        }
    }

    /// Address to put in SDP and Contact for a locally bound socket
    fn advertised(&self, addr: SocketAddr) -> SocketAddr {
        advertise(addr, &self.config)
    }

    fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.config.calls.ack_timeout_secs)
    }

    fn no_answer_timeout(&self) -> Duration {
        Duration::from_secs(self.config.calls.no_answer_timeout_secs)
    }

    fn early_disconnect_window(&self) -> Duration {
        Duration::from_millis(self.config.calls.early_disconnect_window_ms)
    }

    fn coincidence_window(&self) -> Duration {
        Duration::from_millis(self.config.calls.tone_coincidence_window_ms)
    }
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("signaling", &self.transport.local_addr())
            .field("calls", &self.calls.len())
            .field("collaborators", &self.collaborators)
            .finish()
    }
}

fn advertise(addr: SocketAddr, config: &SwitchboardConfig) -> SocketAddr {
    match config.media.advertised_ip {
        Some(ip) => SocketAddr::new(ip, addr.port()),
        None if addr.ip().is_unspecified() => {
            let ip = if config.signaling.bind_addr.ip().is_unspecified() {
                std::net::IpAddr::from([127, 0, 0, 1])
            } else {
                config.signaling.bind_addr.ip()
            };
            SocketAddr::new(ip, addr.port())
        }
        None => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertised_address_prefers_configured_ip() {
        let mut config = SwitchboardConfig::default();
        let bound: SocketAddr = "0.0.0.0:10002".parse().unwrap();
        assert_eq!(advertise(bound, &config), "127.0.0.1:10002".parse::<SocketAddr>().unwrap());

        config.media.advertised_ip = Some("203.0.113.7".parse().unwrap());
        assert_eq!(advertise(bound, &config), "203.0.113.7:10002".parse::<SocketAddr>().unwrap());

        config.media.advertised_ip = None;
        let specific: SocketAddr = "10.0.0.1:10004".parse().unwrap();
        assert_eq!(advertise(specific, &config), specific);
    }
}
