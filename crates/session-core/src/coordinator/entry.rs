//! Per-call bookkeeping held in the coordinator's call table.

use std::sync::Arc;

use switchboard_media_core::{DtmfReceiver, MediaRelay, QualitySummary};
use switchboard_sip_core::sdp::SessionDescription;
use tokio::net::UdpSocket;

use super::timers::TimerGuard;
use crate::call::Call;
use crate::collaborator::Collaborator;
use crate::dialog::{UacDialog, UasDialog};
use crate::routing::Destination;

/// Outbound leg toward a bridged extension
pub(crate) struct BLeg {
    pub dialog: UacDialog,
    /// Relay socket reserved for this leg until the relay takes it
    pub socket: Option<UdpSocket>,
    pub answered: bool,
    pub invite_timer: Option<TimerGuard>,
}

impl BLeg {
    pub fn new(dialog: UacDialog, socket: UdpSocket, invite_timer: TimerGuard) -> Self {
        Self {
            dialog,
            socket: Some(socket),
            answered: false,
            invite_timer: Some(invite_timer),
        }
    }
}

/// A transfer waiting for its new leg to answer
pub(crate) struct PendingTransfer {
    pub target: String,
    pub destination: Destination,
    pub leg: BLeg,
    pub owner: Arc<dyn Collaborator>,
}

pub(crate) struct CallEntry {
    pub call: Call,
    pub uas: UasDialog,
    pub offer: Option<SessionDescription>,
    /// Answer codec list for the caller, in the caller's order
    pub codecs: Vec<u8>,
    pub dtmf_payload_type: u8,
    pub local_answer: Option<SessionDescription>,
    /// Leg A relay socket, reserved at setup and handed to the relay on answer
    pub leg_a_socket: Option<UdpSocket>,
    pub relay: Option<MediaRelay>,
    pub b_leg: Option<BLeg>,
    /// Collaborator that currently owns the call
    pub owner: Option<Arc<dyn Collaborator>>,
    pub receiver: DtmfReceiver,
    /// Collaborator redirects followed so far
    pub hops: u8,
    pub retransmit: Option<TimerGuard>,
    pub no_answer: Option<TimerGuard>,
    pub pending_transfer: Option<PendingTransfer>,
    /// Summaries of legs already replaced by transfers
    pub quality: Vec<QualitySummary>,
}

impl CallEntry {
    pub fn new(
        call: Call,
        uas: UasDialog,
        offer: Option<SessionDescription>,
        codecs: Vec<u8>,
        dtmf_payload_type: u8,
        leg_a_socket: UdpSocket,
        receiver: DtmfReceiver,
    ) -> Self {
        Self {
            call,
            uas,
            offer,
            codecs,
            dtmf_payload_type,
            local_answer: None,
            leg_a_socket: Some(leg_a_socket),
            relay: None,
            b_leg: None,
            owner: None,
            receiver,
            hops: 0,
            retransmit: None,
            no_answer: None,
            pending_transfer: None,
            quality: Vec::new(),
        }
    }

    /// First negotiated audio codec, skipping telephone-event
    pub fn audio_payload_type(&self) -> u8 {
        self.codecs
            .iter()
            .copied()
            .find(|pt| *pt != self.dtmf_payload_type)
            .unwrap_or(0)
    }

    /// Call-ID of the outbound leg, pending transfer legs included
    pub fn leg_call_ids(&self) -> Vec<String> {
        self.b_leg
            .iter()
            .map(|leg| leg.dialog.call_id.clone())
            .chain(self.pending_transfer.iter().map(|p| p.leg.dialog.call_id.clone()))
            .collect()
    }
}
