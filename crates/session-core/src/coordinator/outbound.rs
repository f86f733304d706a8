//! Collaborator decisions, outbound legs toward extensions, and transfer.

use std::net::SocketAddr;
use std::sync::Arc;

use switchboard_media_core::{LegConfig, LegSide};
use switchboard_sip_core::prelude::{HeaderAccess, Method, Response, SipUri, StatusCode};
use switchboard_sip_core::sdp::{build_answer, build_offer, parse_sdp, SessionDescription};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use super::entry::{BLeg, CallEntry, PendingTransfer};
use super::events::{CoordinatorEvent, Internal};
use super::{timers, SessionCoordinator, MAX_REDIRECTS};
use crate::call::{CallEvent, CallState, EndReason};
use crate::collaborator::{CallContext, Collaborator, CollaboratorDecision};
use crate::dialog::UacDialog;
use crate::error::{Result, SessionError};
use crate::routing::{Destination, DestinationKind};

/// What an outbound leg is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegRole {
    Bridge,
    Transfer,
}

impl SessionCoordinator {
    pub(super) async fn on_decision(
        &self,
        call_id: &str,
        hops: u8,
        collaborator: Arc<dyn Collaborator>,
        result: Result<CollaboratorDecision>,
    ) {
        let current = self.with_call(call_id, |entry| (entry.call.state(), entry.hops));
        match current {
            Some((CallState::Ringing, entry_hops)) if entry_hops == hops => {}
            _ => {
                trace!(%call_id, "stale collaborator decision");
                return;
            }
        }

        match result {
            Ok(CollaboratorDecision::Answer { media }) => {
                debug!(%call_id, collaborator = collaborator.name(), %media, "collaborator answers");
                self.with_call(call_id, |entry| entry.owner = Some(collaborator));
                let socket = match self.ports.allocate().await {
                    Ok(socket) => socket,
                    Err(e) => {
                        warn!(%call_id, error = %e, "media socket allocation failed");
                        self.fail_call(call_id, StatusCode::ServiceUnavailable, EndReason::MediaUnavailable)
                            .await;
                        return;
                    }
                };
                let leg = self.with_call(call_id, |entry| collaborator_leg(entry, socket, media));
                if let Some(leg) = leg {
                    self.answer_caller(call_id, leg).await;
                }
            }
            Ok(CollaboratorDecision::Redirect { destination }) => {
                self.redirect(call_id, destination).await;
            }
            Ok(CollaboratorDecision::Bridge { contact, uri }) => {
                debug!(%call_id, collaborator = collaborator.name(), %contact, "collaborator bridges");
                self.with_call(call_id, |entry| entry.owner = Some(collaborator));
                if let Err(e) = self.start_bridge(call_id, contact, uri).await {
                    warn!(%call_id, error = %e, "could not start outbound leg");
                    self.fail_call(call_id, StatusCode::ServiceUnavailable, EndReason::MediaUnavailable)
                        .await;
                }
            }
            Err(e) => {
                warn!(%call_id, collaborator = collaborator.name(), error = %e, "collaborator failed");
                self.fail_call(call_id, StatusCode::TemporarilyUnavailable, EndReason::CollaboratorFailed)
                    .await;
            }
        }
    }

    /// Hand the call to another destination's collaborator
    async fn redirect(&self, call_id: &str, destination: Destination) {
        let Some(hops) = self.with_call(call_id, |entry| {
            entry.hops += 1;
            entry.call.destination = destination.clone();
            entry.hops
        }) else {
            return;
        };
        if hops > MAX_REDIRECTS {
            warn!(%call_id, hops, "too many collaborator redirects");
            self.fail_call(call_id, StatusCode::TemporarilyUnavailable, EndReason::CollaboratorFailed)
                .await;
            return;
        }
        info!(%call_id, %destination, "redirecting call");
        self.consult(call_id).await;
    }

    /// Session description to offer the callee on a new outbound leg
    fn leg_offer(&self, entry: &CallEntry, local: SocketAddr) -> SessionDescription {
        let session_id = u64::from(rand::random::<u32>());
        match &entry.offer {
            Some(offer) => build_answer(offer, &entry.codecs, local, session_id),
            None => build_offer(&entry.codecs, entry.dtmf_payload_type, local, session_id),
        }
    }

    /// Reserve a socket and send the INVITE for a new outbound leg
    async fn originate(&self, call_id: &str, contact: SocketAddr, uri: Option<SipUri>) -> Result<BLeg> {
        let socket = self.ports.allocate().await?;
        let local = self.advertised(socket.local_addr()?);
        let dialog = self
            .with_call(call_id, |entry| {
                let offer = self.leg_offer(entry, local);
                let target = uri.unwrap_or_else(|| {
                    SipUri::new(
                        Some(entry.call.dialed.as_str()),
                        contact.ip().to_string(),
                        Some(contact.port()),
                    )
                });
                UacDialog::invite(&self.endpoint, &entry.uas.remote, target, contact, offer.to_string())
            })
            .ok_or_else(|| SessionError::call_not_found(call_id))?;

        let timer = timers::retransmit(
            self.transport.clone(),
            dialog.invite.clone().into(),
            contact,
            timers::TIMER_B,
            self.internal_tx.clone(),
            Internal::InviteTimeout {
                call_id: call_id.to_string(),
                leg_call_id: dialog.call_id.clone(),
            },
        );
        self.legs.insert(dialog.call_id.clone(), call_id.to_string());
        info!(%call_id, leg = %dialog.call_id, %contact, "originating outbound leg");
        self.send(dialog.invite.clone(), contact).await;
        Ok(BLeg::new(dialog, socket, timer))
    }

    async fn start_bridge(&self, call_id: &str, contact: SocketAddr, uri: Option<SipUri>) -> Result<()> {
        let leg = self.originate(call_id, contact, uri).await?;
        self.with_call(call_id, |entry| entry.b_leg = Some(leg));
        Ok(())
    }

    /// Give up on an outbound leg that has no final response yet
    pub(super) async fn abandon(&self, leg: BLeg) {
        let BLeg { dialog, answered, .. } = leg;
        self.legs.remove(&dialog.call_id);
        if answered {
            let mut dialog = dialog;
            let bye = dialog.bye(&self.endpoint);
            self.send(bye, dialog.destination).await;
            return;
        }
        let now = tokio::time::Instant::now();
        self.abandoned
            .retain(|_, (_, at)| now.saturating_duration_since(*at) < timers::TIMER_B);
        self.send(dialog.cancel(), dialog.destination).await;
        self.abandoned.insert(dialog.call_id.clone(), (dialog, now));
    }

    pub(super) async fn handle_response(&self, response: Response, source: SocketAddr) -> Result<()> {
        let cseq = response.cseq()?;
        let leg_call_id = response.call_id()?.to_string();

        if cseq.method != Method::Invite {
            trace!(call_id = %leg_call_id, method = %cseq.method, status = response.status.as_u16(), "response to in-dialog request");
            return Ok(());
        }

        if response.status.is_final() {
            if let Some((_, (mut dialog, _))) = self.abandoned.remove(&leg_call_id) {
                dialog.on_response(&response);
                if response.status.is_success() {
                    // answered as we cancelled
                    self.send(dialog.ack(&self.endpoint), dialog.destination).await;
                    let bye = dialog.bye(&self.endpoint);
                    self.send(bye, dialog.destination).await;
                } else {
                    self.send(dialog.ack_failure(&response), dialog.destination).await;
                }
                return Ok(());
            }
        }

        let Some(call_id) = self.legs.get(&leg_call_id).map(|owner| owner.value().clone()) else {
            debug!(call_id = %leg_call_id, %source, status = response.status.as_u16(), "response for unknown leg");
            return Ok(());
        };
        self.on_leg_response(&call_id, &leg_call_id, response).await;
        Ok(())
    }

    async fn on_leg_response(&self, call_id: &str, leg_call_id: &str, response: Response) {
        let status = response.status;
        let no_answer = self.no_answer_timeout();
        let internal_tx = self.internal_tx.clone();

        // update the dialog and work out what the response means for the leg
        let Some(found) = self.with_call(call_id, |entry| {
            let role = leg_role(entry, leg_call_id)?;
            let state = entry.call.state();
            let leg = match role {
                LegRole::Bridge => entry.b_leg.as_mut()?,
                LegRole::Transfer => &mut entry.pending_transfer.as_mut()?.leg,
            };
            leg.dialog.on_response(&response);
            let repeat = leg.answered && status.is_success();
            if status.is_provisional() {
                leg.invite_timer = Some(timers::after(
                    no_answer,
                    internal_tx,
                    Internal::InviteTimeout {
                        call_id: call_id.to_string(),
                        leg_call_id: leg_call_id.to_string(),
                    },
                ));
            } else {
                leg.invite_timer = None;
                leg.answered |= status.is_success();
            }
            let ack = status.is_success().then(|| leg.dialog.ack(&self.endpoint));
            Some((role, repeat, ack, leg.dialog.destination, state))
        }) else {
            return;
        };
        let Some((role, repeat, ack, destination, state)) = found else {
            trace!(%call_id, leg = %leg_call_id, "response for replaced leg");
            return;
        };

        if status.is_provisional() {
            if role == LegRole::Bridge
                && state == CallState::Ringing
                && matches!(status, StatusCode::Ringing | StatusCode::SessionProgress)
            {
                let ringing = self.with_call(call_id, |entry| {
                    entry
                        .uas
                        .invite_response(StatusCode::Ringing)
                        .contact(self.endpoint.contact(None).to_string())
                        .build()
                });
                if let Some(ringing) = ringing {
                    let source = self.with_call(call_id, |entry| entry.uas.source);
                    if let Some(source) = source {
                        self.send(ringing, source).await;
                    }
                }
            }
            return;
        }

        if let Some(ack) = ack {
            self.send(ack, destination).await;
            if repeat {
                trace!(%call_id, leg = %leg_call_id, "re-acknowledged 2xx retransmission");
                return;
            }
            let answer = std::str::from_utf8(&response.body)
                .ok()
                .filter(|body| !body.trim().is_empty())
                .and_then(|body| parse_sdp(body).ok());
            match role {
                LegRole::Bridge => self.on_callee_answer(call_id, answer).await,
                LegRole::Transfer => self.complete_transfer(call_id, answer).await,
            }
            return;
        }

        // failure response
        self.legs.remove(leg_call_id);
        let failed = self.with_call(call_id, |entry| match role {
            LegRole::Bridge => entry
                .b_leg
                .take()
                .map(|leg| (leg.dialog.ack_failure(&response), None)),
            LegRole::Transfer => entry
                .pending_transfer
                .take()
                .map(|pending| (pending.leg.dialog.ack_failure(&response), Some(pending.target))),
        });
        let Some((ack, transfer_target)) = failed.flatten() else {
            return;
        };
        self.send(ack, destination).await;
        info!(%call_id, leg = %leg_call_id, status = status.as_u16(), "outbound leg rejected");

        match role {
            LegRole::Transfer => {
                let target = transfer_target.unwrap_or_default();
                self.transfer_failed(call_id, &target, &format!("target answered {}", status.as_u16()))
                    .await;
            }
            LegRole::Bridge if state == CallState::Ringing => {
                if matches!(
                    status,
                    StatusCode::BusyHere
                        | StatusCode::TemporarilyUnavailable
                        | StatusCode::RequestTimeout
                        | StatusCode::Decline
                ) {
                    self.to_voicemail(call_id, status, EndReason::Rejected { status: status.as_u16() })
                        .await;
                } else {
                    self.fail_call(call_id, status, EndReason::Rejected { status: status.as_u16() })
                        .await;
                }
            }
            LegRole::Bridge => {}
        }
    }

    /// The bridged extension answered: answer the caller and start media
    async fn on_callee_answer(&self, call_id: &str, answer: Option<SessionDescription>) {
        let leg = self.with_call(call_id, |entry| {
            let socket = entry.b_leg.as_mut().and_then(|leg| leg.socket.take())?;
            if let Some(answered) = answer.as_ref().map(SessionDescription::audio_codecs) {
                // answer the caller only with what the callee accepted
                let dtmf = entry.dtmf_payload_type;
                let filtered: Vec<u8> = entry
                    .codecs
                    .iter()
                    .copied()
                    .filter(|pt| answered.contains(pt) || *pt == dtmf)
                    .collect();
                if filtered.iter().any(|pt| *pt != dtmf) {
                    entry.codecs = filtered;
                }
            }
            Some(callee_leg(entry, socket, answer.as_ref()))
        });
        match leg.flatten() {
            Some(leg) => {
                info!(%call_id, "callee answered");
                self.answer_caller(call_id, leg).await;
            }
            None => debug!(%call_id, "callee answer without a reserved socket"),
        }
    }

    pub(super) async fn on_no_answer(&self, call_id: &str) {
        if self.call_state(call_id) != Some(CallState::Ringing) {
            return;
        }
        info!(%call_id, "no answer");
        self.to_voicemail(call_id, StatusCode::TemporarilyUnavailable, EndReason::Timeout)
            .await;
    }

    pub(super) async fn on_invite_timeout(&self, call_id: &str, leg_call_id: &str) {
        let role = self.with_call(call_id, |entry| leg_role(entry, leg_call_id));
        match role.flatten() {
            Some(LegRole::Bridge) if self.call_state(call_id) == Some(CallState::Ringing) => {
                info!(%call_id, leg = %leg_call_id, "outbound leg timed out");
                self.to_voicemail(call_id, StatusCode::RequestTimeout, EndReason::Timeout)
                    .await;
            }
            Some(LegRole::Transfer) => {
                let pending = self.with_call(call_id, |entry| entry.pending_transfer.take()).flatten();
                if let Some(pending) = pending {
                    let target = pending.target.clone();
                    self.abandon(pending.leg).await;
                    self.transfer_failed(call_id, &target, "no answer").await;
                }
            }
            _ => {
                self.legs.remove(leg_call_id);
            }
        }
    }

    /// Send a ringing call to voicemail, or fail it with `status` when it
    /// already is voicemail or no voicemail collaborator exists
    async fn to_voicemail(&self, call_id: &str, status: StatusCode, reason: EndReason) {
        let Some((fallback, leg)) = self.with_call(call_id, |entry| {
            let fallback = entry.call.destination.voicemail_fallback();
            let already = entry.call.destination.kind() == DestinationKind::Voicemail;
            (
                (!already && self.collaborators.contains(DestinationKind::Voicemail)).then_some(fallback),
                entry.b_leg.take(),
            )
        }) else {
            return;
        };
        if let Some(leg) = leg {
            self.abandon(leg).await;
        }
        match fallback {
            Some(destination) => self.redirect(call_id, destination).await,
            None => self.fail_call(call_id, status, reason).await,
        }
    }

    /// Begin a blind transfer of an active call to the dialed `target`
    pub(super) async fn start_transfer(&self, call_id: &str, target: &str) {
        let Some(destination) = self.dial_plan.resolve(target) else {
            self.transfer_failed(call_id, target, "no route").await;
            return;
        };
        let started = self.with_call(call_id, |entry| {
            if entry.call.state() != CallState::Active {
                return None;
            }
            self.transition(entry, CallEvent::TransferStart)?;
            Some(entry.hops)
        });
        let Some(hops) = started.flatten() else {
            debug!(%call_id, %target, "transfer ignored outside an active call");
            return;
        };
        info!(%call_id, %target, %destination, "transferring call");
        self.consult_for_transfer(call_id, target, destination, hops).await;
    }

    async fn consult_for_transfer(&self, call_id: &str, target: &str, destination: Destination, hops: u8) {
        let Some(collaborator) = self.collaborators.get(destination.kind()) else {
            self.transfer_failed(call_id, target, "no collaborator for target").await;
            return;
        };
        let Some(ctx) = self.with_call(call_id, |entry| CallContext {
            call_id: call_id.to_string(),
            from: entry.call.from.clone(),
            to: target.to_string(),
            destination,
            offer: entry.offer.clone(),
            codecs: entry.codecs.clone(),
            dtmf_payload_type: Some(entry.dtmf_payload_type),
        }) else {
            return;
        };

        let internal_tx = self.internal_tx.clone();
        let target = target.to_string();
        tokio::spawn(async move {
            let result = collaborator.on_call(&ctx).await;
            let _ = internal_tx.send(Internal::TransferDecision {
                call_id: ctx.call_id.clone(),
                target,
                destination: ctx.destination.clone(),
                hops,
                collaborator: Arc::clone(&collaborator),
                result,
            });
        });
    }

    pub(super) async fn on_transfer_decision(
        &self,
        call_id: &str,
        target: &str,
        destination: Destination,
        hops: u8,
        collaborator: Arc<dyn Collaborator>,
        result: Result<CollaboratorDecision>,
    ) {
        if self.call_state(call_id) != Some(CallState::Transferring) {
            trace!(%call_id, "stale transfer decision");
            return;
        }

        match result {
            Ok(CollaboratorDecision::Answer { media }) => {
                let socket = match self.ports.allocate().await {
                    Ok(socket) => socket,
                    Err(e) => {
                        self.transfer_failed(call_id, target, &e.to_string()).await;
                        return;
                    }
                };
                let Some(leg) = self.with_call(call_id, |entry| collaborator_leg(entry, socket, media)) else {
                    return;
                };
                match self.swap_leg(call_id, leg).await {
                    Ok(()) => self.finish_transfer(call_id, target, destination, collaborator, None).await,
                    Err(e) => self.transfer_failed(call_id, target, &e.to_string()).await,
                }
            }
            Ok(CollaboratorDecision::Redirect { destination }) => {
                if hops >= MAX_REDIRECTS {
                    self.transfer_failed(call_id, target, "too many redirects").await;
                    return;
                }
                self.consult_for_transfer(call_id, target, destination, hops + 1).await;
            }
            Ok(CollaboratorDecision::Bridge { contact, uri }) => match self.originate(call_id, contact, uri).await {
                Ok(leg) => {
                    self.with_call(call_id, |entry| {
                        entry.pending_transfer = Some(PendingTransfer {
                            target: target.to_string(),
                            destination,
                            leg,
                            owner: collaborator,
                        });
                    });
                }
                Err(e) => self.transfer_failed(call_id, target, &e.to_string()).await,
            },
            Err(e) => self.transfer_failed(call_id, target, &e.to_string()).await,
        }
    }

    /// Replace relay leg B, keeping the outgoing leg's quality summary
    async fn swap_leg(&self, call_id: &str, leg: LegConfig) -> Result<()> {
        let Some(mut relay) = self.with_call(call_id, |entry| entry.relay.take()).flatten() else {
            return Err(SessionError::call_not_found(call_id));
        };
        let result = relay.replace_leg(LegSide::B, leg).await;
        self.with_call(call_id, |entry| entry.relay = Some(relay));
        let summary = result?;
        self.history.lock().record_summary(summary.clone());
        self.with_call(call_id, |entry| entry.quality.push(summary));
        Ok(())
    }

    /// The transfer target answered its INVITE
    async fn complete_transfer(&self, call_id: &str, answer: Option<SessionDescription>) {
        let Some(pending) = self.with_call(call_id, |entry| entry.pending_transfer.take()).flatten() else {
            return;
        };
        let PendingTransfer {
            target,
            destination,
            mut leg,
            owner,
        } = pending;
        let Some(socket) = leg.socket.take() else {
            self.transfer_failed(call_id, &target, "no media socket").await;
            return;
        };
        let Some(config) = self.with_call(call_id, |entry| callee_leg(entry, socket, answer.as_ref())) else {
            return;
        };
        match self.swap_leg(call_id, config).await {
            Ok(()) => self.finish_transfer(call_id, &target, destination, owner, Some(leg)).await,
            Err(e) => {
                self.abandon(leg).await;
                self.transfer_failed(call_id, &target, &e.to_string()).await;
            }
        }
    }

    async fn finish_transfer(
        &self,
        call_id: &str,
        target: &str,
        destination: Destination,
        owner: Arc<dyn Collaborator>,
        new_leg: Option<BLeg>,
    ) {
        let old_leg = self.with_call(call_id, |entry| {
            entry.owner = Some(owner);
            entry.call.destination = destination;
            entry.call.transfer_target = Some(target.to_string());
            self.transition(entry, CallEvent::TransferComplete);
            std::mem::replace(&mut entry.b_leg, new_leg)
        });
        if let Some(old) = old_leg.flatten() {
            self.abandon(old).await;
        }
        info!(%call_id, %target, "transfer complete");
    }

    /// Return a transferring call to `Active` and tell its owner
    pub(super) async fn transfer_failed(&self, call_id: &str, target: &str, reason: &str) {
        let Some((owner, pending)) = self.with_call(call_id, |entry| {
            if entry.call.state() == CallState::Transferring {
                self.transition(entry, CallEvent::TransferFailed);
            }
            (entry.owner.clone(), entry.pending_transfer.take())
        }) else {
            return;
        };
        if let Some(pending) = pending {
            self.abandon(pending.leg).await;
        }
        warn!(%call_id, %target, %reason, "transfer failed");
        self.emit(CoordinatorEvent::TransferFailed {
            call_id: call_id.to_string(),
            target: target.to_string(),
            reason: reason.to_string(),
        });
        if let Some(owner) = owner {
            let (call_id, target, reason) = (call_id.to_string(), target.to_string(), reason.to_string());
            tokio::spawn(async move {
                owner.on_transfer_failed(&call_id, &target, &reason).await;
            });
        }
    }
}

fn leg_role(entry: &CallEntry, leg_call_id: &str) -> Option<LegRole> {
    if entry.b_leg.as_ref().map_or(false, |leg| leg.dialog.call_id == leg_call_id) {
        Some(LegRole::Bridge)
    } else if entry
        .pending_transfer
        .as_ref()
        .map_or(false, |pending| pending.leg.dialog.call_id == leg_call_id)
    {
        Some(LegRole::Transfer)
    } else {
        None
    }
}

/// Relay leg toward a collaborator's media endpoint
fn collaborator_leg(entry: &CallEntry, socket: UdpSocket, media: SocketAddr) -> LegConfig {
    let mut leg = LegConfig::new(socket)
        .with_remote(media)
        .with_audio_payload_type(entry.audio_payload_type());
    if entry.codecs.contains(&entry.dtmf_payload_type) {
        leg = leg.with_dtmf_payload_type(entry.dtmf_payload_type);
    }
    leg
}

/// Relay leg toward an extension that answered with `answer`
fn callee_leg(entry: &CallEntry, socket: UdpSocket, answer: Option<&SessionDescription>) -> LegConfig {
    let mut leg = LegConfig::new(socket);
    let audio = answer
        .map(SessionDescription::audio_codecs)
        .and_then(|codecs| {
            let event = answer.and_then(SessionDescription::telephone_event);
            codecs.into_iter().find(|pt| Some(*pt) != event)
        })
        .unwrap_or_else(|| entry.audio_payload_type());
    leg = leg.with_audio_payload_type(audio);
    if let Some(remote) = answer.and_then(SessionDescription::audio_endpoint) {
        leg = leg.with_remote(remote);
    }
    if let Some(event) = answer.and_then(SessionDescription::telephone_event) {
        leg = leg.with_dtmf_payload_type(event);
    }
    leg
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_media_core::DtmfReceiver;
    use switchboard_sip_core::parse_message;
    use switchboard_sip_core::types::Message;

    use crate::call::Call;
    use crate::dialog::UasDialog;

    const INVITE: &str = "INVITE sip:1002@pbx SIP/2.0\r\n\
        Via: SIP/2.0/UDP 10.0.0.5:5060;branch=z9hG4bKa\r\n\
        From: <sip:1001@pbx>;tag=caller\r\n\
        To: <sip:1002@pbx>\r\n\
        Call-ID: c1@10.0.0.5\r\n\
        CSeq: 1 INVITE\r\n\r\n";

    async fn entry(codecs: Vec<u8>) -> CallEntry {
        let invite = match parse_message(INVITE.as_bytes()).unwrap() {
            Message::Request(r) => r,
            Message::Response(_) => unreachable!(),
        };
        let uas = UasDialog::from_invite(&invite, "10.0.0.5:5060".parse().unwrap()).unwrap();
        let call = Call::new(
            "c1@10.0.0.5",
            "sip:1001@pbx",
            "sip:1002@pbx",
            "1002",
            Destination::Extension { number: "1002".into() },
        );
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver = DtmfReceiver::new(Default::default(), std::time::Duration::from_millis(300));
        CallEntry::new(call, uas, None, codecs, 101, socket, receiver)
    }

    #[tokio::test]
    async fn callee_leg_follows_the_answer() {
        let entry = entry(vec![8, 0, 101]).await;
        let answer = parse_sdp(
            "v=0\r\no=- 1 1 IN IP4 10.0.0.9\r\ns=-\r\nc=IN IP4 10.0.0.9\r\nt=0 0\r\n\
             m=audio 6000 RTP/AVP 0 96\r\na=rtpmap:96 telephone-event/8000\r\n",
        )
        .unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let leg = callee_leg(&entry, socket, Some(&answer));
        assert_eq!(leg.audio_payload_type, 0);
        assert_eq!(leg.dtmf_payload_type, Some(96));
        assert_eq!(leg.signaled_remote, Some("10.0.0.9:6000".parse().unwrap()));
    }

    #[tokio::test]
    async fn collaborator_leg_uses_caller_codecs() {
        let entry = entry(vec![8, 0, 101]).await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let media: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let leg = collaborator_leg(&entry, socket, media);
        assert_eq!(leg.audio_payload_type, 8);
        assert_eq!(leg.dtmf_payload_type, Some(101));
        assert_eq!(leg.signaled_remote, Some(media));

        let no_events = self::entry(vec![0]).await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        assert_eq!(collaborator_leg(&no_events, socket, media).dtmf_payload_type, None);
    }
}
