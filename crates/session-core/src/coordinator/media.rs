//! Answering with media, relay events, and teardown.

use std::time::Instant;

use switchboard_media_core::{
    DtmfDigit, DtmfSource, LegConfig, LegSide, MediaEvent, MediaRelay, QualitySummary,
};
use switchboard_sip_core::prelude::{Method, StatusCode};
use switchboard_sip_core::sdp::{build_answer, build_offer};
use switchboard_sip_core::CONTENT_TYPE_SDP;
use tracing::{debug, info, trace, warn};

use super::events::{CallRecord, CoordinatorEvent, Internal};
use super::{timers, Party, SessionCoordinator};
use crate::call::{CallEvent, CallState, EndReason};

impl SessionCoordinator {
    /// Start the relay between the caller and `leg_b`, then send the 2xx
    pub(super) async fn answer_caller(&self, call_id: &str, leg_b: LegConfig) {
        let leg_a = self.with_call(call_id, |entry| {
            let socket = entry.leg_a_socket.take()?;
            let mut leg = LegConfig::new(socket).with_audio_payload_type(entry.audio_payload_type());
            if let Some(remote) = entry.offer.as_ref().and_then(|o| o.audio_endpoint()) {
                leg = leg.with_remote(remote);
            }
            if entry.codecs.contains(&entry.dtmf_payload_type) {
                leg = leg.with_dtmf_payload_type(entry.dtmf_payload_type);
            }
            Some(leg)
        });
        let Some(leg_a) = leg_a.flatten() else {
            debug!(%call_id, "call already answered or gone");
            return;
        };

        let relay = match MediaRelay::start(call_id, leg_a, leg_b, self.relay_config.clone(), self.media_tx.clone()) {
            Ok(relay) => relay,
            Err(e) => {
                warn!(%call_id, error = %e, "media relay failed to start");
                self.fail_call(call_id, StatusCode::ServiceUnavailable, EndReason::MediaUnavailable)
                    .await;
                return;
            }
        };
        let local = self.advertised(relay.local_addr(LegSide::A));
        let ack_timeout = self.ack_timeout();

        let answered = self.with_call(call_id, |entry| {
            let session_id = u64::from(rand::random::<u32>());
            let sdp = match &entry.offer {
                Some(offer) => build_answer(offer, &entry.codecs, local, session_id),
                // no offer in the INVITE: the 2xx carries ours and the ACK the answer
                None => build_offer(&entry.codecs, entry.dtmf_payload_type, local, session_id),
            };
            let response = entry
                .uas
                .invite_response(StatusCode::Ok)
                .contact(self.endpoint.contact(None).to_string())
                .server(self.endpoint.user_agent.clone())
                .allow(Method::supported())
                .body(CONTENT_TYPE_SDP, sdp.to_string())
                .build();
            entry.relay = Some(relay);
            entry.local_answer = Some(sdp);
            entry.no_answer = None;
            entry.uas.last_response = Some(response.clone());
            self.transition(entry, CallEvent::Answer);
            entry.retransmit = Some(timers::retransmit(
                self.transport.clone(),
                response.clone().into(),
                entry.uas.source,
                ack_timeout,
                self.internal_tx.clone(),
                Internal::AckTimeout {
                    call_id: call_id.to_string(),
                },
            ));
            (response, entry.uas.source)
        });
        if let Some((response, source)) = answered {
            info!(%call_id, media = %local, "call answered");
            self.send(response, source).await;
        }
    }

    pub(super) async fn on_ack_timeout(&self, call_id: &str) {
        if self.call_state(call_id) != Some(CallState::Answered) {
            return;
        }
        let err = crate::error::TimeoutError::Ack {
            call_id: call_id.to_string(),
            after: self.ack_timeout(),
        };
        warn!(%call_id, error = %err, "answer never acknowledged");
        self.terminate(call_id, EndReason::Timeout, Party::Local).await;
    }

    pub(super) async fn handle_media_event(&self, event: MediaEvent) {
        match event {
            MediaEvent::ToneDetected {
                call_id,
                leg,
                digit,
                source,
                duration_ms,
            } => {
                trace!(%call_id, %leg, %digit, %source, "tone from relay");
                self.deliver_digit(&call_id, digit, source, duration_ms);
            }
            MediaEvent::AddressLearned { call_id, leg, addr } => {
                debug!(%call_id, %leg, %addr, "media address learned");
            }
            MediaEvent::QualitySnapshot { call_id, leg, metrics } => {
                let alerts = self.thresholds.evaluate(&call_id, leg, &metrics);
                self.raise_alerts(alerts);
            }
            MediaEvent::RelayError { call_id, leg, error } => {
                warn!(%call_id, %leg, %error, "media relay error");
            }
        }
    }

    fn raise_alerts(&self, alerts: Vec<switchboard_media_core::QualityAlert>) {
        for alert in alerts {
            warn!(
                call_id = %alert.call_id,
                leg = %alert.leg,
                value = alert.value,
                threshold = alert.threshold,
                "quality alert raised: {}",
                alert.message
            );
            self.history.lock().record_alert(alert.clone());
            self.emit(CoordinatorEvent::QualityAlert(alert));
        }
    }

    /// Merge a digit from any path and hand it to the call's owner
    pub(super) fn deliver_digit(&self, call_id: &str, digit: DtmfDigit, source: DtmfSource, duration_ms: u32) {
        let delivered = self.with_call(call_id, |entry| {
            entry
                .receiver
                .offer(digit, source, duration_ms, Instant::now())
                .map(|detected| (detected, entry.owner.clone()))
        });
        let Some((detected, owner)) = delivered.flatten() else {
            return;
        };
        debug!(%call_id, %digit, %source, duration_ms, "digit received");
        self.emit(CoordinatorEvent::DigitReceived {
            call_id: call_id.to_string(),
            digit,
            source,
            duration_ms,
        });
        if let Some(owner) = owner {
            let call_id = call_id.to_string();
            tokio::spawn(async move {
                owner.on_digit(&call_id, detected).await;
            });
        }
    }

    /// Send a final failure response to the INVITE and end the call
    pub(super) async fn fail_call(&self, call_id: &str, status: StatusCode, reason: EndReason) {
        let response = self.with_call(call_id, |entry| {
            matches!(entry.call.state(), CallState::Created | CallState::Ringing)
                .then(|| (entry.uas.invite_response(status).build(), entry.uas.source))
        });
        if let Some((response, source)) = response.flatten() {
            self.send(response, source).await;
        }
        self.terminate(call_id, reason, Party::Local).await;
    }

    pub(super) async fn local_hangup(&self, call_id: &str) {
        match self.call_state(call_id) {
            Some(CallState::Created | CallState::Ringing) => {
                self.fail_call(call_id, StatusCode::TemporarilyUnavailable, EndReason::LocalHangup)
                    .await
            }
            Some(_) => self.terminate(call_id, EndReason::LocalHangup, Party::Local).await,
            None => {}
        }
    }

    /// Remove a call, tear down both legs and publish its record
    pub(super) async fn terminate(&self, call_id: &str, reason: EndReason, initiator: Party) {
        let Some((_, mut entry)) = self.calls.remove(call_id) else {
            return;
        };
        entry.retransmit = None;
        entry.no_answer = None;
        let state = entry.call.state();

        if initiator != Party::Caller && matches!(state, CallState::Answered | CallState::Active | CallState::Transferring) {
            let bye = entry.uas.bye(&self.endpoint);
            self.send(bye, entry.uas.source).await;
        }
        if let Some(leg) = entry.b_leg.take() {
            if initiator == Party::Callee {
                self.legs.remove(&leg.dialog.call_id);
            } else {
                self.abandon(leg).await;
            }
        }
        if let Some(pending) = entry.pending_transfer.take() {
            self.abandon(pending.leg).await;
        }

        let mut summaries: Vec<QualitySummary> = std::mem::take(&mut entry.quality);
        if let Some(relay) = entry.relay.take() {
            match relay.stop().await {
                Ok(report) => {
                    debug!(%call_id, forwarded = report.forwarded_packets, "relay report collected");
                    for summary in &report.summaries {
                        self.history.lock().record_summary(summary.clone());
                    }
                    summaries.extend(report.summaries);
                }
                Err(e) => warn!(%call_id, error = %e, "media relay did not stop cleanly"),
            }
        }
        for summary in &summaries {
            let alerts = self.thresholds.evaluate(call_id, summary.leg, &summary.metrics);
            self.raise_alerts(alerts);
        }

        match entry.call.end(reason.clone(), tokio::time::Instant::now()) {
            Ok(state) => self.emit(CoordinatorEvent::StateChanged {
                call_id: call_id.to_string(),
                state,
            }),
            Err(e) => debug!(%call_id, error = %e, "call already ended"),
        }
        info!(%call_id, ?reason, "call ended");

        let record = CallRecord::from_call(&entry.call, reason, summaries);
        let _ = self.records_tx.send(record.clone());
        if let Some(owner) = entry.owner.take() {
            tokio::spawn(async move {
                owner.on_call_ended(&record).await;
            });
        }
    }

    /// End every call; used on shutdown
    pub(super) async fn shutdown_calls(&self) {
        let call_ids = self.active_calls();
        if !call_ids.is_empty() {
            info!(calls = call_ids.len(), "ending calls for shutdown");
        }
        let endings = call_ids.iter().map(|call_id| async move {
            match self.call_state(call_id) {
                Some(CallState::Created | CallState::Ringing) => {
                    self.fail_call(call_id, StatusCode::ServiceUnavailable, EndReason::Shutdown)
                        .await
                }
                Some(_) => self.terminate(call_id, EndReason::Shutdown, Party::Local).await,
                None => {}
            }
        });
        futures::future::join_all(endings).await;
    }
}
