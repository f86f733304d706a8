//! Requests arriving from phones: call setup, in-dialog requests and
//! keep-alives.

use std::net::SocketAddr;
use std::sync::Arc;

use switchboard_media_core::dtmf::info::DTMF_CONTENT_TYPE;
use switchboard_media_core::dtmf::{parse_info_body, DTMF_RELAY_CONTENT_TYPE};
use switchboard_media_core::{DtmfReceiver, DtmfSource};
use switchboard_sip_core::prelude::{
    HeaderAccess, HeaderName, Method, NameAddr, Request, SimpleResponseBuilder, StatusCode,
};
use switchboard_sip_core::sdp::{parse_sdp, SessionDescription};
use switchboard_sip_core::CONTENT_TYPE_SDP;
use tracing::{debug, error, info, trace, warn};

use super::entry::CallEntry;
use super::events::{CallRecord, CoordinatorEvent, Internal};
use super::{timers, Party, SessionCoordinator};
use crate::call::{Call, CallEvent, CallState, EndReason, TeardownDecision};
use crate::collaborator::CallContext;
use crate::dialog::UasDialog;
use crate::error::Result;

/// Which dialog an in-dialog request belongs to
enum DialogRef {
    Caller(String),
    /// Outbound leg, with the call it belongs to
    Callee(String),
}

impl DialogRef {
    fn call_id(&self) -> &str {
        match self {
            DialogRef::Caller(id) | DialogRef::Callee(id) => id,
        }
    }
}

impl SessionCoordinator {
    pub(super) async fn handle_request(&self, request: Request, source: SocketAddr) -> Result<()> {
        trace!(method = %request.method, %source, "handling request");
        match request.method {
            Method::Invite => self.on_invite(request, source).await,
            Method::Ack => self.on_ack(&request),
            Method::Bye => self.on_bye(&request, source).await,
            Method::Cancel => self.on_cancel(&request, source).await,
            Method::Info => self.on_info(&request, source).await,
            Method::Refer => self.on_refer(&request, source).await,
            Method::Options => {
                let response = SimpleResponseBuilder::response_to(&request, StatusCode::Ok)
                    .allow(Method::supported())
                    .server(self.endpoint.user_agent.clone())
                    .build();
                self.send(response, source).await;
                Ok(())
            }
            _ => {
                debug!(method = %request.method, "unsupported method");
                let response = SimpleResponseBuilder::response_to(&request, StatusCode::NotImplemented)
                    .allow(Method::supported())
                    .build();
                self.send(response, source).await;
                Ok(())
            }
        }
    }

    fn dialog_of(&self, call_id: &str) -> Option<DialogRef> {
        if self.calls.contains_key(call_id) {
            return Some(DialogRef::Caller(call_id.to_string()));
        }
        self.legs.get(call_id).map(|owner| DialogRef::Callee(owner.value().clone()))
    }

    async fn reply(&self, request: &Request, status: StatusCode, source: SocketAddr) {
        let response = SimpleResponseBuilder::response_to(request, status).build();
        self.send(response, source).await;
    }

    async fn on_invite(&self, request: Request, source: SocketAddr) -> Result<()> {
        let call_id = request.call_id()?.to_string();
        let cseq = request.cseq()?.seq;

        if let Some(dialog) = self.dialog_of(&call_id) {
            return self.on_reinvite(dialog, &request, cseq, source).await;
        }

        let uas = match UasDialog::from_invite(&request, source) {
            Ok(uas) => uas,
            Err(e) => {
                warn!(%call_id, error = %e, "rejecting INVITE with unusable headers");
                self.reply(&request, StatusCode::BadRequest, source).await;
                return Ok(());
            }
        };
        self.send(uas.invite_response(StatusCode::Trying).build(), source).await;

        let dialed = request
            .uri
            .user
            .clone()
            .or_else(|| uas.local.user().map(str::to_string))
            .unwrap_or_default();
        let Some(destination) = self.dial_plan.resolve(&dialed) else {
            info!(%call_id, %dialed, "no route for dialed number");
            self.send(uas.invite_response(StatusCode::NotFound).build(), source).await;
            return Ok(());
        };
        let call = Call::new(
            &call_id,
            uas.remote.uri.to_string(),
            uas.local.uri.to_string(),
            &dialed,
            destination.clone(),
        );

        let offer = if request.body.is_empty() {
            None
        } else {
            match std::str::from_utf8(&request.body)
                .map_err(|_| switchboard_sip_core::ParseError::sdp("body is not UTF-8"))
                .and_then(parse_sdp)
            {
                Ok(sdp) => Some(sdp),
                Err(e) => {
                    warn!(%call_id, error = %e, "rejecting INVITE with malformed SDP");
                    self.reject_setup(call, &uas, StatusCode::BadRequest, EndReason::Rejected { status: 400 })
                        .await;
                    return Ok(());
                }
            }
        };

        let offered = offer.as_ref().map(SessionDescription::audio_codecs).unwrap_or_default();
        let offered_event = offer.as_ref().and_then(SessionDescription::telephone_event);
        let codecs = match self
            .negotiator
            .negotiate_for_device(&offered, offered_event, request.user_agent())
        {
            Ok(codecs) => codecs,
            Err(e) => {
                warn!(%call_id, error = %e, "codec negotiation failed");
                self.reject_setup(call, &uas, StatusCode::NotAcceptableHere, EndReason::NotAcceptable)
                    .await;
                return Ok(());
            }
        };
        let dtmf_payload_type = offered_event.unwrap_or(self.config.media.dtmf_payload_type);

        let socket = match self.ports.allocate().await {
            Ok(socket) => socket,
            Err(e) => {
                error!(%call_id, error = %e, "media socket allocation failed");
                self.reject_setup(call, &uas, StatusCode::ServiceUnavailable, EndReason::MediaUnavailable)
                    .await;
                return Ok(());
            }
        };

        info!(%call_id, from = %call.from, %dialed, %destination, codecs = ?codecs, "incoming call");
        let receiver = DtmfReceiver::new(self.config.media.dtmf_mode, self.coincidence_window());
        let mut entry = CallEntry::new(call, uas, offer, codecs, dtmf_payload_type, socket, receiver);
        self.transition(&mut entry, CallEvent::Ring);

        let ringing = entry
            .uas
            .invite_response(StatusCode::Ringing)
            .contact(self.endpoint.contact(None).to_string())
            .build();
        entry.uas.last_response = Some(ringing.clone());
        entry.no_answer = Some(timers::after(
            self.no_answer_timeout(),
            self.internal_tx.clone(),
            Internal::NoAnswer {
                call_id: call_id.clone(),
            },
        ));
        self.calls.insert(call_id.clone(), entry);
        self.send(ringing, source).await;

        self.consult(&call_id).await;
        Ok(())
    }

    /// INVITE retransmission, or a re-INVITE refreshing an existing session
    async fn on_reinvite(&self, dialog: DialogRef, request: &Request, cseq: u32, source: SocketAddr) -> Result<()> {
        match dialog {
            DialogRef::Caller(call_id) => {
                let resend = self.with_call(&call_id, |entry| {
                    if cseq == entry.uas.invite_cseq {
                        return entry.uas.last_response.clone();
                    }
                    let mut response = entry
                        .uas
                        .response_to(request, StatusCode::Ok)
                        .contact(self.endpoint.contact(None).to_string());
                    if let Some(answer) = &entry.local_answer {
                        response = response.body(CONTENT_TYPE_SDP, answer.to_string());
                    }
                    Some(response.build())
                });
                match resend.flatten() {
                    Some(response) => self.send(response, source).await,
                    None => trace!(%call_id, "INVITE retransmission before any response"),
                }
            }
            DialogRef::Callee(call_id) => {
                let offer = self.with_call(&call_id, |entry| {
                    entry
                        .b_leg
                        .as_ref()
                        .filter(|leg| leg.dialog.call_id == request.call_id().unwrap_or_default())
                        .map(|leg| leg.dialog.invite.body.clone())
                });
                let mut response = SimpleResponseBuilder::response_to(request, StatusCode::Ok)
                    .contact(self.endpoint.contact(None).to_string());
                if let Some(body) = offer.flatten() {
                    response = response.body(CONTENT_TYPE_SDP, body);
                }
                debug!(%call_id, "session refresh from callee");
                self.send(response.build(), source).await;
            }
        }
        Ok(())
    }

    /// Answer a setup that never became a call, and publish its record
    pub(super) async fn reject_setup(&self, mut call: Call, uas: &UasDialog, status: StatusCode, reason: EndReason) {
        let response = uas.invite_response(status).build();
        self.send(response, uas.source).await;
        if let Ok(state) = call.end(reason.clone(), tokio::time::Instant::now()) {
            self.emit(CoordinatorEvent::StateChanged {
                call_id: call.call_id.clone(),
                state,
            });
        }
        let record = CallRecord::from_call(&call, reason, Vec::new());
        let _ = self.records_tx.send(record);
    }

    /// Ask the collaborator for the call's destination how to handle it
    pub(super) async fn consult(&self, call_id: &str) {
        let Some((ctx, hops)) = self.with_call(call_id, |entry| {
            let ctx = CallContext {
                call_id: call_id.to_string(),
                from: entry.call.from.clone(),
                to: entry.call.to.clone(),
                destination: entry.call.destination.clone(),
                offer: entry.offer.clone(),
                codecs: entry.codecs.clone(),
                dtmf_payload_type: Some(entry.dtmf_payload_type),
            };
            (ctx, entry.hops)
        }) else {
            return;
        };

        let kind = ctx.destination.kind();
        let Some(collaborator) = self.collaborators.get(kind) else {
            warn!(%call_id, destination = %ctx.destination, "no collaborator registered");
            self.fail_call(call_id, StatusCode::TemporarilyUnavailable, EndReason::CollaboratorFailed)
                .await;
            return;
        };
        debug!(%call_id, collaborator = collaborator.name(), destination = %ctx.destination, "consulting collaborator");

        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = collaborator.on_call(&ctx).await;
            let _ = internal_tx.send(Internal::Decision {
                call_id: ctx.call_id.clone(),
                hops,
                collaborator: Arc::clone(&collaborator),
                result,
            });
        });
    }

    fn on_ack(&self, request: &Request) -> Result<()> {
        let call_id = request.call_id()?;
        let acknowledged = self.with_call(call_id, |entry| {
            if entry.call.state() != CallState::Answered {
                return false;
            }
            entry.retransmit = None;
            self.transition(entry, CallEvent::Acknowledge).is_some()
        });
        match acknowledged {
            Some(true) => info!(%call_id, "call active"),
            Some(false) => trace!(%call_id, "ACK outside answer"),
            None => trace!(%call_id, "ACK for unknown or finished call"),
        }
        Ok(())
    }

    async fn on_bye(&self, request: &Request, source: SocketAddr) -> Result<()> {
        let leg_call_id = request.call_id()?.to_string();
        let cseq = request.cseq()?.seq;

        match self.dialog_of(&leg_call_id) {
            Some(DialogRef::Caller(call_id)) => {
                let now = tokio::time::Instant::now();
                let window = self.early_disconnect_window();
                let Some((decision, response)) = self.with_call(&call_id, |entry| {
                    let decision = entry.call.on_teardown_request(cseq, now, window);
                    (decision, entry.uas.response_to(request, StatusCode::Ok).build())
                }) else {
                    return Ok(());
                };
                self.send(response, source).await;
                match decision {
                    TeardownDecision::Suppressed => {
                        self.emit(CoordinatorEvent::EarlyDisconnectSuppressed { call_id });
                    }
                    TeardownDecision::Retransmission => {
                        debug!(%call_id, cseq, "absorbed retransmitted teardown");
                    }
                    TeardownDecision::Terminate => {
                        info!(%call_id, "caller hung up");
                        self.terminate(&call_id, EndReason::CallerHangup, Party::Caller).await;
                    }
                }
            }
            Some(DialogRef::Callee(call_id)) => {
                self.reply(request, StatusCode::Ok, source).await;
                let bridged = self
                    .with_call(&call_id, |entry| {
                        entry
                            .b_leg
                            .as_ref()
                            .map_or(false, |leg| leg.dialog.call_id == leg_call_id)
                    })
                    .unwrap_or(false);
                if bridged {
                    info!(%call_id, "callee hung up");
                    self.terminate(&call_id, EndReason::CalleeHangup, Party::Callee).await;
                } else {
                    self.legs.remove(&leg_call_id);
                }
            }
            None => {
                debug!(call_id = %leg_call_id, "BYE for unknown dialog");
                self.reply(request, StatusCode::CallOrTransactionDoesNotExist, source).await;
            }
        }
        Ok(())
    }

    async fn on_cancel(&self, request: &Request, source: SocketAddr) -> Result<()> {
        let call_id = request.call_id()?.to_string();
        let Some(terminated) = self.with_call(&call_id, |entry| {
            matches!(entry.call.state(), CallState::Created | CallState::Ringing)
                .then(|| entry.uas.invite_response(StatusCode::RequestTerminated).build())
        }) else {
            self.reply(request, StatusCode::CallOrTransactionDoesNotExist, source).await;
            return Ok(());
        };

        self.reply(request, StatusCode::Ok, source).await;
        match terminated {
            Some(response) => {
                info!(%call_id, "caller cancelled");
                self.send(response, source).await;
                self.terminate(&call_id, EndReason::Cancelled, Party::Caller).await;
            }
            None => debug!(%call_id, "CANCEL after answer ignored"),
        }
        Ok(())
    }

    async fn on_info(&self, request: &Request, source: SocketAddr) -> Result<()> {
        let leg_call_id = request.call_id()?.to_string();
        let Some(dialog) = self.dialog_of(&leg_call_id) else {
            self.reply(request, StatusCode::CallOrTransactionDoesNotExist, source).await;
            return Ok(());
        };

        let content_type = request
            .content_type()
            .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase());
        let is_digit = matches!(
            content_type.as_deref(),
            Some(ct) if ct == DTMF_RELAY_CONTENT_TYPE || ct == DTMF_CONTENT_TYPE
        );
        if !is_digit {
            trace!(call_id = %dialog.call_id(), content_type = ?content_type, "INFO without digit payload");
            self.reply(request, StatusCode::Ok, source).await;
            return Ok(());
        }

        let parsed = std::str::from_utf8(&request.body)
            .map_err(|_| "body is not UTF-8".to_string())
            .and_then(|body| parse_info_body(body).map_err(|e| e.to_string()));
        match parsed {
            Ok(info) => {
                self.reply(request, StatusCode::Ok, source).await;
                self.deliver_digit(dialog.call_id(), info.digit, DtmfSource::Info, info.duration_ms);
            }
            Err(reason) => {
                warn!(call_id = %dialog.call_id(), %reason, "malformed INFO digit body");
                self.reply(request, StatusCode::BadRequest, source).await;
            }
        }
        Ok(())
    }

    async fn on_refer(&self, request: &Request, source: SocketAddr) -> Result<()> {
        let leg_call_id = request.call_id()?.to_string();
        let Some(dialog) = self.dialog_of(&leg_call_id) else {
            self.reply(request, StatusCode::CallOrTransactionDoesNotExist, source).await;
            return Ok(());
        };
        let call_id = dialog.call_id().to_string();

        let target = request
            .header(&HeaderName::ReferTo)
            .and_then(|value| value.parse::<NameAddr>().ok())
            .and_then(|addr| addr.user().map(str::to_string));
        let Some(target) = target else {
            warn!(%call_id, "REFER without a usable Refer-To");
            self.reply(request, StatusCode::BadRequest, source).await;
            return Ok(());
        };

        if self.call_state(&call_id) != Some(CallState::Active) {
            let response = SimpleResponseBuilder::response_to(request, StatusCode::Custom(491))
                .reason("Request Pending")
                .build();
            self.send(response, source).await;
            return Ok(());
        }

        info!(%call_id, %target, "transfer requested");
        self.reply(request, StatusCode::Accepted, source).await;
        self.start_transfer(&call_id, &target).await;
        Ok(())
    }
}
