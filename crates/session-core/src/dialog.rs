//! Dialog bookkeeping for both sides of a bridged call.
//!
//! [`UasDialog`] is the dialog with the caller, created from its INVITE.
//! [`UacDialog`] is a dialog the switchboard originates itself, toward an
//! extension it bridges the caller to. Each one builds the in-dialog
//! requests its side needs (ACK, CANCEL, BYE) with the right tags, CSeq and
//! branch handling.

use std::net::SocketAddr;

use bytes::Bytes;
use switchboard_sip_core::builder::{new_branch, new_call_id, new_tag};
use switchboard_sip_core::prelude::{
    CSeq, HeaderAccess, HeaderName, Method, NameAddr, Request, Response, SimpleRequestBuilder,
    SimpleResponseBuilder, SipUri, StatusCode, Via,
};
use switchboard_sip_core::{ParseError, CONTENT_TYPE_SDP};

/// How the switchboard presents itself in requests it sends
#[derive(Debug, Clone)]
pub struct LocalEndpoint {
    pub host: String,
    pub port: u16,
    pub user_agent: String,
}

impl LocalEndpoint {
    pub fn new(addr: SocketAddr, user_agent: impl Into<String>) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
            user_agent: user_agent.into(),
        }
    }

    /// Top Via with a fresh branch
    pub fn via(&self) -> Via {
        Via::udp(self.host.clone(), self.port, new_branch())
    }

    pub fn contact(&self, user: Option<&str>) -> NameAddr {
        NameAddr::new(SipUri::new(user, self.host.clone(), Some(self.port)))
    }

    pub fn new_call_id(&self) -> String {
        new_call_id(&self.host)
    }
}

/// The caller's dialog, seen from the switchboard as UAS
#[derive(Debug, Clone)]
pub struct UasDialog {
    pub call_id: String,
    /// The caller's identity, with its tag
    pub remote: NameAddr,
    /// The dialed identity, with our tag
    pub local: NameAddr,
    pub remote_target: SipUri,
    /// Where the caller's requests come from; responses and BYEs go here
    pub source: SocketAddr,
    pub invite: Request,
    pub invite_cseq: u32,
    local_cseq: u32,
    /// Last response sent to the INVITE, for retransmissions
    pub last_response: Option<Response>,
}

impl UasDialog {
    pub fn from_invite(invite: &Request, source: SocketAddr) -> Result<Self, ParseError> {
        let remote = invite.from_addr()?;
        let local = invite.to_addr()?.with_tag(new_tag());
        let remote_target = invite
            .contact()
            .map(|c| c.uri)
            .unwrap_or_else(|| remote.uri.clone());
        Ok(Self {
            call_id: invite.call_id()?.to_string(),
            remote,
            local,
            remote_target,
            source,
            invite: invite.clone(),
            invite_cseq: invite.cseq()?.seq,
            local_cseq: 0,
            last_response: None,
        })
    }

    pub fn local_tag(&self) -> &str {
        self.local.tag().unwrap_or_default()
    }

    /// Response to the dialog-creating INVITE
    pub fn invite_response(&self, status: StatusCode) -> SimpleResponseBuilder {
        let builder = SimpleResponseBuilder::response_to(&self.invite, status);
        if status == StatusCode::Trying {
            builder
        } else {
            builder.to_tag(self.local_tag())
        }
    }

    /// Response to any request inside this dialog
    pub fn response_to(&self, request: &Request, status: StatusCode) -> SimpleResponseBuilder {
        SimpleResponseBuilder::response_to(request, status).to_tag(self.local_tag())
    }

    pub fn bye(&mut self, endpoint: &LocalEndpoint) -> Request {
        self.local_cseq += 1;
        SimpleRequestBuilder::new(Method::Bye, self.remote_target.clone())
            .via(endpoint.via())
            .from(&self.local)
            .to(&self.remote)
            .call_id(self.call_id.clone())
            .cseq(self.local_cseq.max(1))
            .user_agent(endpoint.user_agent.clone())
            .build()
    }
}

/// A dialog originated by the switchboard toward an extension
#[derive(Debug, Clone)]
pub struct UacDialog {
    pub call_id: String,
    pub local: NameAddr,
    /// The callee; gains its tag from the first tagged response
    pub remote: NameAddr,
    pub remote_target: SipUri,
    pub destination: SocketAddr,
    pub invite: Request,
    cseq: u32,
}

impl UacDialog {
    /// Build the INVITE for a new outbound dialog carrying `offer`
    pub fn invite(
        endpoint: &LocalEndpoint,
        caller: &NameAddr,
        target: SipUri,
        destination: SocketAddr,
        offer: String,
    ) -> Self {
        let call_id = endpoint.new_call_id();
        let mut local_uri = caller.uri.clone();
        local_uri.host = endpoint.host.clone();
        local_uri.port = Some(endpoint.port);
        let local = NameAddr {
            display_name: caller.display_name.clone(),
            uri: local_uri,
            params: Vec::new(),
        }
        .with_tag(new_tag());
        let remote = NameAddr::new(target.clone());

        let invite = SimpleRequestBuilder::new(Method::Invite, target.clone())
            .via(endpoint.via())
            .from(&local)
            .to(&remote)
            .call_id(call_id.clone())
            .cseq(1)
            .contact(&endpoint.contact(caller.user()))
            .user_agent(endpoint.user_agent.clone())
            .body(CONTENT_TYPE_SDP, Bytes::from(offer))
            .build();

        Self {
            call_id,
            local,
            remote,
            remote_target: target,
            destination,
            invite,
            cseq: 1,
        }
    }

    pub fn invite_cseq(&self) -> u32 {
        1
    }

    /// Learn the remote tag and target from a response to the INVITE
    pub fn on_response(&mut self, response: &Response) {
        if let Ok(to) = response.to_addr() {
            if to.tag().is_some() {
                self.remote = to;
            }
        }
        if response.status.is_success() {
            if let Some(contact) = response.contact() {
                self.remote_target = contact.uri;
            }
        }
    }

    /// ACK for a 2xx: a new transaction to the remote target
    pub fn ack(&self, endpoint: &LocalEndpoint) -> Request {
        let mut ack = SimpleRequestBuilder::new(Method::Ack, self.remote_target.clone())
            .via(endpoint.via())
            .from(&self.local)
            .to(&self.remote)
            .call_id(self.call_id.clone())
            .user_agent(endpoint.user_agent.clone())
            .build();
        ack.set_header(HeaderName::CSeq, CSeq::new(self.invite_cseq(), Method::Ack).to_string());
        ack
    }

    /// ACK for a failure response: part of the INVITE transaction
    pub fn ack_failure(&self, response: &Response) -> Request {
        let mut ack = Request::new(Method::Ack, self.invite.uri.clone());
        if let Some(via) = self.invite.header(&HeaderName::Via) {
            ack.push_header(HeaderName::Via, via);
        }
        ack.push_header(HeaderName::MaxForwards, "70");
        ack.push_header(HeaderName::From, self.local.to_string());
        let to = response
            .header(&HeaderName::To)
            .map(str::to_string)
            .unwrap_or_else(|| self.remote.to_string());
        ack.push_header(HeaderName::To, to);
        ack.push_header(HeaderName::CallId, self.call_id.clone());
        ack.push_header(HeaderName::CSeq, CSeq::new(self.invite_cseq(), Method::Ack).to_string());
        ack
    }

    /// CANCEL matching the pending INVITE
    pub fn cancel(&self) -> Request {
        let mut cancel = Request::new(Method::Cancel, self.invite.uri.clone());
        for name in [HeaderName::Via, HeaderName::From, HeaderName::To, HeaderName::CallId] {
            if let Some(value) = self.invite.header(&name) {
                cancel.push_header(name, value);
            }
        }
        cancel.push_header(HeaderName::MaxForwards, "70");
        cancel.push_header(HeaderName::CSeq, CSeq::new(self.invite_cseq(), Method::Cancel).to_string());
        cancel
    }

    pub fn bye(&mut self, endpoint: &LocalEndpoint) -> Request {
        self.cseq += 1;
        SimpleRequestBuilder::new(Method::Bye, self.remote_target.clone())
            .via(endpoint.via())
            .from(&self.local)
            .to(&self.remote)
            .call_id(self.call_id.clone())
            .cseq(self.cseq)
            .user_agent(endpoint.user_agent.clone())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_sip_core::parse_message;
    use switchboard_sip_core::types::Message;

    fn endpoint() -> LocalEndpoint {
        LocalEndpoint::new("10.0.0.1:5060".parse().unwrap(), "switchboard")
    }

    fn request(raw: &str) -> Request {
        match parse_message(raw.as_bytes()).unwrap() {
            Message::Request(r) => r,
            Message::Response(_) => panic!("expected request"),
        }
    }

    fn response(raw: &str) -> Response {
        match parse_message(raw.as_bytes()).unwrap() {
            Message::Response(r) => r,
            Message::Request(_) => panic!("expected response"),
        }
    }

    const INVITE: &str = "INVITE sip:0@pbx SIP/2.0\r\n\
        Via: SIP/2.0/UDP 10.0.0.5:5060;branch=z9hG4bKa\r\n\
        From: \"Alice\" <sip:1001@pbx>;tag=caller\r\n\
        To: <sip:0@pbx>\r\n\
        Call-ID: c1@10.0.0.5\r\n\
        CSeq: 7 INVITE\r\n\
        Contact: <sip:1001@10.0.0.5:5062>\r\n\r\n";

    #[test]
    fn uas_dialog_from_invite() {
        let invite = request(INVITE);
        let mut dialog = UasDialog::from_invite(&invite, "10.0.0.5:5060".parse().unwrap()).unwrap();
        assert_eq!(dialog.call_id, "c1@10.0.0.5");
        assert_eq!(dialog.invite_cseq, 7);
        assert_eq!(dialog.remote.tag(), Some("caller"));
        assert_eq!(dialog.remote_target.port, Some(5062));

        let trying = dialog.invite_response(StatusCode::Trying).build();
        assert_eq!(trying.to_addr().unwrap().tag(), None);
        let ok = dialog.invite_response(StatusCode::Ok).build();
        assert_eq!(ok.to_addr().unwrap().tag(), Some(dialog.local_tag()));

        let bye = dialog.bye(&endpoint());
        assert_eq!(bye.method, Method::Bye);
        assert_eq!(bye.to_addr().unwrap().tag(), Some("caller"));
        assert_eq!(bye.from_addr().unwrap().tag(), Some(dialog.local_tag()));
        assert_eq!(bye.cseq().unwrap(), CSeq::new(1, Method::Bye));
        assert_eq!(dialog.bye(&endpoint()).cseq().unwrap().seq, 2);
    }

    #[test]
    fn uac_dialog_requests() {
        let caller: NameAddr = "\"Alice\" <sip:1001@pbx>;tag=caller".parse().unwrap();
        let target: SipUri = "sip:1002@10.0.0.9:5060".parse().unwrap();
        let mut dialog = UacDialog::invite(
            &endpoint(),
            &caller,
            target,
            "10.0.0.9:5060".parse().unwrap(),
            "v=0\r\n".to_string(),
        );
        assert_eq!(dialog.invite.method, Method::Invite);
        assert_eq!(dialog.invite.content_type(), Some(CONTENT_TYPE_SDP));
        assert_ne!(dialog.local.tag(), Some("caller"));
        assert_eq!(dialog.local.uri.host, "10.0.0.1");

        let cancel = dialog.cancel();
        assert_eq!(cancel.via().unwrap().branch(), dialog.invite.via().unwrap().branch());
        assert_eq!(cancel.cseq().unwrap(), CSeq::new(1, Method::Cancel));

        let ok = response(&format!(
            "SIP/2.0 200 OK\r\n\
             Via: {}\r\n\
             From: {}\r\n\
             To: <sip:1002@10.0.0.9:5060>;tag=callee\r\n\
             Call-ID: {}\r\n\
             CSeq: 1 INVITE\r\n\
             Contact: <sip:1002@10.0.0.9:5080>\r\n\r\n",
            dialog.invite.header(&HeaderName::Via).unwrap(),
            dialog.local,
            dialog.call_id
        ));
        dialog.on_response(&ok);
        assert_eq!(dialog.remote.tag(), Some("callee"));
        assert_eq!(dialog.remote_target.port, Some(5080));

        let ack = dialog.ack(&endpoint());
        assert_eq!(ack.cseq().unwrap(), CSeq::new(1, Method::Ack));
        assert_ne!(ack.via().unwrap().branch(), dialog.invite.via().unwrap().branch());
        assert_eq!(ack.to_addr().unwrap().tag(), Some("callee"));

        let bye = dialog.bye(&endpoint());
        assert_eq!(bye.cseq().unwrap(), CSeq::new(2, Method::Bye));
        assert_eq!(bye.uri.port, Some(5080));
    }

    #[test]
    fn failure_ack_reuses_invite_branch() {
        let caller: NameAddr = "<sip:1001@pbx>;tag=caller".parse().unwrap();
        let dialog = UacDialog::invite(
            &endpoint(),
            &caller,
            "sip:1002@10.0.0.9".parse().unwrap(),
            "10.0.0.9:5060".parse().unwrap(),
            String::new(),
        );
        let busy = response(&format!(
            "SIP/2.0 486 Busy Here\r\n\
             Via: {}\r\n\
             From: {}\r\n\
             To: <sip:1002@10.0.0.9>;tag=busy\r\n\
             Call-ID: {}\r\n\
             CSeq: 1 INVITE\r\n\r\n",
            dialog.invite.header(&HeaderName::Via).unwrap(),
            dialog.local,
            dialog.call_id
        ));
        let ack = dialog.ack_failure(&busy);
        assert_eq!(ack.via().unwrap().branch(), dialog.invite.via().unwrap().branch());
        assert_eq!(ack.to_addr().unwrap().tag(), Some("busy"));
    }
}
