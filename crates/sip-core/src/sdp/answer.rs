//! Construction of SDP offers and answers for the relay's local sockets.

use std::net::SocketAddr;

use crate::sdp::types::{
    static_payload, Connection, Direction, Fmtp, MediaDescription, Origin, RtpMap,
    SessionDescription, TELEPHONE_EVENT,
};

const DEFAULT_PTIME: u32 = 20;

fn session(local: SocketAddr, session_id: u64, media: MediaDescription) -> SessionDescription {
    SessionDescription {
        origin: Origin {
            username: "switchboard".to_string(),
            session_id,
            session_version: session_id,
            address: local.ip(),
        },
        session_name: "switchboard".to_string(),
        connection: Some(Connection {
            address: local.ip(),
        }),
        media: vec![media],
    }
}

/// Answer `offer` with exactly `codecs`, in that order.
///
/// Attribute lines are copied from the offer where it described a payload
/// type; static types fall back to the well-known names and dynamic
/// telephone-event gets a `0-16` fmtp if the offer carried none.
pub fn build_answer(
    offer: &SessionDescription,
    codecs: &[u8],
    local: SocketAddr,
    session_id: u64,
) -> SessionDescription {
    let offered = offer.audio();
    let mut media = MediaDescription::audio(local.port(), codecs.to_vec());

    for &pt in codecs {
        let rtpmap = offered
            .and_then(|m| m.rtpmap(pt).cloned())
            .or_else(|| static_payload(pt).map(|(name, clock)| RtpMap::new(pt, name, clock)));
        if let Some(map) = rtpmap {
            let is_event = map.is_telephone_event();
            media.rtpmaps.push(map);
            match offered.and_then(|m| m.fmtp(pt)) {
                Some(fmtp) => media.fmtps.push(fmtp.clone()),
                None if is_event => media.fmtps.push(Fmtp {
                    payload_type: pt,
                    params: "0-16".to_string(),
                }),
                None => {}
            }
        }
    }

    media.ptime = offered.and_then(|m| m.ptime).or(Some(DEFAULT_PTIME));
    media.direction = Some(Direction::SendRecv);
    session(local, session_id, media)
}

/// Offer `codecs` from `local`, naming `dtmf_pt` as telephone-event
pub fn build_offer(codecs: &[u8], dtmf_pt: u8, local: SocketAddr, session_id: u64) -> SessionDescription {
    let mut media = MediaDescription::audio(local.port(), codecs.to_vec());
    for &pt in codecs {
        if pt == dtmf_pt {
            media.rtpmaps.push(RtpMap::new(pt, TELEPHONE_EVENT, 8000));
            media.fmtps.push(Fmtp {
                payload_type: pt,
                params: "0-16".to_string(),
            });
        } else if let Some((name, clock)) = static_payload(pt) {
            media.rtpmaps.push(RtpMap::new(pt, name, clock));
        }
    }
    media.ptime = Some(DEFAULT_PTIME);
    media.direction = Some(Direction::SendRecv);
    session(local, session_id, media)
}

/// Offer reusing another endpoint's offer attributes, as a B2BUA does when
/// forwarding a caller's codec list to the callee
pub fn build_forwarded_offer(
    original: &SessionDescription,
    local: SocketAddr,
    session_id: u64,
) -> SessionDescription {
    build_answer(original, &original.audio_codecs(), local, session_id)
}
