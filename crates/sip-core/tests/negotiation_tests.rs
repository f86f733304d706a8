use proptest::prelude::*;
use switchboard_sip_core::prelude::*;

proptest! {
    #[test]
    fn non_empty_offer_is_answered_unchanged(offer in prop::collection::vec(0u8..128, 1..12)) {
        let negotiator = CodecNegotiator::new(101);
        prop_assert_eq!(negotiator.negotiate(&offer), offer);
    }

    #[test]
    fn device_filter_is_an_order_preserving_subset(
        offer in prop::collection::vec(0u8..20, 1..10),
        allowed in prop::collection::vec(0u8..20, 0..5),
    ) {
        let profile = DeviceProfile::new("phone", allowed.clone());
        let filtered = filter_for_device(&offer, &profile, None);
        // subsequence of the offer
        let mut it = offer.iter();
        for pt in &filtered {
            prop_assert!(it.any(|o| o == pt));
            prop_assert!(allowed.contains(pt));
        }
    }
}

#[test]
fn scenario_offer_8_9_0() {
    let negotiator = CodecNegotiator::new(101);
    assert_eq!(negotiator.negotiate(&[8, 9, 0]), vec![8, 9, 0]);
    assert_eq!(negotiator.negotiate(&[]), negotiator.default_codecs().to_vec());
}

#[test]
fn sdp_answer_through_message_codec() {
    let offer_body = "v=0\r\no=- 9 9 IN IP4 192.0.2.20\r\ns=-\r\nc=IN IP4 192.0.2.20\r\nt=0 0\r\n\
                      m=audio 30000 RTP/AVP 8 9 0 101\r\na=rtpmap:101 telephone-event/8000\r\n";
    let raw = format!(
        "INVITE sip:*97@pbx SIP/2.0\r\n\
         Via: SIP/2.0/UDP 192.0.2.20:5060;branch=z9hG4bKp1\r\n\
         From: <sip:1001@pbx>;tag=t1\r\n\
         To: <sip:*97@pbx>\r\n\
         Call-ID: neg@192.0.2.20\r\n\
         CSeq: 1 INVITE\r\n\
         Content-Type: application/sdp\r\n\
         Content-Length: {}\r\n\r\n{}",
        offer_body.len(),
        offer_body
    );
    let Message::Request(invite) = parse_message(raw.as_bytes()).unwrap() else {
        panic!("expected request");
    };
    let offer = parse_sdp(std::str::from_utf8(&invite.body).unwrap()).unwrap();
    let codecs = CodecNegotiator::new(101).negotiate(&offer.audio_codecs());
    let answer = build_answer(&offer, &codecs, "198.51.100.1:10000".parse().unwrap(), 1);

    let response = SimpleResponseBuilder::response_to(&invite, StatusCode::Ok)
        .to_tag(&new_tag())
        .body(CONTENT_TYPE_SDP, answer.to_string())
        .build();
    let Message::Response(parsed) = parse_message(&response.to_bytes()).unwrap() else {
        panic!("expected response");
    };
    let answered = parse_sdp(std::str::from_utf8(&parsed.body).unwrap()).unwrap();
    assert_eq!(answered.audio_codecs(), vec![8, 9, 0, 101]);
    assert_eq!(answered.telephone_event(), Some(101));
}
