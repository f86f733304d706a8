//! Codec facts and G.711 sample conversion.

pub mod g711;
pub mod mapping;

pub use g711::G711Variant;
pub use mapping::{codec_info, codec_info_or_default, CodecInfo};

/// Decode a relayed payload to linear PCM when the codec is G.711.
///
/// Other codecs return `None`; the in-band detector simply skips them.
pub fn decode_to_linear(payload_type: u8, payload: &[u8]) -> Option<Vec<i16>> {
    G711Variant::from_payload_type(payload_type).map(|v| v.decode(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_g711_decodes() {
        assert_eq!(decode_to_linear(0, &[0xFF, 0xFF]), Some(vec![0, 0]));
        assert_eq!(decode_to_linear(8, &[0xD5]), Some(vec![8]));
        assert!(decode_to_linear(18, &[1, 2, 3]).is_none());
    }
}
