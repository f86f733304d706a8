//! G.711 sample conversion
//!
//! G.711 is an ITU-T standard for audio companding, primarily used in telephony.
//! It has two main variants:
//! - μ-law (PCMU, used in North America and Japan)
//! - A-law (PCMA, used in Europe and the rest of the world)
//!
//! The relay never transcodes; these conversions exist so the in-band tone
//! detector can look at relayed audio, and so tests can synthesize it.

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32635;

/// G.711 codec variant (μ-law or A-law)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum G711Variant {
    /// μ-law (PCMU, payload type 0)
    PCMU,
    /// A-law (PCMA, payload type 8)
    PCMA,
}

impl G711Variant {
    pub fn payload_type(&self) -> u8 {
        match self {
            G711Variant::PCMU => 0,
            G711Variant::PCMA => 8,
        }
    }

    pub fn from_payload_type(pt: u8) -> Option<Self> {
        match pt {
            0 => Some(G711Variant::PCMU),
            8 => Some(G711Variant::PCMA),
            _ => None,
        }
    }

    pub fn decode(&self, encoded: &[u8]) -> Vec<i16> {
        match self {
            G711Variant::PCMU => encoded.iter().map(|b| decode_ulaw(*b)).collect(),
            G711Variant::PCMA => encoded.iter().map(|b| decode_alaw(*b)).collect(),
        }
    }

    pub fn encode(&self, samples: &[i16]) -> Vec<u8> {
        match self {
            G711Variant::PCMU => samples.iter().map(|s| encode_ulaw(*s)).collect(),
            G711Variant::PCMA => samples.iter().map(|s| encode_alaw(*s)).collect(),
        }
    }
}

/// Encode a 16-bit linear sample to μ-law
pub fn encode_ulaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0
    };
    pcm = pcm.min(ULAW_CLIP) + ULAW_BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !(sign | (exponent << 4) as i32 | mantissa) as u8
}

/// Decode a μ-law byte to a 16-bit linear sample
pub fn decode_ulaw(byte: u8) -> i16 {
    let u = !byte;
    let exponent = ((u >> 4) & 0x07) as i32;
    let mantissa = (u & 0x0F) as i32;
    let magnitude = (((mantissa << 3) + ULAW_BIAS) << exponent) - ULAW_BIAS;
    if u & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Encode a 16-bit linear sample to A-law
pub fn encode_alaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm >= 0 {
        0x80
    } else {
        pcm = -pcm - 1;
        0x00
    };
    pcm = pcm.min(0x7FFF) >> 3;

    let byte = if pcm < 32 {
        (pcm >> 1) as u8
    } else {
        let mut segment = 1;
        let mut value = pcm >> 5;
        while value > 1 && segment < 7 {
            value >>= 1;
            segment += 1;
        }
        let mantissa = (pcm >> segment) & 0x0F;
        ((segment << 4) | mantissa) as u8
    };
    (byte | sign) ^ 0x55
}

/// Decode an A-law byte to a 16-bit linear sample
pub fn decode_alaw(byte: u8) -> i16 {
    let a = byte ^ 0x55;
    let mut t = ((a & 0x0F) as i32) << 4;
    let segment = ((a & 0x70) >> 4) as i32;
    match segment {
        0 => t += 8,
        1 => t += 0x108,
        _ => {
            t += 0x108;
            t <<= segment - 1;
        }
    }
    if a & 0x80 != 0 {
        t as i16
    } else {
        -t as i16
    }
}
