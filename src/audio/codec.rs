//! PCM16 little-endian framing for audio exchanged with the remote agent

use base64::Engine;

use crate::error::EngineError;

/// Encode samples as little-endian PCM16 bytes
pub fn encode_pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Decode a little-endian PCM16 audio fragment
///
/// Fragments must be non-empty and hold a whole number of samples.
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<i16>, EngineError> {
    if bytes.is_empty() {
        return Err(EngineError::Decode("empty audio fragment".to_string()));
    }
    if bytes.len() % 2 != 0 {
        return Err(EngineError::Decode(format!(
            "fragment length {} is not a whole number of 16-bit samples",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

pub fn to_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn from_base64(data: &str) -> Result<Vec<u8>, EngineError> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| EngineError::Decode(format!("invalid base64 audio: {}", e)))
}

/// Serde adapter storing byte buffers as base64 strings
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_base64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        super::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_little_endian_samples() {
        let samples = decode_pcm16(&[0x01, 0x00, 0xff, 0xff, 0x00, 0x80]).unwrap();
        assert_eq!(samples, vec![1, -1, i16::MIN]);
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        let err = decode_pcm16(&[0x01, 0x00, 0x02]).unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
    }

    #[test]
    fn test_decode_rejects_empty_fragment() {
        assert!(matches!(decode_pcm16(&[]), Err(EngineError::Decode(_))));
    }

    #[test]
    fn test_invalid_base64_is_decode_failure() {
        assert!(matches!(from_base64("not base64!"), Err(EngineError::Decode(_))));
    }

    #[test]
    fn test_encode_matches_decode_layout() {
        let bytes = encode_pcm16(&[256, -2]);
        assert_eq!(bytes, vec![0x00, 0x01, 0xfe, 0xff]);
    }
}
