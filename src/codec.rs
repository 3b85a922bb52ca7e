//! Datagram payloads exchanged between remote and vehicle.
//!
//! A payload is either the JSON encoding of a [`ControlState`] or the
//! keepalive sentinel. Decoding is strict: unknown fields, wrong types and
//! trailing bytes are all rejected.

use crate::error::CodecError;
use crate::state::ControlState;

pub const KEEPALIVE: &[u8] = b"KEEPALIVE";

/// Largest payload a single UDP datagram can carry here.
pub const MAX_DATAGRAM: usize = 65536;

#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    State(ControlState),
    Keepalive,
}

pub fn encode(state: &ControlState) -> Result<Vec<u8>, CodecError> {
    let bytes = serde_json::to_vec(state)?;
    if bytes.len() > MAX_DATAGRAM {
        return Err(CodecError::TooLarge(bytes.len()));
    }
    Ok(bytes)
}

pub fn decode(payload: &[u8]) -> Result<Datagram, CodecError> {
    if payload == KEEPALIVE {
        return Ok(Datagram::Keepalive);
    }
    if payload.len() > MAX_DATAGRAM {
        return Err(CodecError::TooLarge(payload.len()));
    }
    Ok(Datagram::State(serde_json::from_slice(payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_sentinel() {
        assert_eq!(decode(b"KEEPALIVE").unwrap(), Datagram::Keepalive);
    }

    #[test]
    fn state_survives_the_wire() {
        let state = ControlState {
            record: true,
            timestamp: Some(chrono::Utc::now()),
            ..ControlState::new(0.13, 0.0, 1.0)
        };
        let bytes = encode(&state).unwrap();
        assert_eq!(decode(&bytes).unwrap(), Datagram::State(state));
    }

    #[test]
    fn flags_default_to_false() {
        let decoded = decode(br#"{"steering":0.5,"brake":-1.0,"accelerator":-1.0}"#).unwrap();
        assert_eq!(decoded, Datagram::State(ControlState::new(0.5, -1.0, -1.0)));
    }

    #[test]
    fn missing_axis_decodes_as_incomplete() {
        let decoded = decode(br#"{"steering":0.5,"brake":null}"#).unwrap();
        match decoded {
            Datagram::State(state) => assert!(!state.is_complete()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = decode(br#"{"steering":0.5,"brake":0,"accelerator":0,"turbo":true}"#);
        assert!(matches!(err, Err(CodecError::Malformed(_))));
    }

    #[test]
    fn rejects_wrong_types_and_garbage() {
        assert!(decode(br#"{"steering":"left"}"#).is_err());
        assert!(decode(b"{'steering': 0.5}").is_err());
        assert!(decode(b"").is_err());
        assert!(decode(b"KEEPALIVE\n").is_err());
    }

    #[test]
    fn rejects_truncated_payload() {
        let bytes = encode(&ControlState::new(0.1, 0.2, 0.3)).unwrap();
        assert!(decode(&bytes[..bytes.len() - 1]).is_err());
    }
}
