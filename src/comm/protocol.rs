use crate::comm::error::CommError;
use crate::comm::types::{MsgType, RequestPayload};
use crate::envelope::ResultEnvelope;
use rmp_serde::decode::Deserializer;
use rmp_serde::encode::Serializer;
use serde::Deserialize;
use std::io::Cursor;
use std::result::Result as StdResult;

/// Header length: type (1) + seq (4)
pub const HEADER_LEN: usize = 5;

/// Encode a packet with given type, sequence, and payload.
///
/// Structs are written as maps so optional fields may be omitted.
pub fn encode_packet(
    msg_type: MsgType,
    seq: u32,
    payload: Option<&impl serde::Serialize>,
) -> StdResult<Vec<u8>, CommError> {
    let mut buf = Vec::new();

    buf.push(msg_type as u8);
    buf.extend_from_slice(&seq.to_be_bytes());

    if let Some(p) = payload {
        let mut ser = Serializer::new(&mut buf).with_struct_map();
        p.serialize(&mut ser)
            .map_err(|e| CommError::EncodeError(e.to_string()))?;
    }

    Ok(buf)
}

/// Decode packet type and seq from raw bytes
pub fn decode_header(data: &[u8]) -> StdResult<(MsgType, u32), CommError> {
    if data.len() < HEADER_LEN {
        return Err(CommError::DecodeError("Packet too short".to_string()));
    }

    let msg_type = MsgType::from_u8(data[0])
        .ok_or_else(|| CommError::DecodeError(format!("Unknown msg type: {}", data[0])))?;

    let seq = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((msg_type, seq))
}

pub fn decode_request_payload(data: &[u8]) -> StdResult<RequestPayload, CommError> {
    let mut de = Deserializer::new(Cursor::new(data));
    RequestPayload::deserialize(&mut de).map_err(|e| CommError::DecodeError(e.to_string()))
}

#[allow(dead_code)]
pub fn decode_response_payload(data: &[u8]) -> StdResult<ResultEnvelope, CommError> {
    let mut de = Deserializer::new(Cursor::new(data));
    ResultEnvelope::deserialize(&mut de).map_err(|e| CommError::DecodeError(e.to_string()))
}

/// Encode request ack (no payload)
pub fn encode_request_ack(seq: u32) -> StdResult<Vec<u8>, CommError> {
    encode_packet(MsgType::RequestAck, seq, None::<&()>)
}

pub fn encode_response(seq: u32, envelope: &ResultEnvelope) -> StdResult<Vec<u8>, CommError> {
    encode_packet(MsgType::Response, seq, Some(envelope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Operation, ScanConfig};
    use serde_json::json;

    fn request(operation: Operation) -> RequestPayload {
        RequestPayload { operation }
    }

    #[test]
    fn test_request_encode_decode() {
        let payload = request(Operation::Check(ScanConfig {
            profile: Some("strict".to_string()),
            categories: vec!["ssh".to_string()],
            rules: vec![],
        }));

        let packet = encode_packet(MsgType::Request, 1, Some(&payload)).unwrap();
        let (decoded_type, decoded_seq) = decode_header(&packet).unwrap();

        assert_eq!(decoded_type, MsgType::Request);
        assert_eq!(decoded_seq, 1);

        let decoded = decode_request_payload(&packet[HEADER_LEN..]).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_request_ack_no_payload() {
        let packet = encode_request_ack(42).unwrap();

        assert_eq!(packet.len(), HEADER_LEN);
        let (msg_type, seq) = decode_header(&packet).unwrap();
        assert_eq!(msg_type, MsgType::RequestAck);
        assert_eq!(seq, 42);
    }

    #[test]
    fn test_success_envelope_without_error_field() {
        let envelope = ResultEnvelope::ok(json!({"summary": {"total": 5}}));

        let packet = encode_response(7, &envelope).unwrap();
        let (decoded_type, decoded_seq) = decode_header(&packet).unwrap();
        assert_eq!(decoded_type, MsgType::Response);
        assert_eq!(decoded_seq, 7);

        let decoded = decode_response_payload(&packet[HEADER_LEN..]).unwrap();
        assert_eq!(decoded, envelope);
        assert!(decoded.error.is_none());
    }

    #[test]
    fn test_failure_envelope_keeps_raw_stdout() {
        let envelope =
            ResultEnvelope::failure_with_data("No JSON found in output", json!("plain text"));

        let packet = encode_response(1, &envelope).unwrap();
        let decoded = decode_response_payload(&packet[HEADER_LEN..]).unwrap();

        assert!(!decoded.success);
        assert_eq!(decoded.error.as_deref(), Some("No JSON found in output"));
        assert_eq!(decoded.data, Some(json!("plain text")));
    }

    #[test]
    fn test_settings_patch_survives_encoding() {
        let payload = request(Operation::SaveSettings(json!({
            "ssh": {"enabled": true, "host": "10.0.0.5", "port": 2222}
        })));

        let packet = encode_packet(MsgType::Request, 3, Some(&payload)).unwrap();
        let decoded = decode_request_payload(&packet[HEADER_LEN..]).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_unit_operation_encoding() {
        let payload = request(Operation::ListRules);
        let packet = encode_packet(MsgType::Request, 1, Some(&payload)).unwrap();
        let decoded = decode_request_payload(&packet[HEADER_LEN..]).unwrap();
        assert_eq!(decoded.operation, Operation::ListRules);
    }

    #[test]
    fn test_garbage_payload_rejected() {
        let result = decode_request_payload(&[0xc1, 0x00, 0x13]);
        assert!(matches!(result, Err(CommError::DecodeError(_))));
    }

    #[test]
    fn test_invalid_msg_type() {
        let mut packet = vec![0xFFu8];
        packet.extend_from_slice(&1u32.to_be_bytes());

        let result = decode_header(&packet);
        assert!(matches!(result, Err(CommError::DecodeError(_))));
    }

    #[test]
    fn test_truncated_packet() {
        assert!(decode_header(&[0x01, 0x00, 0x00]).is_err());
        assert!(decode_header(&[0x01, 0x00, 0x00, 0x00, 0x01]).is_ok());
    }

    #[test]
    fn test_seq_boundary_values() {
        let packet = encode_request_ack(0).unwrap();
        assert_eq!(decode_header(&packet).unwrap().1, 0);

        let packet = encode_request_ack(u32::MAX).unwrap();
        assert_eq!(decode_header(&packet).unwrap().1, u32::MAX);

        // Big-endian: 256 = 0x00000100
        let packet = encode_request_ack(256).unwrap();
        assert_eq!([packet[1], packet[2], packet[3], packet[4]], [0x00, 0x00, 0x01, 0x00]);
    }
}
