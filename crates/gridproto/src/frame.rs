use bytes::Bytes;

use crate::ProtoError;
use crate::position::{POSITION2D_SIZE, Position2D};
use crate::session::SessionId;

/// Transport header: session id (16 bytes) + sequence number (u32 big-endian).
pub const HEADER_SIZE: usize = SessionId::LEN + 4;

/// Payload header: data type + sub type, one byte each.
pub const PAYLOAD_HEADER_SIZE: usize = 2;

pub const DATA_TYPE_CONTROL: u8 = 0x01;
pub const DATA_TYPE_INPUT: u8 = 0x02;
pub const DATA_TYPE_ACTOR: u8 = 0x03;

pub const CONTROL_JOIN: u8 = 1;
pub const CONTROL_LEAVE: u8 = 2;
pub const CONTROL_ASSIGN: u8 = 3;

pub const KEY_UP: u8 = 0x01;
pub const KEY_DOWN: u8 = 0x02;
pub const KEY_LEFT: u8 = 0x04;
pub const KEY_RIGHT: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub session: SessionId,
    pub seq: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    pub data_type: u8,
    pub sub_type: u8,
}

pub fn parse_header(p: &[u8]) -> Result<FrameHeader, ProtoError> {
    if p.len() < HEADER_SIZE {
        return Err(ProtoError::TooShort {
            need: HEADER_SIZE,
            got: p.len(),
        });
    }
    let mut sid = [0u8; 16];
    sid.copy_from_slice(&p[..SessionId::LEN]);
    let seq = u32::from_be_bytes([
        p[SessionId::LEN],
        p[SessionId::LEN + 1],
        p[SessionId::LEN + 2],
        p[SessionId::LEN + 3],
    ]);
    Ok(FrameHeader {
        session: SessionId::from_bytes(sid),
        seq,
    })
}

/// Parses the payload header from the bytes immediately after the transport
/// header (`&frame[HEADER_SIZE..]`).
pub fn parse_payload_header(p: &[u8]) -> Result<PayloadHeader, ProtoError> {
    if p.len() < PAYLOAD_HEADER_SIZE {
        return Err(ProtoError::TooShort {
            need: PAYLOAD_HEADER_SIZE,
            got: p.len(),
        });
    }
    Ok(PayloadHeader {
        data_type: p[0],
        sub_type: p[1],
    })
}

fn frame_with_headers(session: SessionId, seq: u32, data_type: u8, sub_type: u8, body: &[u8]) -> Bytes {
    let mut b = Vec::with_capacity(HEADER_SIZE + PAYLOAD_HEADER_SIZE + body.len());
    b.extend_from_slice(&session.to_bytes());
    b.extend_from_slice(&seq.to_be_bytes());
    b.push(data_type);
    b.push(sub_type);
    b.extend_from_slice(body);
    Bytes::from(b)
}

pub fn encode_control(session: SessionId, seq: u32, sub_type: u8) -> Bytes {
    frame_with_headers(session, seq, DATA_TYPE_CONTROL, sub_type, &[])
}

pub fn encode_input(session: SessionId, seq: u32, key_mask: u8) -> Bytes {
    frame_with_headers(session, seq, DATA_TYPE_INPUT, 0, &[key_mask])
}

/// Parses an input body (the bytes after both headers) into its key mask.
pub fn parse_input(body: &[u8]) -> Result<u8, ProtoError> {
    if body.is_empty() {
        return Err(ProtoError::TooShort { need: 1, got: 0 });
    }
    Ok(body[0])
}

/// Encodes the per-tick actor snapshot: count (u16 BE), then for each actor
/// its session id and position.
pub fn encode_actor_frame(session: SessionId, seq: u32, actors: &[(SessionId, Position2D)]) -> Bytes {
    let mut body = Vec::with_capacity(2 + actors.len() * (SessionId::LEN + POSITION2D_SIZE));
    let count = actors.len().min(u16::MAX as usize) as u16;
    body.extend_from_slice(&count.to_be_bytes());
    for (sid, pos) in actors.iter().take(count as usize) {
        body.extend_from_slice(&sid.to_bytes());
        body.extend_from_slice(&pos.encode());
    }
    frame_with_headers(session, seq, DATA_TYPE_ACTOR, 0, &body)
}

/// Parses an actor body (the bytes after both headers).
pub fn parse_actor_frame(body: &[u8]) -> Result<Vec<(SessionId, Position2D)>, ProtoError> {
    if body.len() < 2 {
        return Err(ProtoError::TooShort {
            need: 2,
            got: body.len(),
        });
    }
    let count = u16::from_be_bytes([body[0], body[1]]) as usize;
    let need = 2 + count * (SessionId::LEN + POSITION2D_SIZE);
    if body.len() < need {
        return Err(ProtoError::TooShort {
            need,
            got: body.len(),
        });
    }
    let mut actors = Vec::with_capacity(count);
    let mut i = 2;
    for _ in 0..count {
        let mut sid = [0u8; 16];
        sid.copy_from_slice(&body[i..i + SessionId::LEN]);
        i += SessionId::LEN;
        let pos = Position2D::parse(&body[i..i + POSITION2D_SIZE])?;
        i += POSITION2D_SIZE;
        actors.push((SessionId::from_bytes(sid), pos));
    }
    Ok(actors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_frame_layout() {
        let sid = SessionId::generate();
        let frame = encode_control(sid, 7, CONTROL_JOIN);
        assert_eq!(frame.len(), HEADER_SIZE + PAYLOAD_HEADER_SIZE);

        let header = parse_header(&frame).unwrap();
        assert_eq!(header.session, sid);
        assert_eq!(header.seq, 7);

        let payload = parse_payload_header(&frame[HEADER_SIZE..]).unwrap();
        assert_eq!(payload.data_type, DATA_TYPE_CONTROL);
        assert_eq!(payload.sub_type, CONTROL_JOIN);
    }

    #[test]
    fn header_too_short() {
        assert!(matches!(
            parse_header(&[0u8; 4]),
            Err(ProtoError::TooShort { need, got: 4 }) if need == HEADER_SIZE
        ));
        assert!(parse_payload_header(&[]).is_err());
    }

    #[test]
    fn input_carries_key_mask() {
        let sid = SessionId::generate();
        let frame = encode_input(sid, 1, KEY_UP | KEY_RIGHT);
        let mask = parse_input(&frame[HEADER_SIZE + PAYLOAD_HEADER_SIZE..]).unwrap();
        assert_eq!(mask, KEY_UP | KEY_RIGHT);
    }

    #[test]
    fn actor_frame_round_trip() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        let actors = vec![
            (a, Position2D::new(1.0, 2.0)),
            (b, Position2D::new(-3.5, 0.25)),
        ];
        let frame = encode_actor_frame(SessionId::NIL, 42, &actors);
        let decoded = parse_actor_frame(&frame[HEADER_SIZE + PAYLOAD_HEADER_SIZE..]).unwrap();
        assert_eq!(decoded, actors);
    }

    #[test]
    fn actor_frame_truncated_body() {
        let actors = vec![(SessionId::generate(), Position2D::new(1.0, 1.0))];
        let frame = encode_actor_frame(SessionId::NIL, 0, &actors);
        let body = &frame[HEADER_SIZE + PAYLOAD_HEADER_SIZE..];
        assert!(parse_actor_frame(&body[..body.len() - 1]).is_err());
    }
}
