// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet-forwarder datagram codec.
//!
//! Every datagram starts with a 4-byte header:
//!
//! ```text
//! +---------+-------------+------+
//! | version | token (BE)  | type |
//! |   u8    |    u16      |  u8  |
//! +---------+-------------+------+
//! ```
//!
//! PUSH_DATA, PULL_DATA and TX_ACK follow it with the 8-byte big-endian
//! gateway id; PUSH_DATA then carries a JSON object. PULL_RESP carries JSON
//! right after the header. The acks carry nothing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Protocol version spoken and expected.
pub const PROTOCOL_VERSION: u8 = 2;

/// Header length in bytes.
pub const HEADER_LEN: usize = 4;

/// Gateway id length in bytes.
pub const GATEWAY_ID_LEN: usize = 8;

/// Codec errors.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Datagram truncated: {0} byte(s)")]
    Truncated(usize),

    #[error("Unknown message type: {0}")]
    UnknownType(u8),

    #[error("Invalid JSON body: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

/// Datagram type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    PushData = 0,
    PushAck = 1,
    PullData = 2,
    PullResp = 3,
    PullAck = 4,
    TxAck = 5,
}

impl MessageType {
    pub fn name(self) -> &'static str {
        match self {
            Self::PushData => "PUSH_DATA",
            Self::PushAck => "PUSH_ACK",
            Self::PullData => "PULL_DATA",
            Self::PullResp => "PULL_RESP",
            Self::PullAck => "PULL_ACK",
            Self::TxAck => "TX_ACK",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(v: u8) -> Result<Self, WireError> {
        Ok(match v {
            0 => Self::PushData,
            1 => Self::PushAck,
            2 => Self::PullData,
            3 => Self::PullResp,
            4 => Self::PullAck,
            5 => Self::TxAck,
            other => return Err(WireError::UnknownType(other)),
        })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Datagram header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub token: u16,
    pub kind: MessageType,
}

impl Header {
    pub fn new(token: u16, kind: MessageType) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            token,
            kind,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.version);
        buf.extend_from_slice(&self.token.to_be_bytes());
        buf.push(self.kind as u8);
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_LEN {
            return Err(WireError::Truncated(buf.len()));
        }
        Ok(Self {
            version: buf[0],
            token: u16::from_be_bytes([buf[1], buf[2]]),
            kind: MessageType::try_from(buf[3])?,
        })
    }
}

/// A datagram received from the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    PushAck,
    PullAck,
    /// Downlink request with its JSON object.
    PullResp(Value),
    /// A type the backend is not expected to send.
    Unexpected(MessageType),
}

/// Decode a datagram received from the backend.
pub fn decode(buf: &[u8]) -> Result<(Header, Datagram), WireError> {
    let header = Header::decode(buf)?;
    let datagram = match header.kind {
        MessageType::PushAck => Datagram::PushAck,
        MessageType::PullAck => Datagram::PullAck,
        MessageType::PullResp => Datagram::PullResp(serde_json::from_slice(&buf[HEADER_LEN..])?),
        other => Datagram::Unexpected(other),
    };
    Ok((header, datagram))
}

fn with_gateway(token: u16, kind: MessageType, gateway_id: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + GATEWAY_ID_LEN);
    Header::new(token, kind).encode(&mut buf);
    buf.extend_from_slice(&gateway_id.to_be_bytes());
    buf
}

/// PUSH_DATA with a JSON body.
pub fn encode_push_data<T: Serialize>(
    token: u16,
    gateway_id: u64,
    body: &T,
) -> Result<Vec<u8>, WireError> {
    let mut buf = with_gateway(token, MessageType::PushData, gateway_id);
    serde_json::to_writer(&mut buf, body)?;
    Ok(buf)
}

/// PULL_DATA keepalive.
pub fn encode_pull_data(token: u16, gateway_id: u64) -> Vec<u8> {
    with_gateway(token, MessageType::PullData, gateway_id)
}

/// TX_ACK without an error object.
pub fn encode_tx_ack(token: u16, gateway_id: u64) -> Vec<u8> {
    with_gateway(token, MessageType::TxAck, gateway_id)
}

/// PULL_RESP as a backend would send it.
pub fn encode_pull_resp<T: Serialize>(token: u16, body: &T) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::new();
    Header::new(token, MessageType::PullResp).encode(&mut buf);
    serde_json::to_writer(&mut buf, body)?;
    Ok(buf)
}

/// Received-packet record inside a PUSH_DATA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RxPk {
    /// UTC reception time, ISO 8601 with a `Z` suffix.
    pub time: String,
    /// Concentrator tick counter in microseconds.
    pub tmst: u32,
    pub chan: u32,
    pub rfch: u32,
    /// Frequency in MHz.
    pub freq: f64,
    pub stat: i32,
    pub modu: String,
    /// Datarate, e.g. `SF7BW125`.
    pub datr: String,
    pub codr: String,
    pub rssi: i32,
    pub lsnr: f64,
    pub size: usize,
    /// Base64 PHY payload.
    pub data: String,
}

/// PUSH_DATA body carrying uplinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RxPkBody {
    pub rxpk: Vec<RxPk>,
}

/// Gateway status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub time: String,
    pub lati: f64,
    pub long: f64,
    pub alti: i32,
    pub rxnb: u64,
    pub rxok: u64,
    pub rxfw: u64,
    /// Percentage of PUSH_DATA acknowledged.
    pub ackr: f64,
    pub dwnb: u64,
    pub txnb: u64,
}

/// PUSH_DATA body carrying gateway status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatBody {
    pub stat: Stat,
}

/// Transmit request inside a PULL_RESP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxPk {
    #[serde(default)]
    pub imme: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmst: Option<u32>,
    /// Frequency in MHz.
    pub freq: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rfch: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub powe: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modu: Option<String>,
    pub datr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipol: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    /// Base64 PHY payload.
    pub data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_layout() {
        let buf = encode_pull_data(0x1234, 0x0102_0304_0506_0708);
        assert_eq!(buf.len(), HEADER_LEN + GATEWAY_ID_LEN);
        assert_eq!(&buf[..4], &[2, 0x12, 0x34, MessageType::PullData as u8]);
        assert_eq!(&buf[4..], &[1, 2, 3, 4, 5, 6, 7, 8]);

        let header = Header::decode(&buf).unwrap();
        assert_eq!(header, Header::new(0x1234, MessageType::PullData));
    }

    #[test]
    fn test_push_data_body_follows_gateway_id() {
        let buf = encode_push_data(7, 1, &json!({"stat": {"rxnb": 0}})).unwrap();
        assert_eq!(buf[3], 0);
        let body: Value = serde_json::from_slice(&buf[12..]).unwrap();
        assert_eq!(body["stat"]["rxnb"], 0);
    }

    #[test]
    fn test_tx_ack() {
        let buf = encode_tx_ack(0xFFFF, 0xAB);
        assert_eq!(&buf[..4], &[2, 0xFF, 0xFF, 5]);
        assert_eq!(buf[11], 0xAB);
    }

    #[test]
    fn test_decode_acks() {
        let (h, d) = decode(&[2, 0, 9, 1]).unwrap();
        assert_eq!(h.token, 9);
        assert_eq!(d, Datagram::PushAck);

        let (_, d) = decode(&[2, 0, 9, 4]).unwrap();
        assert_eq!(d, Datagram::PullAck);

        let (_, d) = decode(&[2, 0, 9, 0]).unwrap();
        assert_eq!(d, Datagram::Unexpected(MessageType::PushData));
    }

    #[test]
    fn test_decode_pull_resp() {
        let body = json!({"txpk": {"imme": false, "tmst": 100000000u32, "freq": 869.525,
            "rfch": 0, "powe": 14, "modu": "LORA", "datr": "SF9BW125", "codr": "4/5",
            "ipol": true, "size": 2, "data": "qrs="}});
        let buf = encode_pull_resp(42, &body).unwrap();
        let (h, d) = decode(&buf).unwrap();
        assert_eq!(h.token, 42);
        let Datagram::PullResp(obj) = d else {
            panic!("expected PULL_RESP");
        };
        let txpk: TxPk = serde_json::from_value(obj["txpk"].clone()).unwrap();
        assert_eq!(txpk.tmst, Some(100_000_000));
        assert_eq!(txpk.datr, "SF9BW125");
        assert!(!txpk.imme);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode(&[2, 0]), Err(WireError::Truncated(2))));
        assert!(matches!(decode(&[2, 0, 0, 9]), Err(WireError::UnknownType(9))));
        assert!(matches!(
            decode(&[2, 0, 0, 3, b'{']),
            Err(WireError::InvalidBody(_))
        ));
    }

    #[test]
    fn test_version_is_reported_not_enforced() {
        let (h, d) = decode(&[1, 0, 3, 4]).unwrap();
        assert_eq!(h.version, 1);
        assert_eq!(d, Datagram::PullAck);
    }
}
