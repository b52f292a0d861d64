// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LNS protocol message model.
//!
//! The station speaks JSON text frames tagged by `msgtype`. Uplink kinds we
//! translate are `version`, `jreq`, `updf` and `dntxed`; anything else maps
//! to [`UplinkMessage::Unknown`]. Downlinks go out as `dnmsg`, and the reply
//! to `version` is a `router_config`.

use crate::error::{BridgeError, Result};
use crate::router_id::Eui;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Messages received from a station.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "msgtype")]
pub enum UplinkMessage {
    #[serde(rename = "version")]
    Version(VersionInfo),

    #[serde(rename = "jreq")]
    JoinRequest(JoinRequest),

    #[serde(rename = "updf")]
    DataFrame(DataFrame),

    #[serde(rename = "dntxed")]
    TxConfirmation(TxConfirmation),

    #[serde(other)]
    Unknown,
}

impl UplinkMessage {
    /// Wire name, `"?"` for unknown kinds.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Version(_) => "version",
            Self::JoinRequest(_) => "jreq",
            Self::DataFrame(_) => "updf",
            Self::TxConfirmation(_) => "dntxed",
            Self::Unknown => "?",
        }
    }
}

/// Station software description sent on connect.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VersionInfo {
    pub station: Option<String>,
    pub firmware: Option<String>,
    pub package: Option<String>,
    pub model: Option<String>,
    pub protocol: Option<u32>,
    pub features: Option<String>,
}

/// Radio metadata attached to every uplink.
#[derive(Debug, Clone, Deserialize)]
pub struct UpInfo {
    /// Antenna/radio context to echo back in downlinks.
    #[serde(default)]
    pub rctx: i64,
    /// Extended 64-bit concentrator time.
    pub xtime: i64,
    #[serde(default)]
    pub gpstime: i64,
    #[serde(default = "default_fts")]
    pub fts: i64,
    pub rssi: f64,
    pub snr: f64,
    /// UTC seconds.
    pub rxtime: f64,
}

fn default_fts() -> i64 {
    -1
}

fn default_fport() -> i32 {
    -1
}

/// Join request (`jreq`).
#[derive(Debug, Clone, Deserialize)]
pub struct JoinRequest {
    #[serde(rename = "MHdr")]
    pub mhdr: u8,
    #[serde(rename = "JoinEui")]
    pub join_eui: Eui,
    #[serde(rename = "DevEui")]
    pub dev_eui: Eui,
    #[serde(rename = "DevNonce")]
    pub dev_nonce: u32,
    #[serde(rename = "MIC")]
    pub mic: i64,
    #[serde(rename = "DR")]
    pub dr: usize,
    /// Frequency in Hz.
    #[serde(rename = "Freq")]
    pub freq: i64,
    pub upinfo: UpInfo,
}

impl JoinRequest {
    /// Rebuild the 23-byte join-request PHY payload.
    pub fn to_pdu(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(23);
        pdu.push(self.mhdr);
        pdu.extend_from_slice(&self.join_eui.0.to_le_bytes());
        pdu.extend_from_slice(&self.dev_eui.0.to_le_bytes());
        pdu.extend_from_slice(&(self.dev_nonce as u16).to_le_bytes());
        pdu.extend_from_slice(&(self.mic as u32).to_le_bytes());
        pdu
    }
}

/// Uplink data frame (`updf`).
#[derive(Debug, Clone, Deserialize)]
pub struct DataFrame {
    #[serde(rename = "MHdr")]
    pub mhdr: u8,
    #[serde(rename = "DevAddr")]
    pub dev_addr: i64,
    #[serde(rename = "FCtrl")]
    pub fctrl: u8,
    #[serde(rename = "FCnt")]
    pub fcnt: u32,
    /// Hex.
    #[serde(rename = "FOpts", default)]
    pub fopts: String,
    /// Negative when the frame has no port.
    #[serde(rename = "FPort", default = "default_fport")]
    pub fport: i32,
    /// Hex.
    #[serde(rename = "FRMPayload", default)]
    pub frm_payload: String,
    #[serde(rename = "MIC")]
    pub mic: i64,
    #[serde(rename = "DR")]
    pub dr: usize,
    /// Frequency in Hz.
    #[serde(rename = "Freq")]
    pub freq: i64,
    pub upinfo: UpInfo,
}

impl DataFrame {
    /// Rebuild the PHY payload:
    /// `MHdr | DevAddr | FCtrl | FCnt | FOpts | FPort? | FRMPayload | MIC`.
    pub fn to_pdu(&self) -> Result<Vec<u8>> {
        let fopts = hex::decode(&self.fopts)
            .map_err(|e| BridgeError::Translation(format!("FOpts: {}", e)))?;
        let payload = hex::decode(&self.frm_payload)
            .map_err(|e| BridgeError::Translation(format!("FRMPayload: {}", e)))?;

        let mut pdu = Vec::with_capacity(13 + fopts.len() + payload.len());
        pdu.push(self.mhdr);
        pdu.extend_from_slice(&(self.dev_addr as u32).to_le_bytes());
        pdu.push(self.fctrl);
        pdu.extend_from_slice(&(self.fcnt as u16).to_le_bytes());
        pdu.extend_from_slice(&fopts);
        if self.fport >= 0 {
            pdu.push(self.fport as u8);
        }
        pdu.extend_from_slice(&payload);
        pdu.extend_from_slice(&(self.mic as u32).to_le_bytes());
        Ok(pdu)
    }
}

/// Transmit confirmation (`dntxed`).
#[derive(Debug, Clone, Deserialize)]
pub struct TxConfirmation {
    pub diid: i64,
    #[serde(rename = "DevEui", default)]
    pub dev_eui: Option<Eui>,
    #[serde(default)]
    pub rctx: Option<i64>,
    #[serde(default)]
    pub xtime: Option<i64>,
    #[serde(default)]
    pub txtime: Option<f64>,
    #[serde(default)]
    pub gpstime: Option<i64>,
}

/// Downlink sent to the station (`dnmsg`).
#[derive(Debug, Clone, Serialize)]
pub struct DownlinkMessage {
    pub msgtype: &'static str,
    #[serde(rename = "DevEui")]
    pub dev_eui: Eui,
    #[serde(rename = "dC")]
    pub device_class: u8,
    pub diid: i64,
    pub dnmode: &'static str,
    /// Hex PHY payload.
    pub pdu: String,
    #[serde(rename = "RxDelay")]
    pub rx_delay: u8,
    #[serde(rename = "RX1DR")]
    pub rx1_dr: usize,
    #[serde(rename = "RX1Freq")]
    pub rx1_freq: i64,
    #[serde(rename = "RX2DR")]
    pub rx2_dr: usize,
    #[serde(rename = "RX2Freq")]
    pub rx2_freq: i64,
    pub rctx: i64,
    pub xtime: i64,
    #[serde(rename = "MuxTime")]
    pub mux_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regionid: Option<Value>,
}

impl DownlinkMessage {
    pub const MSGTYPE: &'static str = "dnmsg";
    pub const DNMODE: &'static str = "updn";
}

/// Build the `router_config` reply from a station configuration object.
pub fn router_config_message(station: &Map<String, Value>) -> Value {
    let mut msg = station.clone();
    msg.insert("MuxTime".into(), mux_time().into());
    msg.insert("msgtype".into(), "router_config".into());
    Value::Object(msg)
}

/// Current UTC time in seconds, as a float.
pub fn mux_time() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1e6
}
