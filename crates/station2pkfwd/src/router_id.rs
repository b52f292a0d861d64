// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Router identifiers.
//!
//! A [`RouterId`] is a 64-bit value with an optional category tag. Its
//! canonical text form ("id6") writes the value as four 16-bit hex groups and
//! collapses the longest run of zero groups into `::`, much like a compressed
//! IPv6 address:
//!
//! ```text
//! ab::cd          -> 0x00AB_0000_0000_00CD
//! ::1             -> 0x0000_0000_0000_0001
//! router-1:2:3:4  -> category "router", 0x0001_0002_0003_0004
//! ```
//!
//! Parsing also accepts decimal/hex literals, 8-octet EUIs (`-` or `:`
//! separated) and 6-octet MAC addresses.

use crate::error::{BridgeError, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Category used for gateway routers.
pub const ROUTER_CATEGORY: &str = "router";

/// High-byte marker added to MAC addresses under [`MacScheme::Category`].
const MAC_CATEGORY_MARKER: u64 = 0x2 << 56;

/// Middle word inserted into MAC addresses under [`MacScheme::GatewayId`].
const MAC_FFFE: u64 = 0xFFFE << 24;

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(-?\d+|0[xX][0-9A-Fa-f]+)$").expect("static regex"))
}

fn eui_dash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9A-Fa-f]{2}(-[0-9A-Fa-f]{2}){7}$").expect("static regex"))
}

fn eui_colon_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){7}$").expect("static regex"))
}

fn mac_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").expect("static regex"))
}

/// How a 6-octet MAC address widens to 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacScheme {
    /// Add `0x02 << 56` to the 48-bit value.
    #[default]
    Category,
    /// Insert `0xFFFE` between the upper and lower three octets.
    GatewayId,
}

/// 64-bit router identifier with an optional category.
///
/// Equality and ordering compare the category first, then the value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouterId {
    category: String,
    id: i64,
}

impl RouterId {
    /// Create an identifier from a raw signed value.
    pub fn new(category: impl Into<String>, id: i64) -> Self {
        Self {
            category: category.into(),
            id,
        }
    }

    /// Create a `router-` identifier from an unsigned value.
    pub fn router(id: u64) -> Self {
        Self::new(ROUTER_CATEGORY, id as i64)
    }

    /// Parse any accepted notation without a required category.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with(text, None, MacScheme::Category)
    }

    /// Parse an identifier that must belong to the `router` category.
    pub fn parse_router(text: &str) -> Result<Self> {
        Self::parse_with(text, Some(ROUTER_CATEGORY), MacScheme::Category)
    }

    /// Parse with an optional required category and a MAC expansion scheme.
    ///
    /// A leading `<category>-` prefix is split off unless the whole text is a
    /// dash-separated EUI. When `category` is given and the text carries a
    /// different one, parsing fails.
    pub fn parse_with(text: &str, category: Option<&str>, scheme: MacScheme) -> Result<Self> {
        let text = text.trim();
        let (found, body) = match text.find('-') {
            Some(pos) if pos > 0 && !eui_dash_re().is_match(text) => {
                (Some(&text[..pos]), &text[pos + 1..])
            }
            _ => (None, text),
        };

        let category = match (found, category) {
            (Some(f), Some(c)) if f != c => {
                return Err(BridgeError::MalformedIdentifier(format!(
                    "{}: category '{}' where '{}' expected",
                    text, f, c
                )));
            }
            (Some(f), _) => f,
            (None, Some(c)) => c,
            (None, None) => "",
        };

        let value = parse_value(body, scheme)
            .ok_or_else(|| BridgeError::MalformedIdentifier(text.to_string()))?;

        Ok(Self::new(category, value as i64))
    }

    /// Category tag (empty when none).
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Raw signed value.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Value reinterpreted as unsigned.
    pub fn as_u64(&self) -> u64 {
        self.id as u64
    }

    /// Canonical id6 text without the category.
    pub fn id6(&self) -> String {
        format_id6(self.as_u64())
    }

    /// `HH-HH-HH-HH-HH-HH-HH-HH` form.
    pub fn as_eui_string(&self) -> String {
        Eui(self.as_u64()).to_string()
    }

    /// `HH:HH:HH:HH:HH:HH` form, undoing the `FFFE` insertion if present.
    pub fn as_mac_string(&self) -> String {
        let mut id = self.as_u64();
        if id & 0xFFFF_0000_00 == MAC_FFFE {
            id = (id & 0xFF_FFFF) | ((id >> 16) & 0xFFFF_FF00_0000);
        }
        (0..6)
            .rev()
            .map(|i| format!("{:02X}", (id >> (i * 8)) & 0xFF))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.category.is_empty() {
            write!(f, "{}", self.id6())
        } else {
            write!(f, "{}-{}", self.category, self.id6())
        }
    }
}

impl FromStr for RouterId {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for RouterId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RouterId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Write a 64-bit value in id6 notation.
pub fn format_id6(value: u64) -> String {
    if value == 0 {
        return "::0".to_string();
    }
    let groups = [
        (value >> 48) as u16,
        (value >> 32) as u16,
        (value >> 16) as u16,
        value as u16,
    ];

    // Longest run of >= 2 zero groups, first one on ties.
    let mut best: Option<(usize, usize)> = None;
    let mut i = 0;
    while i < groups.len() {
        if groups[i] != 0 {
            i += 1;
            continue;
        }
        let start = i;
        while i < groups.len() && groups[i] == 0 {
            i += 1;
        }
        let len = i - start;
        if len >= 2 && best.map_or(true, |(_, l)| len > l) {
            best = Some((start, len));
        }
    }

    let hex = |gs: &[u16]| {
        gs.iter()
            .map(|g| format!("{:x}", g))
            .collect::<Vec<_>>()
            .join(":")
    };
    match best {
        Some((start, len)) => format!("{}::{}", hex(&groups[..start]), hex(&groups[start + len..])),
        None => hex(&groups),
    }
}

fn parse_value(text: &str, scheme: MacScheme) -> Option<u64> {
    if number_re().is_match(text) {
        return parse_number(text);
    }
    if mac_re().is_match(text) {
        let mac = u64::from_str_radix(&text.replace(':', ""), 16).ok()?;
        return Some(match scheme {
            MacScheme::Category => mac.wrapping_add(MAC_CATEGORY_MARKER),
            MacScheme::GatewayId => ((mac >> 24) << 40) | MAC_FFFE | (mac & 0xFF_FFFF),
        });
    }
    if let Some(v) = parse_groups(text) {
        return Some(v);
    }
    if eui_dash_re().is_match(text) {
        return u64::from_str_radix(&text.replace('-', ""), 16).ok();
    }
    if eui_colon_re().is_match(text) {
        return u64::from_str_radix(&text.replace(':', ""), 16).ok();
    }
    None
}

/// Decimal (possibly negative) or `0x` hex literal. Out-of-range is `None`.
fn parse_number(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else if text.starts_with('-') {
        text.parse::<i64>().ok().map(|v| v as u64)
    } else {
        text.parse::<u64>().ok()
    }
}

/// Four hex groups, with at most one `::` standing for one or more zero groups.
fn parse_groups(text: &str) -> Option<u64> {
    let groups: Vec<&str> = match text.split_once("::") {
        Some((head, tail)) => {
            if tail.contains("::") {
                return None;
            }
            let head: Vec<&str> = if head.is_empty() { Vec::new() } else { head.split(':').collect() };
            let tail: Vec<&str> = if tail.is_empty() { Vec::new() } else { tail.split(':').collect() };
            let missing = 4usize.checked_sub(head.len() + tail.len())?;
            if missing == 0 {
                return None;
            }
            head.into_iter()
                .chain(std::iter::repeat("0").take(missing))
                .chain(tail)
                .collect()
        }
        None => text.split(':').collect(),
    };
    if groups.len() != 4 {
        return None;
    }
    groups.iter().try_fold(0u64, |acc, g| {
        if g.is_empty() || g.len() > 4 || !g.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u16::from_str_radix(g, 16)
            .ok()
            .map(|v| (acc << 16) | u64::from(v))
    })
}

/// 8-octet extended unique identifier (JoinEui, DevEui, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Eui(pub u64);

impl Eui {
    /// Value as signed 64-bit, as carried in LNS JSON numbers.
    pub fn as_i64(&self) -> i64 {
        self.0 as i64
    }
}

impl fmt::Display for Eui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = (0..8)
            .rev()
            .map(|i| format!("{:02X}", (self.0 >> (i * 8)) & 0xFF))
            .collect::<Vec<_>>()
            .join("-");
        f.write_str(&text)
    }
}

impl FromStr for Eui {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let value = if number_re().is_match(s) {
            parse_number(s)
        } else if eui_dash_re().is_match(s) {
            u64::from_str_radix(&s.replace('-', ""), 16).ok()
        } else if eui_colon_re().is_match(s) {
            u64::from_str_radix(&s.replace(':', ""), 16).ok()
        } else {
            None
        };
        value
            .map(Eui)
            .ok_or_else(|| BridgeError::MalformedIdentifier(format!("illegal EUI: {}", s)))
    }
}

impl Serialize for Eui {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Eui {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_notation() {
        let id = RouterId::parse("ab::cd").unwrap();
        assert_eq!(id.as_u64(), (0xAB << 48) | 0xCD);
        assert_eq!(id.to_string(), "ab::cd");
        assert_eq!(id.category(), "");
    }

    #[test]
    fn test_elision_positions() {
        let cases = [
            ("::", 0u64),
            ("::1", 1),
            ("::1:2", 0x1_0002),
            ("1::", 0x0001 << 48),
            ("1:2::", (0x0001 << 48) | (0x0002 << 32)),
            ("1::2:3", (0x0001 << 48) | (0x0002 << 16) | 0x3),
            ("1:2:3:4", 0x0001_0002_0003_0004),
        ];
        for (text, value) in cases {
            assert_eq!(RouterId::parse(text).unwrap().as_u64(), value, "{}", text);
        }
    }

    #[test]
    fn test_rejects_bad_elision() {
        for text in ["1::2::3", "1:2:3::4", "1:2:3:4:5", "12345::1", ":::", "g::1", "", "1:2"] {
            assert!(
                matches!(
                    RouterId::parse(text),
                    Err(BridgeError::MalformedIdentifier(_))
                ),
                "{} should not parse",
                text
            );
        }
    }

    #[test]
    fn test_format_canonical() {
        assert_eq!(format_id6(0), "::0");
        assert_eq!(format_id6(1), "::1");
        assert_eq!(format_id6(0x1_0002), "::1:2");
        assert_eq!(format_id6(0x0001_0000_0000_0000), "1::");
        assert_eq!(format_id6(0x0001_0002_0000_0000), "1:2::");
        assert_eq!(format_id6(0x0001_0000_0000_0002), "1::2");
        assert_eq!(format_id6(0x0000_0000_0002_0003), "::2:3");
        assert_eq!(format_id6(0x0001_0002_0003_0004), "1:2:3:4");
        // Single zero group is never elided
        assert_eq!(format_id6(0x0005_0000_0002_0003), "5:0:2:3");
        assert_eq!(format_id6(0x0000_0001_0000_0000), "0:1::");
    }

    #[test]
    fn test_format_parse_idempotent() {
        let notations = ["0xAB0000000000CD", "ab:0:0:cd", "ab::cd", "00-AB-00-00-00-00-00-CD"];
        let canon: Vec<String> = notations
            .iter()
            .map(|n| RouterId::parse(n).unwrap().to_string())
            .collect();
        assert!(canon.iter().all(|c| c == "ab::cd"), "{:?}", canon);

        for value in [0u64, 1, 0xFFFF, 0xDEAD_BEEF_0000_0001, u64::MAX, 0x8000_0000_0000_0000] {
            let id = RouterId::router(value);
            let reparsed = RouterId::parse(&id.to_string()).unwrap();
            assert_eq!(reparsed, id);
        }
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(RouterId::parse("123").unwrap().id(), 123);
        assert_eq!(RouterId::parse("-5").unwrap().id(), -5);
        assert_eq!(RouterId::parse("0x1F").unwrap().id(), 0x1F);
        assert_eq!(RouterId::parse("-5").unwrap().to_string(), "ffff:ffff:ffff:fffb");
        assert!(RouterId::parse("99999999999999999999999").is_err());
    }

    #[test]
    fn test_high_values_wrap_negative() {
        let id = RouterId::parse("ffff::").unwrap();
        assert!(id.id() < 0);
        assert_eq!(id.as_u64(), 0xFFFF_0000_0000_0000);
        assert_eq!(id.id6(), "ffff::");
    }

    #[test]
    fn test_eui_forms() {
        let dash = RouterId::parse("01-02-03-04-05-06-07-08").unwrap();
        let colon = RouterId::parse("01:02:03:04:05:06:07:08").unwrap();
        assert_eq!(dash, colon);
        assert_eq!(dash.as_u64(), 0x0102_0304_0506_0708);
        assert_eq!(dash.as_eui_string(), "01-02-03-04-05-06-07-08");
        // Dash EUI is not mistaken for a category prefix
        assert_eq!(dash.category(), "");
    }

    #[test]
    fn test_mac_schemes() {
        let cat = RouterId::parse("01:02:03:04:05:06").unwrap();
        assert_eq!(cat.as_u64(), 0x0200_0102_0304_0506);

        let gw = RouterId::parse_with("01:02:03:04:05:06", None, MacScheme::GatewayId).unwrap();
        assert_eq!(gw.as_u64(), 0x0102_03FF_FE04_0506);
        assert_eq!(gw.as_mac_string(), "01:02:03:04:05:06");
    }

    #[test]
    fn test_categories() {
        let id = RouterId::parse("router-ab::cd").unwrap();
        assert_eq!(id.category(), "router");
        assert_eq!(id.to_string(), "router-ab::cd");

        let plain = RouterId::parse_router("ab::cd").unwrap();
        assert_eq!(plain, id);

        let err = RouterId::parse_router("muxs-::0").unwrap_err();
        assert!(matches!(err, BridgeError::MalformedIdentifier(_)));

        // Same value, different category
        assert_ne!(RouterId::parse("::1").unwrap(), RouterId::parse("router-::1").unwrap());
    }

    #[test]
    fn test_ordering() {
        let mut ids = vec![
            RouterId::parse("router-::2").unwrap(),
            RouterId::parse("muxs-::9").unwrap(),
            RouterId::parse("router-::1").unwrap(),
        ];
        ids.sort();
        let text: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
        assert_eq!(text, vec!["muxs-::9", "router-::1", "router-::2"]);
    }

    #[test]
    fn test_serde_as_string() {
        let id = RouterId::parse("router-1::").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"router-1::\"");
        let back: RouterId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_eui_type() {
        let eui: Eui = "58-a0-cb-00-0c-30-33-00".parse().unwrap();
        assert_eq!(eui.to_string(), "58-A0-CB-00-0C-30-33-00");
        assert_eq!("58:A0:CB:00:0C:30:33:00".parse::<Eui>().unwrap(), eui);
        assert_eq!("0x10".parse::<Eui>().unwrap(), Eui(0x10));
        assert!("58-A0".parse::<Eui>().is_err());

        let json = serde_json::to_string(&eui).unwrap();
        assert_eq!(json, "\"58-A0-CB-00-0C-30-33-00\"");
    }
}
