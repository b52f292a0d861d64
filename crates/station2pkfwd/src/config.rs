// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway configuration.
//!
//! Two layers:
//! - [`ServerConfig`]: listener URIs, backend address and timing, from CLI
//!   flags or a JSON file.
//! - [`ConfigStore`]: the region table (`regions.yaml`) and one
//!   [`RouterConfig`] per `router-<id>.yaml` found in the configuration
//!   directories.

use crate::bridge::BridgeSettings;
use crate::lns;
use crate::router_id::{RouterId, ROUTER_CATEGORY};
use axum::http::Uri;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Seconds between uplink and the RX1 window.
pub const RX_DELAY: u8 = 1;

/// Default concentrator description when a station config has none.
pub const DEFAULT_HWSPEC: &str = "sx1301/1";

/// Station keys every router file must define.
const STATION_KEYS: [&str; 4] = ["JoinEui", "NetID", "bcning", "regionid"];

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Regions
// ============================================================================

/// Supported regional parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Eu863,
    Us902,
}

impl Region {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "EU863" => Ok(Self::Eu863),
            "US902" => Ok(Self::Us902),
            other => Err(ConfigError::Invalid(format!("Unsupported region: {}", other))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Eu863 => "EU863",
            Self::Us902 => "US902",
        }
    }

    /// RX2 datarate.
    pub fn rx2_dr(self) -> usize {
        match self {
            Self::Eu863 => 0,
            Self::Us902 => 8,
        }
    }

    /// RX2 frequency in Hz.
    pub fn rx2_freq(self) -> i64 {
        match self {
            Self::Eu863 => 869_525_000,
            Self::Us902 => 923_300_000,
        }
    }
}

/// One entry of `regions.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionDef {
    pub name: String,
    pub config: RegionParams,
}

/// Channel plan of a region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionParams {
    /// `[sf, bw_khz, dnonly]` per datarate index.
    #[serde(rename = "DRs")]
    pub drs: Vec<Vec<i64>>,

    /// `[freq_hz, min_dr, max_dr]` per uplink channel.
    pub upchannels: Vec<Vec<i64>>,
}

/// Region id (as text) to definition.
pub type RegionTable = BTreeMap<String, RegionDef>;

/// Parse `regions.yaml` content. Region ids may be numbers or strings.
pub fn parse_regions(text: &str) -> Result<RegionTable, ConfigError> {
    let raw: serde_yaml::Mapping = serde_yaml::from_str(text)?;
    let mut table = RegionTable::new();
    for (key, value) in raw {
        let id = yaml_key(&key)
            .ok_or_else(|| ConfigError::Invalid(format!("Bad region id: {:?}", key)))?;
        let def: RegionDef = serde_yaml::from_value(value)?;
        table.insert(id, def);
    }
    Ok(table)
}

fn yaml_key(key: &serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Datarate index <-> `SFxBWy` mapping of a region.
#[derive(Debug, Clone, Default)]
pub struct DatarateTable {
    by_dr: Vec<Option<String>>,
    by_name: HashMap<String, usize>,
}

impl DatarateTable {
    /// Build from `[sf, bw, ..]` rows. Rows with `sf <= 0` (FSK, unused) have
    /// no LoRa name. When two rows share a name the higher index wins.
    pub fn from_drs(drs: &[Vec<i64>]) -> Self {
        let mut table = Self::default();
        for (dr, row) in drs.iter().enumerate() {
            let name = match row.as_slice() {
                [sf, bw, ..] if *sf > 0 => Some(format!("SF{}BW{}", sf, bw)),
                _ => None,
            };
            if let Some(name) = &name {
                table.by_name.insert(name.clone(), dr);
            }
            table.by_dr.push(name);
        }
        table
    }

    /// `SFxBWy` for a datarate index.
    pub fn sfbw(&self, dr: usize) -> Option<&str> {
        self.by_dr.get(dr).and_then(|n| n.as_deref())
    }

    /// Datarate index for an `SFxBWy` string.
    pub fn dr(&self, sfbw: &str) -> Option<usize> {
        self.by_name.get(sfbw).copied()
    }
}

// ============================================================================
// Router configuration
// ============================================================================

/// Configuration of one gateway.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    router: RouterId,
    station: Map<String, Value>,
    region: Region,
    region_id: Value,
    hwspec: String,
    gateway_id: u64,
    datarates: DatarateTable,
}

impl RouterConfig {
    /// Parse a `router-<id>.yaml` document against the region table.
    pub fn from_yaml(router: &RouterId, text: &str, regions: &RegionTable) -> Result<Self, ConfigError> {
        let doc: serde_yaml::Value = serde_yaml::from_str(text)?;

        let station = doc
            .get("station")
            .ok_or_else(|| ConfigError::Invalid(format!("{}: missing 'station' section", router)))?;
        let mut station = match serde_json::to_value(station)? {
            Value::Object(map) => map,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "{}: 'station' must be a mapping",
                    router
                )))
            }
        };

        for key in STATION_KEYS {
            if !station.contains_key(key) {
                return Err(ConfigError::Invalid(format!(
                    "{}: missing station config key: {}",
                    router, key
                )));
            }
        }

        let region_id = station.get("regionid").cloned().unwrap_or(Value::Null);
        let region_def = json_key(&region_id)
            .and_then(|id| regions.get(&id))
            .ok_or_else(|| {
                ConfigError::Invalid(format!("{}: unknown regionid {}", router, region_id))
            })?;
        station.insert("DRs".into(), serde_json::to_value(&region_def.config.drs)?);
        station.insert(
            "upchannels".into(),
            serde_json::to_value(&region_def.config.upchannels)?,
        );

        let region = match station.get("region").and_then(Value::as_str) {
            Some(name) => Region::from_name(name)?,
            None => {
                return Err(ConfigError::Invalid(format!(
                    "{}: missing station config key: region",
                    router
                )))
            }
        };

        let hwspec = station
            .get("hwspec")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_HWSPEC)
            .to_string();

        let gateway_id = match doc.get("pktfwd").and_then(|p| p.get("gateway_ID")) {
            None | Some(serde_yaml::Value::Null) => router.as_u64(),
            Some(serde_yaml::Value::String(hex)) => parse_gateway_id(hex)
                .ok_or_else(|| ConfigError::Invalid(format!("{}: bad gateway_ID {}", router, hex)))?,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "{}: gateway_ID must be a hex string, got {:?}",
                    router, other
                )))
            }
        };

        let datarates = DatarateTable::from_drs(&region_def.config.drs);
        debug!("{}: station config: {:?}", router, station);

        Ok(Self {
            router: router.clone(),
            station,
            region,
            region_id,
            hwspec,
            gateway_id,
            datarates,
        })
    }

    /// Load from a file.
    pub fn from_file<P: AsRef<Path>>(
        router: &RouterId,
        path: P,
        regions: &RegionTable,
    ) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(router, &text, regions)
    }

    pub fn router(&self) -> &RouterId {
        &self.router
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// The `regionid` value as written in the station config.
    pub fn region_id(&self) -> &Value {
        &self.region_id
    }

    pub fn hwspec(&self) -> &str {
        &self.hwspec
    }

    /// Id reported to the packet forwarder backend.
    pub fn gateway_id(&self) -> u64 {
        self.gateway_id
    }

    pub fn datarates(&self) -> &DatarateTable {
        &self.datarates
    }

    pub fn rx_delay(&self) -> u8 {
        RX_DELAY
    }

    pub fn rx2_dr(&self) -> usize {
        self.region.rx2_dr()
    }

    pub fn rx2_freq(&self) -> i64 {
        self.region.rx2_freq()
    }

    /// Station section with the region's DRs and upchannels merged in.
    pub fn station(&self) -> &Map<String, Value> {
        &self.station
    }

    /// `router_config` reply for a `version` message.
    pub fn station_config_message(&self) -> Value {
        lns::router_config_message(&self.station)
    }
}

/// Up to 16 hex digits, optional `0x`.
fn parse_gateway_id(text: &str) -> Option<u64> {
    let hex = text
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .replace(|c| c == '-' || c == ':', "");
    if hex.is_empty() || hex.len() > 16 {
        return None;
    }
    u64::from_str_radix(&hex, 16).ok()
}

// ============================================================================
// Configuration store
// ============================================================================

/// All router configurations found at startup.
#[derive(Debug, Default)]
pub struct ConfigStore {
    regions: RegionTable,
    routers: BTreeMap<RouterId, Arc<RouterConfig>>,
}

impl ConfigStore {
    /// Load `regions.yaml` (first directory that has one) and every
    /// `router-*.yaml`. Router files that fail to load are logged and skipped.
    pub fn load<P: AsRef<Path>>(dirs: &[P]) -> Result<Self, ConfigError> {
        for dir in dirs {
            if !dir.as_ref().is_dir() {
                return Err(ConfigError::Invalid(format!(
                    "Not a directory: {}",
                    dir.as_ref().display()
                )));
            }
        }

        let mut store = Self::default();
        for dir in dirs {
            let path = dir.as_ref().join("regions.yaml");
            if path.exists() {
                store.regions = parse_regions(&std::fs::read_to_string(&path)?)?;
                info!("Loaded {} region(s) from {}", store.regions.len(), path.display());
                break;
            }
        }
        if store.regions.is_empty() {
            warn!("No regions.yaml found, no router can be configured");
        }

        for dir in dirs {
            let mut files: Vec<PathBuf> = std::fs::read_dir(dir.as_ref())?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with("router-") && n.ends_with(".yaml"))
                })
                .collect();
            files.sort();

            for path in files {
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let router = match RouterId::parse(stem) {
                    Ok(id) if id.category() == ROUTER_CATEGORY => id,
                    _ => {
                        info!("Ignoring file {}", path.display());
                        continue;
                    }
                };
                match RouterConfig::from_file(&router, &path, &store.regions) {
                    Ok(config) => {
                        info!("Loaded router configuration from {}", path.display());
                        store.routers.insert(router, Arc::new(config));
                    }
                    Err(e) => warn!("Ignoring file {}: {}", path.display(), e),
                }
            }
        }

        Ok(store)
    }

    /// Build a store from already parsed parts.
    pub fn from_parts(regions: RegionTable, configs: Vec<RouterConfig>) -> Self {
        let routers = configs
            .into_iter()
            .map(|c| (c.router().clone(), Arc::new(c)))
            .collect();
        Self { regions, routers }
    }

    pub fn get(&self, router: &RouterId) -> Option<Arc<RouterConfig>> {
        self.routers.get(router).cloned()
    }

    pub fn router_ids(&self) -> Vec<RouterId> {
        self.routers.keys().cloned().collect()
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.routers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }
}

// ============================================================================
// Server configuration
// ============================================================================

/// Host and port taken from a URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse `<scheme>://host:port[/...]`, requiring the given scheme.
    pub fn parse(uri: &str, scheme: &str) -> Result<Self, ConfigError> {
        let parsed: Uri = uri
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("Bad URI {}: {}", uri, e)))?;
        if parsed.scheme_str() != Some(scheme) {
            return Err(ConfigError::Invalid(format!(
                "URI {} must use the {}:// scheme",
                uri, scheme
            )));
        }
        let host = parsed
            .host()
            .ok_or_else(|| ConfigError::Invalid(format!("URI {} has no host", uri)))?;
        let port = parsed
            .port_u16()
            .ok_or_else(|| ConfigError::Invalid(format!("URI {} has no port", uri)))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// `host:port`, suitable for address resolution.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Gateway process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Discovery (infos) server URI.
    #[serde(default = "default_infos_uri")]
    pub infos_uri: String,

    /// Session (muxs) server URI (default: infos host, port + 2).
    #[serde(default)]
    pub muxs_uri: Option<String>,

    /// Packet forwarder backend.
    #[serde(default = "default_pkfwd_uri")]
    pub pkfwd_uri: String,

    /// Address both listeners bind to.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Directories searched for `regions.yaml` and `router-*.yaml`.
    #[serde(default = "default_confdir")]
    pub confdir: Vec<PathBuf>,

    /// Pause between session accept and the first message (milliseconds).
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// PULL_DATA keepalive interval in seconds.
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,

    /// Send gateway stats every N keepalives (0 disables).
    #[serde(default = "default_stat_interval")]
    pub stat_interval: u64,

    /// Grace period for background writers on shutdown (seconds).
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Routers to serve (empty = every configured router).
    #[serde(default)]
    pub routers: Vec<String>,
}

fn default_infos_uri() -> String {
    "ws://localhost:6090".to_string()
}

fn default_pkfwd_uri() -> String {
    "udp://localhost:1680".to_string()
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_confdir() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

fn default_settle_delay() -> u64 {
    300
}

fn default_keepalive_interval() -> u64 {
    10
}

fn default_stat_interval() -> u64 {
    6
}

fn default_stop_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            infos_uri: default_infos_uri(),
            muxs_uri: None,
            pkfwd_uri: default_pkfwd_uri(),
            bind_address: default_bind_address(),
            confdir: default_confdir(),
            settle_delay_ms: default_settle_delay(),
            keepalive_interval_secs: default_keepalive_interval(),
            stat_interval: default_stat_interval(),
            stop_timeout_secs: default_stop_timeout(),
            routers: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let infos = self.infos_endpoint()?;
        let muxs = self.muxs_endpoint()?;
        self.pkfwd_endpoint()?;

        if infos.port != 0 && infos.port == muxs.port {
            return Err(ConfigError::Invalid(format!(
                "infos and muxs cannot share port {}",
                infos.port
            )));
        }
        if self.keepalive_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "keepalive_interval_secs cannot be 0".into(),
            ));
        }
        if self.stop_timeout_secs == 0 {
            return Err(ConfigError::Invalid("stop_timeout_secs cannot be 0".into()));
        }
        if self.confdir.is_empty() {
            return Err(ConfigError::Invalid("confdir cannot be empty".into()));
        }
        self.router_ids()?;
        Ok(())
    }

    pub fn infos_endpoint(&self) -> Result<Endpoint, ConfigError> {
        Endpoint::parse(&self.infos_uri, "ws")
    }

    /// Base URI handed out by discovery, without a trailing slash.
    pub fn muxs_base_uri(&self) -> Result<String, ConfigError> {
        match &self.muxs_uri {
            Some(uri) => Ok(uri.trim_end_matches('/').to_string()),
            None => {
                let infos = self.infos_endpoint()?;
                let port = infos.port.checked_add(2).ok_or_else(|| {
                    ConfigError::Invalid(format!("infos port {} too high", infos.port))
                })?;
                Ok(format!("ws://{}:{}", infos.host, port))
            }
        }
    }

    pub fn muxs_endpoint(&self) -> Result<Endpoint, ConfigError> {
        Endpoint::parse(&self.muxs_base_uri()?, "ws")
    }

    pub fn pkfwd_endpoint(&self) -> Result<Endpoint, ConfigError> {
        Endpoint::parse(&self.pkfwd_uri, "udp")
    }

    /// Explicit router list, parsed.
    pub fn router_ids(&self) -> Result<Vec<RouterId>, ConfigError> {
        self.routers
            .iter()
            .map(|s| {
                RouterId::parse_router(s)
                    .map_err(|e| ConfigError::Invalid(format!("router {}: {}", s, e)))
            })
            .collect()
    }

    /// Per-bridge settings derived from this configuration.
    pub fn bridge_settings(&self) -> Result<BridgeSettings, ConfigError> {
        Ok(BridgeSettings {
            pkfwd_addr: self.pkfwd_endpoint()?.address(),
            keepalive: Duration::from_secs(self.keepalive_interval_secs),
            stat_interval: self.stat_interval,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
            ..BridgeSettings::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates;
    use std::fs;

    fn regions() -> RegionTable {
        parse_regions(templates::REGIONS_YAML).unwrap()
    }

    #[test]
    fn test_parse_regions() {
        let table = regions();
        assert_eq!(table.len(), 2);
        assert_eq!(table["1000"].name, "EU863");
        assert_eq!(table["1001"].config.drs.len(), 16);
    }

    #[test]
    fn test_datarate_table() {
        let table = regions();
        let eu = DatarateTable::from_drs(&table["1000"].config.drs);
        assert_eq!(eu.sfbw(0), Some("SF12BW125"));
        assert_eq!(eu.sfbw(5), Some("SF7BW125"));
        assert_eq!(eu.sfbw(7), None);
        assert_eq!(eu.sfbw(99), None);
        assert_eq!(eu.dr("SF9BW125"), Some(3));

        let us = DatarateTable::from_drs(&table["1001"].config.drs);
        // SF8BW500 is both DR4 and DR12, the later one wins
        assert_eq!(us.dr("SF8BW500"), Some(12));
        assert_eq!(us.sfbw(4), Some("SF8BW500"));
    }

    #[test]
    fn test_router_config() {
        let id = RouterId::parse_router("::1").unwrap();
        let config = RouterConfig::from_yaml(&id, templates::EU863_ROUTER_YAML, &regions()).unwrap();

        assert_eq!(config.region(), Region::Eu863);
        assert_eq!(config.rx2_dr(), 0);
        assert_eq!(config.rx2_freq(), 869_525_000);
        assert_eq!(config.rx_delay(), 1);
        assert_eq!(config.hwspec(), "sx1301/1");
        assert_eq!(config.gateway_id(), 1);
        assert_eq!(config.region_id(), &Value::from(1000));
        assert!(config.station().contains_key("DRs"));
        assert!(config.station().contains_key("upchannels"));

        let msg = config.station_config_message();
        assert_eq!(msg["msgtype"], "router_config");
        assert_eq!(msg["region"], "EU863");
        assert_eq!(msg["DRs"][0], serde_json::json!([12, 125, 0]));
    }

    #[test]
    fn test_us902_rx2() {
        let id = RouterId::router(2);
        let config = RouterConfig::from_yaml(&id, templates::US902_ROUTER_YAML, &regions()).unwrap();
        assert_eq!(config.rx2_dr(), 8);
        assert_eq!(config.rx2_freq(), 923_300_000);
    }

    #[test]
    fn test_gateway_id_override() {
        let id = RouterId::router(1);
        let text = templates::EU863_ROUTER_YAML.replace("pktfwd: {}", "pktfwd:\n  gateway_ID: \"AA555A0000000101\"");
        let config = RouterConfig::from_yaml(&id, &text, &regions()).unwrap();
        assert_eq!(config.gateway_id(), 0xAA55_5A00_0000_0101);

        let text = templates::EU863_ROUTER_YAML.replace("pktfwd: {}", "pktfwd:\n  gateway_ID: \"zz\"");
        assert!(RouterConfig::from_yaml(&id, &text, &regions()).is_err());
    }

    #[test]
    fn test_router_config_errors() {
        let id = RouterId::router(1);
        let missing = templates::EU863_ROUTER_YAML.replace("  NetID: null\n", "");
        assert!(matches!(
            RouterConfig::from_yaml(&id, &missing, &regions()),
            Err(ConfigError::Invalid(_))
        ));

        let bad_region = templates::EU863_ROUTER_YAML.replace("region: EU863", "region: AS923");
        assert!(RouterConfig::from_yaml(&id, &bad_region, &regions()).is_err());

        let bad_id = templates::EU863_ROUTER_YAML.replace("regionid: 1000", "regionid: 7");
        assert!(RouterConfig::from_yaml(&id, &bad_id, &regions()).is_err());

        assert!(matches!(
            RouterConfig::from_yaml(&id, "station: [", &regions()),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_store_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("regions.yaml"), templates::REGIONS_YAML).unwrap();
        fs::write(dir.path().join("router-1.yaml"), templates::EU863_ROUTER_YAML).unwrap();
        fs::write(dir.path().join("router-2.yaml"), templates::US902_ROUTER_YAML).unwrap();
        fs::write(dir.path().join("router-3.yaml"), "station: {}\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = ConfigStore::load(&[dir.path()]).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.router_ids(),
            vec![RouterId::router(1), RouterId::router(2)]
        );
        let config = store.get(&RouterId::parse_router("::2").unwrap()).unwrap();
        assert_eq!(config.region(), Region::Us902);
        assert!(store.get(&RouterId::router(3)).is_none());
    }

    #[test]
    fn test_store_regions_from_first_dir() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(second.path().join("regions.yaml"), templates::REGIONS_YAML).unwrap();
        fs::write(first.path().join("router-1.yaml"), templates::EU863_ROUTER_YAML).unwrap();

        let store = ConfigStore::load(&[first.path(), second.path()]).unwrap();
        assert_eq!(store.regions().len(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_rejects_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            ConfigStore::load(&[missing]),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.muxs_base_uri().unwrap(), "ws://localhost:6092");
        assert_eq!(
            config.pkfwd_endpoint().unwrap(),
            Endpoint {
                host: "localhost".into(),
                port: 1680
            }
        );

        let settings = config.bridge_settings().unwrap();
        assert_eq!(settings.pkfwd_addr, "localhost:1680");
        assert_eq!(settings.settle_delay, Duration::from_millis(300));
        assert_eq!(settings.keepalive, Duration::from_secs(10));
    }

    #[test]
    fn test_server_validate() {
        let config = ServerConfig {
            pkfwd_uri: "tcp://localhost:1680".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            muxs_uri: Some("ws://localhost:6090/".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            routers: vec!["muxs-::1".into()],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            keepalive_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        fs::write(
            &path,
            r#"{"infos_uri": "ws://gw.local:7000", "routers": ["router-::1", "2"]}"#,
        )
        .unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.muxs_base_uri().unwrap(), "ws://gw.local:7002");
        assert_eq!(config.stat_interval, 6);
        assert_eq!(
            config.router_ids().unwrap(),
            vec![RouterId::router(1), RouterId::router(2)]
        );
    }
}
