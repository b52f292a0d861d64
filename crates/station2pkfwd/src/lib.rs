// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! station2pkfwd - LNS to packet-forwarder bridge.
//!
//! Lets LoRa Basic Stations, which speak the JSON/WebSocket LNS protocol,
//! work against network servers that only understand the legacy Semtech UDP
//! packet-forwarder protocol.
//!
//! Per configured gateway a [`RouterBridge`] owns:
//! - the station's WebSocket session (replaced on reconnect)
//! - a [`PkFwdClient`] speaking PUSH_DATA / PULL_DATA / TX_ACK to the backend
//! - a [`WriteCoalescer`] batching downlinks back to the station
//!
//! The [`Registry`] maps router ids to bridges and answers discovery; the
//! [`server`] module exposes the infos and muxs listeners.

pub mod bridge;
pub mod coalescer;
pub mod config;
pub mod error;
pub mod lns;
pub mod pkfwd;
pub mod registry;
pub mod router_id;
pub mod server;
pub mod stats;
pub mod templates;

pub use bridge::{BridgeSettings, RouterBridge, SessionState};
pub use coalescer::{Accumulator, WriteCoalescer};
pub use config::{ConfigError, ConfigStore, Region, RouterConfig, ServerConfig};
pub use error::{BridgeError, Result};
pub use pkfwd::PkFwdClient;
pub use registry::{DiscoveryRequest, DiscoveryResponse, Registry};
pub use router_id::{Eui, MacScheme, RouterId};
pub use stats::GatewayStats;
