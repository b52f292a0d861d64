// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-gateway traffic counters.
//!
//! Shared between the router bridge, which records traffic, and the
//! packet-forwarder client, which reports it in periodic `stat` messages.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one gateway.
#[derive(Debug, Default)]
pub struct GatewayStats {
    /// Uplink frames received from the station.
    pub rx_count: AtomicU64,

    /// Uplink frames that decoded correctly.
    pub rx_ok: AtomicU64,

    /// Uplink frames forwarded to the backend.
    pub rx_forwarded: AtomicU64,

    /// Downlinks received from the backend.
    pub downlink_count: AtomicU64,

    /// Downlinks the station reported as transmitted.
    pub tx_count: AtomicU64,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an uplink frame received from the station.
    pub fn record_rx(&self) {
        self.rx_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an uplink whose PHY payload was assembled.
    pub fn record_rx_ok(&self) {
        self.rx_ok.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an uplink handed to the backend.
    pub fn record_forwarded(&self) {
        self.rx_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a downlink from the backend.
    pub fn record_downlink(&self) {
        self.downlink_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transmit confirmation from the station.
    pub fn record_tx(&self) {
        self.tx_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> GatewayStatsSnapshot {
        GatewayStatsSnapshot {
            rx_count: self.rx_count.load(Ordering::Relaxed),
            rx_ok: self.rx_ok.load(Ordering::Relaxed),
            rx_forwarded: self.rx_forwarded.load(Ordering::Relaxed),
            downlink_count: self.downlink_count.load(Ordering::Relaxed),
            tx_count: self.tx_count.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of gateway statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GatewayStatsSnapshot {
    pub rx_count: u64,
    pub rx_ok: u64,
    pub rx_forwarded: u64,
    pub downlink_count: u64,
    pub tx_count: u64,
}
