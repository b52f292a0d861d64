// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Legacy UDP packet-forwarder protocol.

pub mod client;
pub mod wire;

pub use client::{
    connect_socket, ClientCounters, ClientSettings, PkFwdClient, PullRespHandler, UplinkMeta,
};
pub use wire::{Datagram, Header, MessageType, WireError, PROTOCOL_VERSION};
