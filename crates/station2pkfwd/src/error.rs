// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy for the bridge.
//!
//! Nothing here is process-fatal once the gateway is running: every variant
//! degrades to a dropped message or a disconnected session. Configuration
//! errors only abort startup.

use crate::config::ConfigError;
use crate::pkfwd::wire::WireError;
use std::time::Duration;
use thiserror::Error;

/// Bridge errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Router id text that matches none of the accepted notations.
    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(String),

    /// Router id not present in the loaded registry.
    #[error("Router not provisioned: {0}")]
    UnprovisionedRouter(String),

    /// Malformed or unexpected uplink/downlink content.
    #[error("Translation error: {0}")]
    Translation(String),

    /// WebSocket or UDP I/O failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Graceful stop of a background writer exceeded its budget.
    #[error("Task '{name}' did not stop within {timeout:?}")]
    CoalescerStopTimeout { name: String, timeout: Duration },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether this error should end the WebSocket session.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Io(_))
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Translation(e.to_string())
    }
}

impl From<axum::Error> for BridgeError {
    fn from(e: axum::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(BridgeError::Transport("reset".into()).is_transport());
        assert!(BridgeError::Io(std::io::Error::other("refused")).is_transport());
        assert!(!BridgeError::Translation("bad DR".into()).is_transport());
        assert!(!BridgeError::MalformedIdentifier("zz".into()).is_transport());
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::CoalescerStopTimeout {
            name: "ws_write".into(),
            timeout: Duration::from_millis(50),
        };
        assert!(err.to_string().contains("ws_write"));

        let err: BridgeError = serde_json::from_str::<u8>("300").unwrap_err().into();
        assert!(matches!(err, BridgeError::Translation(_)));
    }
}
