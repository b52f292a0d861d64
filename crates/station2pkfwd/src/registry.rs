// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Router registry and discovery.
//!
//! The registry maps each configured [`RouterId`] to its [`RouterBridge`].
//! It is built once at startup and only read afterwards.

use crate::bridge::{BridgeSettings, RouterBridge};
use crate::config::{ConfigError, ConfigStore};
use crate::error::{BridgeError, Result};
use crate::router_id::RouterId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Routing entry handed out with every successful discovery.
pub const MUXS_ID: &str = "muxs-::0";

/// Discovery request sent by a station: `{"router": <id>}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryRequest {
    /// Id as text or number.
    #[serde(default)]
    pub router: Value,
}

/// Discovery reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DiscoveryResponse {
    Found {
        router: String,
        muxs: String,
        uri: String,
    },
    Failed {
        router: String,
        error: String,
    },
}

const UNPROVISIONED: &str = "Router not provisioned";
const INVALID_REQUEST: &str = "Invalid request data";

/// Error text sent to a station whose router id was rejected.
pub fn rejection_text(e: &BridgeError) -> &'static str {
    match e {
        BridgeError::UnprovisionedRouter(_) => UNPROVISIONED,
        _ => INVALID_REQUEST,
    }
}

/// Bridges by router id.
pub struct Registry {
    bridges: BTreeMap<RouterId, Arc<RouterBridge>>,
    muxs_uri: String,
}

impl Registry {
    /// Empty registry handing out `<muxs_uri>/<router>` on discovery.
    pub fn new(muxs_uri: impl Into<String>) -> Self {
        Self {
            bridges: BTreeMap::new(),
            muxs_uri: muxs_uri.into().trim_end_matches('/').to_string(),
        }
    }

    /// Start one bridge per router. An empty `routers` list means every
    /// router in the store.
    pub async fn start(
        store: &ConfigStore,
        routers: &[RouterId],
        settings: &BridgeSettings,
        muxs_uri: impl Into<String>,
    ) -> Result<Self> {
        let mut registry = Self::new(muxs_uri);
        let ids = if routers.is_empty() {
            store.router_ids()
        } else {
            routers.to_vec()
        };

        for router in ids {
            let config = store
                .get(&router)
                .ok_or_else(|| BridgeError::UnprovisionedRouter(router.to_string()))?;
            let bridge = RouterBridge::start(router, config, settings).await?;
            registry.insert(bridge)?;
        }
        info!("Registry ready with {} router(s)", registry.len());
        Ok(registry)
    }

    /// Add a bridge. Each router may be registered once.
    pub fn insert(&mut self, bridge: Arc<RouterBridge>) -> Result<()> {
        let router = bridge.router().clone();
        if self.bridges.contains_key(&router) {
            return Err(ConfigError::Invalid(format!("router {} registered twice", router)).into());
        }
        self.bridges.insert(router, bridge);
        Ok(())
    }

    pub fn get(&self, router: &RouterId) -> Option<&Arc<RouterBridge>> {
        self.bridges.get(router)
    }

    /// Resolve a router id given as text.
    pub fn lookup(&self, text: &str) -> Result<&Arc<RouterBridge>> {
        let router = RouterId::parse_router(text)?;
        self.bridges
            .get(&router)
            .ok_or_else(|| BridgeError::UnprovisionedRouter(router.to_string()))
    }

    /// Answer a discovery request.
    pub fn discover(&self, request: &DiscoveryRequest) -> DiscoveryResponse {
        let text = match &request.router {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => {
                return DiscoveryResponse::Failed {
                    router: "0".into(),
                    error: INVALID_REQUEST.into(),
                }
            }
        };

        match self.lookup(&text) {
            Ok(bridge) => {
                let router = bridge.router().to_string();
                DiscoveryResponse::Found {
                    uri: format!("{}/{}", self.muxs_uri, router),
                    muxs: MUXS_ID.into(),
                    router,
                }
            }
            Err(e) => {
                warn!("Discovery for {:?} failed: {}", text, e);
                DiscoveryResponse::Failed {
                    router: text,
                    error: rejection_text(&e).into(),
                }
            }
        }
    }

    pub fn muxs_uri(&self) -> &str {
        &self.muxs_uri
    }

    pub fn routers(&self) -> impl Iterator<Item = &RouterId> {
        self.bridges.keys()
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }

    /// Routers with a station attached.
    pub fn connected_count(&self) -> usize {
        self.bridges.values().filter(|b| b.is_connected()).count()
    }

    /// Stop every bridge.
    pub async fn shutdown(&self) {
        for bridge in self.bridges.values() {
            if let Err(e) = bridge.stop().await {
                warn!("{}: {}", bridge.router(), e);
            }
        }
        info!("Registry shut down");
    }
}
