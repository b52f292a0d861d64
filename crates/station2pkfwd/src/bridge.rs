// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Router bridge - one per configured gateway.
//!
//! Owns the station's WebSocket session (when one is attached) and the
//! packet-forwarder client towards the backend:
//! - station uplinks (`jreq`, `updf`) become PUSH_DATA `rxpk` records
//! - `dntxed` becomes TX_ACK
//! - PULL_RESP `txpk` downlinks become `dnmsg`, written through a
//!   [`WriteCoalescer`]
//!
//! Station time is a 64-bit `xtime`, the backend works with the 32-bit
//! `tmst` tick counter. Uplinks send the low 32 bits; downlinks borrow the
//! high 32 bits from the most recent uplink.

use crate::coalescer::WriteCoalescer;
use crate::config::RouterConfig;
use crate::error::{BridgeError, Result};
use crate::lns::{self, DownlinkMessage, UpInfo, UplinkMessage};
use crate::pkfwd::wire::TxPk;
use crate::pkfwd::{connect_socket, ClientSettings, PkFwdClient, PullRespHandler, UplinkMeta};
use crate::router_id::{Eui, RouterId};
use crate::stats::GatewayStats;
use axum::extract::ws::{close_code, CloseFrame, Message};
use base64::Engine;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use std::borrow::Cow;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// DevEui placed in every downlink.
pub const DOWNLINK_DEV_EUI: Eui = Eui(0x58A0_CB00_0C30_3300);

/// Outgoing half of a station WebSocket.
pub type WsSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Incoming half of a station WebSocket.
pub type WsStream = Pin<Box<dyn Stream<Item = std::result::Result<Message, axum::Error>> + Send>>;

/// Timing and backend address shared by all bridges.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Backend `host:port`.
    pub pkfwd_addr: String,
    pub keepalive: Duration,
    pub stat_interval: u64,
    pub stat_delay: Duration,
    /// Pause between accepting a session and reading from it.
    pub settle_delay: Duration,
    /// Grace period for the downlink writer on stop.
    pub stop_timeout: Duration,
    /// Limit on closing a superseded or stopped session.
    pub close_timeout: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            pkfwd_addr: "localhost:1680".into(),
            keepalive: Duration::from_secs(10),
            stat_interval: 6,
            stat_delay: Duration::from_millis(300),
            settle_delay: Duration::from_millis(300),
            stop_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(2),
        }
    }
}

/// Station session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

/// The attached station WebSocket.
#[derive(Clone)]
struct LiveSocket {
    generation: u64,
    sink: Arc<tokio::sync::Mutex<WsSink>>,
    closed: Arc<Notify>,
    is_closed: Arc<AtomicBool>,
}

impl LiveSocket {
    fn new(generation: u64, sink: WsSink) -> Self {
        Self {
            generation,
            sink: Arc::new(tokio::sync::Mutex::new(sink)),
            closed: Arc::new(Notify::new()),
            is_closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::Acquire)
    }

    async fn send_text(&self, text: String) -> Result<()> {
        let mut sink = self.sink.lock().await;
        // Checked under the sink lock so nothing follows the close frame
        if self.is_closed() {
            return Err(BridgeError::Transport("session closed".into()));
        }
        sink.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&self, reason: &'static str) {
        self.is_closed.store(true, Ordering::Release);
        self.closed.notify_one();

        let mut sink = self.sink.lock().await;
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: Cow::Borrowed(reason),
        };
        let _ = sink.send(Message::Close(Some(frame))).await;
        let _ = sink.close().await;
    }
}

/// Per-gateway bridge between a station session and the backend.
pub struct RouterBridge {
    name: String,
    router: RouterId,
    config: Arc<RouterConfig>,
    pkfwd: PkFwdClient,
    stats: Arc<GatewayStats>,
    socket: parking_lot::Mutex<Option<LiveSocket>>,
    /// Serializes session attach so the old socket is closed before the new one is stored.
    attach: tokio::sync::Mutex<()>,
    generations: AtomicU64,
    writer: WriteCoalescer<Vec<DownlinkMessage>>,
    last_xtime: AtomicI64,
    last_rctx: AtomicI64,
    settle_delay: Duration,
    close_timeout: Duration,
}

impl RouterBridge {
    /// Connect to the backend and start the bridge.
    pub async fn start(
        router: RouterId,
        config: Arc<RouterConfig>,
        settings: &BridgeSettings,
    ) -> Result<Arc<Self>> {
        let socket = connect_socket(settings.pkfwd_addr.as_str())
            .await
            .map_err(|e| BridgeError::Transport(format!("{}: {}", settings.pkfwd_addr, e)))?;
        Ok(Self::with_socket(router, config, socket, settings))
    }

    /// Start the bridge on an already connected backend socket.
    pub fn with_socket(
        router: RouterId,
        config: Arc<RouterConfig>,
        socket: UdpSocket,
        settings: &BridgeSettings,
    ) -> Arc<Self> {
        let stats = Arc::new(GatewayStats::new());
        let client_settings = ClientSettings {
            gateway_id: config.gateway_id(),
            keepalive: settings.keepalive,
            stat_interval: settings.stat_interval,
            stat_delay: settings.stat_delay,
        };

        let bridge = Arc::new_cyclic(|weak: &Weak<Self>| {
            let on_pull_resp: PullRespHandler = {
                let weak = weak.clone();
                Arc::new(move |token, obj| {
                    if let Some(bridge) = weak.upgrade() {
                        bridge.on_pull_resp(token, obj);
                    }
                })
            };
            let pkfwd = PkFwdClient::new(
                format!("PkFwdC:{}", router),
                socket,
                client_settings,
                Arc::clone(&stats),
                on_pull_resp,
            );

            let writer = {
                let weak = weak.clone();
                WriteCoalescer::new(
                    format!("Router:{}:ws_write", router),
                    settings.stop_timeout,
                    move |batch: Vec<DownlinkMessage>| {
                        let bridge = weak.upgrade();
                        async move {
                            match bridge {
                                Some(bridge) => bridge.write_batch(batch).await,
                                None => Ok(()),
                            }
                        }
                    },
                )
            };

            Self {
                name: format!("Router:{}", router),
                router,
                config,
                pkfwd,
                stats,
                socket: parking_lot::Mutex::new(None),
                attach: tokio::sync::Mutex::new(()),
                generations: AtomicU64::new(0),
                writer,
                last_xtime: AtomicI64::new(0),
                last_rctx: AtomicI64::new(0),
                settle_delay: settings.settle_delay,
                close_timeout: settings.close_timeout,
            }
        });

        bridge.pkfwd.start();
        bridge.writer.start();
        info!("[{}] Started", bridge.name);
        bridge
    }

    pub fn router(&self) -> &RouterId {
        &self.router
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }

    pub fn pkfwd(&self) -> &PkFwdClient {
        &self.pkfwd
    }

    pub fn state(&self) -> SessionState {
        if self.socket.lock().is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// xtime of the most recent verified uplink.
    pub fn last_xtime(&self) -> i64 {
        self.last_xtime.load(Ordering::Acquire)
    }

    /// Antenna context of the most recent verified uplink.
    pub fn last_rctx(&self) -> i64 {
        self.last_rctx.load(Ordering::Acquire)
    }

    fn current_socket(&self) -> Option<LiveSocket> {
        self.socket.lock().clone()
    }

    /// Attach a station session and process it until it ends.
    ///
    /// A session already attached is closed first. Returns when the station
    /// disconnects, the stream fails, or a newer session supersedes this one.
    pub async fn on_connect(self: &Arc<Self>, sink: WsSink, mut stream: WsStream) {
        let generation = self.generations.fetch_add(1, Ordering::AcqRel) + 1;
        let live = LiveSocket::new(generation, sink);

        {
            let _attach = self.attach.lock().await;
            let previous = self.socket.lock().take();
            if let Some(previous) = previous {
                warn!(
                    "[{}] Already connected, switching to new connection",
                    self.name
                );
                self.close_socket(&previous, "superseded").await;
            }
            *self.socket.lock() = Some(live.clone());
        }
        info!("[{}] Station connected (session {})", self.name, generation);

        self.pkfwd.resume();
        tokio::time::sleep(self.settle_delay).await;

        match self.read_loop(&live, &mut stream).await {
            Ok(()) => info!("[{}] Session {} ended", self.name, generation),
            Err(e) => warn!("[{}] Session {} failed: {}", self.name, generation, e),
        }

        let detached = {
            let mut current = self.socket.lock();
            if current.as_ref().map(|s| s.generation) == Some(generation) {
                *current = None;
                true
            } else {
                false
            }
        };
        if detached {
            self.pkfwd.pause();
            info!("[{}] Disconnected", self.name);
        }
    }

    async fn read_loop(&self, live: &LiveSocket, stream: &mut WsStream) -> Result<()> {
        loop {
            if live.is_closed() {
                return Ok(());
            }
            let msg = tokio::select! {
                _ = live.closed.notified() => return Ok(()),
                msg = stream.next() => msg,
            };

            match msg {
                None => return Ok(()),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = self.handle_text(live, &text).await {
                        if e.is_transport() {
                            return Err(e);
                        }
                        warn!("[{}] Dropping message: {}", self.name, e);
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    info!("[{}] Station closed connection", self.name);
                    return Ok(());
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!("[{}] Binary messages not supported", self.name);
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
            }
        }
    }

    async fn handle_text(&self, live: &LiveSocket, text: &str) -> Result<()> {
        let msg: UplinkMessage = serde_json::from_str(text)?;
        debug!("[{}] on_ws: {}: {}", self.name, msg.kind(), text);

        match msg {
            UplinkMessage::Version(version) => {
                info!("[{}] Station version: {:?}", self.name, version);
                let reply = self.config.station_config_message();
                live.send_text(reply.to_string()).await
            }
            UplinkMessage::JoinRequest(jreq) => {
                self.stats.record_rx();
                let pdu = jreq.to_pdu();
                self.stats.record_rx_ok();
                self.forward_uplink(jreq.dr, jreq.freq, &jreq.upinfo, &pdu)
                    .await
            }
            UplinkMessage::DataFrame(frame) => {
                self.stats.record_rx();
                let pdu = frame.to_pdu()?;
                self.stats.record_rx_ok();
                self.forward_uplink(frame.dr, frame.freq, &frame.upinfo, &pdu)
                    .await
            }
            UplinkMessage::TxConfirmation(tx) => {
                self.stats.record_tx();
                self.pkfwd.push_tx_ack((tx.diid & 0xFFFF) as u16).await
            }
            UplinkMessage::Unknown => {
                info!("[{}] Ignoring message: {}", self.name, text);
                Ok(())
            }
        }
    }

    async fn forward_uplink(&self, dr: usize, freq: i64, upinfo: &UpInfo, pdu: &[u8]) -> Result<()> {
        let datr = self
            .config
            .datarates()
            .sfbw(dr)
            .ok_or_else(|| BridgeError::Translation(format!("unknown DR {}", dr)))?;
        let meta = UplinkMeta {
            rxtime: upinfo.rxtime,
            tmst: xtime_to_tmst(upinfo.xtime),
            chan: 0,
            rfch: 0,
            freq_hz: freq,
            datr: datr.to_string(),
            rssi: upinfo.rssi,
            snr: upinfo.snr,
        };
        self.pkfwd.push_rxpk(&meta, pdu).await?;

        self.stats.record_forwarded();
        self.last_xtime.store(upinfo.xtime, Ordering::Release);
        self.last_rctx.store(upinfo.rctx, Ordering::Release);
        Ok(())
    }

    async fn close_socket(&self, live: &LiveSocket, reason: &'static str) {
        if tokio::time::timeout(self.close_timeout, live.close(reason))
            .await
            .is_err()
        {
            warn!(
                "[{}] Session {} did not close within {:?}",
                self.name, live.generation, self.close_timeout
            );
        }
    }

    /// Handle a PULL_RESP from the backend.
    pub fn on_pull_resp(&self, token: u16, obj: Value) {
        let Some(txpk) = obj.get("txpk") else {
            info!("[{}] Unhandled PULL_RESP: {}", self.name, obj);
            return;
        };
        self.stats.record_downlink();

        let dnmsg = match self.build_downlink(token, txpk) {
            Ok(dnmsg) => dnmsg,
            Err(e) => {
                warn!("[{}] Dropping downlink {}: {}", self.name, token, e);
                return;
            }
        };
        if self.state() == SessionState::Disconnected {
            warn!(
                "[{}] No station connected, dropping downlink {}",
                self.name, token
            );
            return;
        }
        info!("[{}] dnmsg: {:?}", self.name, dnmsg);
        self.writer.send(dnmsg);
    }

    fn build_downlink(&self, token: u16, txpk: &Value) -> Result<DownlinkMessage> {
        let txpk: TxPk = serde_json::from_value(txpk.clone())?;
        let tmst = txpk.tmst.ok_or_else(|| {
            BridgeError::Translation("immediate downlinks (no tmst) are not supported".into())
        })?;
        let rx1_dr = self
            .config
            .datarates()
            .dr(&txpk.datr)
            .ok_or_else(|| BridgeError::Translation(format!("unknown datarate {}", txpk.datr)))?;
        let pdu = base64::engine::general_purpose::STANDARD
            .decode(&txpk.data)
            .map_err(|e| BridgeError::Translation(format!("txpk data: {}", e)))?;

        let rx_delay = self.config.rx_delay();
        Ok(DownlinkMessage {
            msgtype: DownlinkMessage::MSGTYPE,
            dev_eui: DOWNLINK_DEV_EUI,
            device_class: 0,
            diid: i64::from(token),
            dnmode: DownlinkMessage::DNMODE,
            pdu: hex::encode(pdu),
            rx_delay,
            rx1_dr,
            rx1_freq: (txpk.freq * 1e6).round() as i64,
            rx2_dr: self.config.rx2_dr(),
            rx2_freq: self.config.rx2_freq(),
            rctx: self.last_rctx(),
            xtime: reconstruct_xtime(self.last_xtime(), tmst, rx_delay),
            mux_time: lns::mux_time(),
            regionid: (self.config.hwspec() == "sim").then(|| self.config.region_id().clone()),
        })
    }

    async fn write_batch(&self, batch: Vec<DownlinkMessage>) -> Result<()> {
        for dnmsg in batch {
            let Some(socket) = self.current_socket() else {
                debug!("[{}] Station gone, dropping dnmsg {}", self.name, dnmsg.diid);
                continue;
            };
            let text = serde_json::to_string(&dnmsg)?;
            debug!("[{}] ws_write: {}", self.name, text);
            socket.send_text(text).await?;
        }
        Ok(())
    }

    /// Flush pending downlinks, close the session and stop the client.
    pub async fn stop(&self) -> Result<()> {
        let flushed = self.writer.stop().await;
        let live = self.socket.lock().take();
        if let Some(live) = live {
            self.close_socket(&live, "shutdown").await;
        }
        self.pkfwd.shutdown();
        info!("[{}] Stopped", self.name);
        flushed
    }
}

/// Low 32 bits of an xtime, as the backend's `tmst`.
pub fn xtime_to_tmst(xtime: i64) -> u32 {
    xtime as u32
}

/// Rebuild a downlink xtime: high 32 bits from the last uplink, low 32 bits
/// from `tmst` moved back by the RX delay.
pub fn reconstruct_xtime(last_xtime: i64, tmst: u32, rx_delay: u8) -> i64 {
    let low = tmst.wrapping_sub(u32::from(rx_delay) * 1_000_000);
    (last_xtime & !0xFFFF_FFFF) | i64::from(low)
}
