// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet-forwarder client for one gateway.
//!
//! Owns a connected UDP socket towards the backend and runs two tasks:
//! - a receive loop that decodes acks and PULL_RESP downlinks
//! - a pull loop that sends PULL_DATA keepalives and periodic `stat` reports
//!
//! The pull loop follows the station session: it is resumed when a station
//! connects and paused when it leaves. The receive loop lives as long as the
//! client.

use super::wire::{self, Datagram, RxPk, RxPkBody, Stat, StatBody, PROTOCOL_VERSION};
use crate::error::{BridgeError, Result};
use crate::stats::GatewayStats;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, ToSocketAddrs, UdpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lowest accepted uplink frequency (Hz).
const MIN_FREQUENCY_HZ: i64 = 100_000_000;

/// Called with (token, object) for every PULL_RESP.
pub type PullRespHandler = Arc<dyn Fn(u16, Value) + Send + Sync>;

/// Bind a UDP socket and connect it to the backend.
pub async fn connect_socket<A: ToSocketAddrs>(remote: A) -> io::Result<UdpSocket> {
    let remote = lookup_host(remote)
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "backend address did not resolve"))?;
    let local: SocketAddr = if remote.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(remote).await?;
    Ok(socket)
}

/// Client timing and identity.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Gateway id written into every PUSH_DATA/PULL_DATA/TX_ACK.
    pub gateway_id: u64,
    /// Interval between PULL_DATA keepalives.
    pub keepalive: Duration,
    /// Send a `stat` report every N keepalives (0 disables).
    pub stat_interval: u64,
    /// Delay between a PULL_DATA and the `stat` that follows it.
    pub stat_delay: Duration,
}

impl ClientSettings {
    pub fn new(gateway_id: u64) -> Self {
        Self {
            gateway_id,
            keepalive: Duration::from_secs(10),
            stat_interval: 6,
            stat_delay: Duration::from_millis(300),
        }
    }
}

/// Radio metadata for one uplink.
#[derive(Debug, Clone)]
pub struct UplinkMeta {
    /// Reception time, UTC seconds.
    pub rxtime: f64,
    /// Low 32 bits of the station xtime.
    pub tmst: u32,
    pub chan: u32,
    pub rfch: u32,
    /// Frequency in Hz.
    pub freq_hz: i64,
    /// Datarate as `SFxBWy`.
    pub datr: String,
    pub rssi: f64,
    pub snr: f64,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientCounters {
    pub push_data: u64,
    pub push_ack: u64,
    pub pull_data: u64,
    pub pull_ack_token: u16,
}

/// Packet-forwarder protocol client.
pub struct PkFwdClient {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    socket: UdpSocket,
    settings: ClientSettings,
    stats: Arc<GatewayStats>,
    on_pull_resp: PullRespHandler,
    push_data_counter: AtomicU64,
    push_ack_counter: AtomicU64,
    pull_data_counter: AtomicU64,
    pull_ack_token: AtomicU16,
    pull_task: Mutex<Option<JoinHandle<()>>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl PkFwdClient {
    /// Wrap a connected socket. Nothing runs until [`start`](Self::start).
    pub fn new(
        name: impl Into<String>,
        socket: UdpSocket,
        settings: ClientSettings,
        stats: Arc<GatewayStats>,
        on_pull_resp: PullRespHandler,
    ) -> Self {
        let name = name.into();
        info!(
            "[{}] Backend {} (gateway id {:016X})",
            name,
            socket
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "?".into()),
            settings.gateway_id
        );
        Self {
            inner: Arc::new(Inner {
                name,
                socket,
                settings,
                stats,
                on_pull_resp,
                push_data_counter: AtomicU64::new(0),
                push_ack_counter: AtomicU64::new(0),
                pull_data_counter: AtomicU64::new(0),
                pull_ack_token: AtomicU16::new(0),
                pull_task: Mutex::new(None),
                recv_task: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Spawn the receive loop.
    pub fn start(&self) {
        let mut task = self.inner.recv_task.lock();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        *task = Some(tokio::spawn(recv_loop(Arc::clone(&self.inner))));
    }

    /// Start the pull loop. No-op when it already runs.
    pub fn resume(&self) {
        let mut task = self.inner.pull_task.lock();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("[{}] Pull loop already running", self.inner.name);
            return;
        }
        *task = Some(tokio::spawn(pull_loop(Arc::clone(&self.inner))));
    }

    /// Stop the pull loop, keeping the socket open.
    pub fn pause(&self) {
        if let Some(handle) = self.inner.pull_task.lock().take() {
            handle.abort();
            debug!("[{}] Pull loop paused", self.inner.name);
        }
    }

    pub fn is_pulling(&self) -> bool {
        self.inner
            .pull_task
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop both loops.
    pub fn shutdown(&self) {
        self.pause();
        if let Some(handle) = self.inner.recv_task.lock().take() {
            handle.abort();
        }
    }

    /// Send one uplink as a PUSH_DATA `rxpk`. Returns the push token.
    pub async fn push_rxpk(&self, meta: &UplinkMeta, pdu: &[u8]) -> Result<u16> {
        if meta.freq_hz <= MIN_FREQUENCY_HZ {
            return Err(BridgeError::Translation(format!(
                "uplink frequency {} Hz out of range",
                meta.freq_hz
            )));
        }
        let rxpk = RxPk {
            time: rx_time(meta.rxtime),
            tmst: meta.tmst,
            chan: meta.chan,
            rfch: meta.rfch,
            freq: meta.freq_hz as f64 / 1e6,
            stat: 1,
            modu: "LORA".into(),
            datr: meta.datr.clone(),
            codr: "4/5".into(),
            rssi: meta.rssi.round() as i32,
            lsnr: meta.snr,
            size: pdu.len(),
            data: base64::engine::general_purpose::STANDARD.encode(pdu),
        };
        debug!("[{}] rxpk: {:?}", self.inner.name, rxpk);
        self.inner.push_data(&RxPkBody { rxpk: vec![rxpk] }).await
    }

    /// Confirm a transmitted downlink.
    pub async fn push_tx_ack(&self, token: u16) -> Result<()> {
        let buf = wire::encode_tx_ack(token, self.inner.settings.gateway_id);
        self.inner.socket.send(&buf).await?;
        info!("[{}] TX_ACK: token {}", self.inner.name, token);
        Ok(())
    }

    /// Send an arbitrary PUSH_DATA body.
    pub async fn push_data<T: Serialize>(&self, body: &T) -> Result<u16> {
        self.inner.push_data(body).await
    }

    /// Handle one datagram from the backend.
    pub fn on_datagram(&self, buf: &[u8]) {
        self.inner.on_datagram(buf);
    }

    pub fn counters(&self) -> ClientCounters {
        ClientCounters {
            push_data: self.inner.push_data_counter.load(Ordering::Relaxed),
            push_ack: self.inner.push_ack_counter.load(Ordering::Relaxed),
            pull_data: self.inner.pull_data_counter.load(Ordering::Relaxed),
            pull_ack_token: self.inner.pull_ack_token.load(Ordering::Relaxed),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.socket.local_addr()
    }
}

impl Drop for PkFwdClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    async fn push_data<T: Serialize>(&self, body: &T) -> Result<u16> {
        let n = self.push_data_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let token = (n % 65536) as u16;
        let buf = wire::encode_push_data(token, self.settings.gateway_id, body)?;
        self.socket.send(&buf).await?;
        debug!("[{}] PUSH_DATA: token {}, {} bytes", self.name, token, buf.len());
        Ok(token)
    }

    async fn pull_data(&self) -> Result<u16> {
        let n = self.pull_data_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let token = (n % 65536) as u16;
        self.socket
            .send(&wire::encode_pull_data(token, self.settings.gateway_id))
            .await?;
        debug!("[{}] PULL_DATA: token {}", self.name, token);
        Ok(token)
    }

    fn stat(&self) -> Stat {
        let stats = self.stats.snapshot();
        let pushed = self.push_data_counter.load(Ordering::Relaxed);
        let acked = self.push_ack_counter.load(Ordering::Relaxed);
        let ackr = if pushed == 0 {
            0.0
        } else {
            (1000.0 * acked as f64 / pushed as f64).round() / 10.0
        };
        Stat {
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            lati: 0.0,
            long: 0.0,
            alti: 0,
            rxnb: stats.rx_count,
            rxok: stats.rx_ok,
            rxfw: stats.rx_forwarded,
            ackr,
            dwnb: stats.downlink_count,
            txnb: stats.tx_count,
        }
    }

    fn on_datagram(&self, buf: &[u8]) {
        let (header, datagram) = match wire::decode(buf) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("[{}] Dropping datagram ({}): {}", self.name, e, hex::encode(buf));
                return;
            }
        };
        if header.version != PROTOCOL_VERSION {
            info!(
                "[{}] Unexpected protocol version {}: {}",
                self.name,
                header.version,
                hex::encode(buf)
            );
        }
        match datagram {
            Datagram::PushAck => {
                self.push_ack_counter.fetch_add(1, Ordering::Relaxed);
                debug!("[{}] PUSH_ACK: token {}", self.name, header.token);
            }
            Datagram::PullAck => {
                self.pull_ack_token.store(header.token, Ordering::Relaxed);
                debug!("[{}] PULL_ACK: token {}", self.name, header.token);
            }
            Datagram::PullResp(obj) => {
                info!("[{}] PULL_RESP: token {}, {}", self.name, header.token, obj);
                (self.on_pull_resp)(header.token, obj);
            }
            Datagram::Unexpected(kind) => {
                info!("[{}] Unexpected {}: {}", self.name, kind, hex::encode(buf));
            }
        }
    }
}

async fn recv_loop(inner: Arc<Inner>) {
    let mut buf = vec![0u8; 65536];
    loop {
        match inner.socket.recv(&mut buf).await {
            Ok(n) => inner.on_datagram(&buf[..n]),
            Err(e) => {
                // Connected UDP sockets surface ICMP unreachable here
                warn!("[{}] Receive error: {}", inner.name, e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn pull_loop(inner: Arc<Inner>) {
    let interval = inner.settings.stat_interval;
    loop {
        let token = match inner.pull_data().await {
            Ok(token) => Some(token),
            Err(e) => {
                error!("[{}] PULL_DATA failed: {}", inner.name, e);
                None
            }
        };

        let n = inner.pull_data_counter.load(Ordering::Relaxed);
        if interval > 0 && (n - 1) % interval == 0 {
            tokio::time::sleep(inner.settings.stat_delay).await;
            let stat = inner.stat();
            info!("[{}] stat: {:?}", inner.name, stat);
            if let Err(e) = inner.push_data(&StatBody { stat }).await {
                error!("[{}] Sending stat failed: {}", inner.name, e);
            }
        }

        tokio::time::sleep(inner.settings.keepalive).await;

        let acked = inner.pull_ack_token.load(Ordering::Relaxed);
        if let Some(token) = token {
            if acked != token {
                warn!(
                    "[{}] PULL_DATA/PULL_ACK mismatch (sent {}, acked {}), backend unreachable?",
                    inner.name, token, acked
                );
            }
        }
    }
}

fn rx_time(rxtime: f64) -> String {
    let secs = rxtime.floor();
    let nanos = ((rxtime - secs) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(secs as i64, nanos)
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkfwd::wire::{encode_pull_resp, Header, MessageType};
    use serde_json::json;

    async fn backend() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    async fn client_for(
        backend: &UdpSocket,
        settings: ClientSettings,
        handler: PullRespHandler,
    ) -> PkFwdClient {
        let socket = connect_socket(backend.local_addr().unwrap()).await.unwrap();
        PkFwdClient::new(
            "PkFwdC:test",
            socket,
            settings,
            Arc::new(GatewayStats::new()),
            handler,
        )
    }

    fn ignore() -> PullRespHandler {
        Arc::new(|_, _| {})
    }

    async fn recv(backend: &UdpSocket) -> Vec<u8> {
        let mut buf = vec![0u8; 4096];
        let n = tokio::time::timeout(Duration::from_secs(2), backend.recv(&mut buf))
            .await
            .expect("datagram expected")
            .unwrap();
        buf.truncate(n);
        buf
    }

    fn meta() -> UplinkMeta {
        UplinkMeta {
            rxtime: 1_700_000_000.25,
            tmst: 123_456,
            chan: 0,
            rfch: 0,
            freq_hz: 868_100_000,
            datr: "SF7BW125".into(),
            rssi: -42.4,
            snr: 9.5,
        }
    }

    #[tokio::test]
    async fn test_push_rxpk() {
        let backend = backend().await;
        let client = client_for(&backend, ClientSettings::new(0xAA55), ignore()).await;

        let token = client.push_rxpk(&meta(), &[1, 2, 3]).await.unwrap();
        assert_eq!(token, 1);

        let buf = recv(&backend).await;
        let header = Header::decode(&buf).unwrap();
        assert_eq!(header.kind, MessageType::PushData);
        assert_eq!(header.token, 1);
        assert_eq!(u64::from_be_bytes(buf[4..12].try_into().unwrap()), 0xAA55);

        let body: RxPkBody = serde_json::from_slice(&buf[12..]).unwrap();
        let rxpk = &body.rxpk[0];
        assert_eq!(rxpk.tmst, 123_456);
        assert_eq!(rxpk.freq, 868.1);
        assert_eq!(rxpk.datr, "SF7BW125");
        assert_eq!(rxpk.rssi, -42);
        assert_eq!(rxpk.size, 3);
        assert_eq!(rxpk.data, "AQID");
        assert_eq!(rxpk.time, "2023-11-14T22:13:20.250000Z");
        assert_eq!(client.counters().push_data, 1);
    }

    #[tokio::test]
    async fn test_rejects_low_frequency() {
        let backend = backend().await;
        let client = client_for(&backend, ClientSettings::new(1), ignore()).await;

        let mut m = meta();
        m.freq_hz = 100_000_000;
        let err = client.push_rxpk(&m, &[0]).await.unwrap_err();
        assert!(matches!(err, BridgeError::Translation(_)));
        assert_eq!(client.counters().push_data, 0);
    }

    #[tokio::test]
    async fn test_push_token_wraps() {
        let backend = backend().await;
        let client = client_for(&backend, ClientSettings::new(1), ignore()).await;
        client.inner.push_data_counter.store(65534, Ordering::Relaxed);

        assert_eq!(client.push_data(&json!({})).await.unwrap(), 65535);
        assert_eq!(client.push_data(&json!({})).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pull_loop_sends_keepalive_and_stat() {
        let backend = backend().await;
        let settings = ClientSettings {
            gateway_id: 7,
            keepalive: Duration::from_secs(60),
            stat_interval: 6,
            stat_delay: Duration::from_millis(10),
        };
        let client = client_for(&backend, settings, ignore()).await;

        client.resume();
        client.resume();
        assert!(client.is_pulling());

        let pull = recv(&backend).await;
        assert_eq!(Header::decode(&pull).unwrap(), Header::new(1, MessageType::PullData));

        let push = recv(&backend).await;
        assert_eq!(Header::decode(&push).unwrap().kind, MessageType::PushData);
        let body: StatBody = serde_json::from_slice(&push[12..]).unwrap();
        assert_eq!(body.stat.ackr, 0.0);
        assert_eq!(body.stat.rxnb, 0);

        client.pause();
        assert!(!client.is_pulling());
        assert_eq!(client.counters().pull_data, 1);
    }

    #[tokio::test]
    async fn test_ack_ratio() {
        let backend = backend().await;
        let client = client_for(&backend, ClientSettings::new(1), ignore()).await;

        for _ in 0..3 {
            client.push_data(&json!({})).await.unwrap();
        }
        client.on_datagram(&[2, 0, 1, 1]);
        client.on_datagram(&[2, 0, 2, 1]);

        assert_eq!(client.counters().push_ack, 2);
        assert_eq!(client.inner.stat().ackr, 66.7);
    }

    #[tokio::test]
    async fn test_pull_resp_dispatch() {
        let backend = backend().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: PullRespHandler = Arc::new(move |token, obj| sink.lock().push((token, obj)));
        let client = client_for(&backend, ClientSettings::new(1), handler).await;
        client.start();

        let resp = encode_pull_resp(77, &json!({"txpk": {"data": "AA=="}})).unwrap();
        let port = client.local_addr().unwrap().port();
        backend.send_to(&resp, ("127.0.0.1", port)).await.unwrap();

        for _ in 0..50 {
            if !seen.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 77);
        assert_eq!(seen[0].1["txpk"]["data"], "AA==");
    }

    #[tokio::test]
    async fn test_acks_and_bad_datagrams() {
        let backend = backend().await;
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let handler: PullRespHandler = Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        let client = client_for(&backend, ClientSettings::new(1), handler).await;

        client.on_datagram(&[2, 0x01, 0x02, 4]);
        assert_eq!(client.counters().pull_ack_token, 0x0102);

        // Wrong version is still dispatched
        client.on_datagram(&[1, 0, 5, 3, b'{', b'}']);
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        client.on_datagram(&[2, 0]);
        client.on_datagram(&[2, 0, 0, 42]);
        client.on_datagram(&[2, 0, 0, 3, b'x']);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(client.counters().push_ack, 0);
    }
}
