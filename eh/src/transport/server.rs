//! TCP server for modules and operators
//!
//! Each connection gets a reader that feeds the coordinator and a writer
//! task fed by a per-connection queue. A connection is registered under a
//! device id as soon as it sends a line naming one; commands for that device
//! go to the most recent such connection.
//!
//! Liveness signals carry the instant their line arrived, taken from the
//! server's [`Clock`], so queueing delay in front of the coordinator does not
//! count against a module. Lines longer than [`MAX_LINE_SIZE`] are discarded
//! without being buffered in full.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use eyre::{Context, Result, eyre};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use super::protocol::{Inbound, MAX_LINE_SIZE, OperatorAction, classify};
use crate::clock::{Clock, SystemClock};
use crate::coordinator::{CoordinatorHandle, HubError};
use crate::dispatch::Publisher;
use crate::domain::DeviceId;

type PeerRegistry = Arc<Mutex<HashMap<DeviceId, mpsc::Sender<String>>>>;

/// Publish primitive backed by the live TCP connections
#[derive(Clone, Default)]
pub struct TcpPublisher {
    peers: PeerRegistry,
}

impl TcpPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices that currently have a connection registered
    #[cfg(test)]
    pub(crate) async fn registered(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.peers.lock().await.keys().copied().collect();
        ids.sort();
        ids
    }

    async fn register(&self, device: DeviceId, tx: mpsc::Sender<String>) {
        if let Some(old) = self.peers.lock().await.insert(device, tx)
            && !old.is_closed()
        {
            debug!(%device, "TcpPublisher: replaced existing connection");
        }
    }

    async fn unregister(&self, device: DeviceId, tx: &mpsc::Sender<String>) {
        let mut peers = self.peers.lock().await;
        if peers.get(&device).is_some_and(|current| current.same_channel(tx)) {
            peers.remove(&device);
        }
    }
}

#[async_trait]
impl Publisher for TcpPublisher {
    async fn publish(&self, device: DeviceId, payload: &Value) -> Result<()> {
        let line = serde_json::to_string(payload).context("Failed to serialize payload")?;
        let tx = self
            .peers
            .lock()
            .await
            .get(&device)
            .cloned()
            .ok_or_else(|| eyre!("Device {} has no connection", device))?;

        tx.try_send(line)
            .map_err(|e| eyre!("Queue for device {} unavailable: {}", device, e))
    }
}

/// Accepts connections and feeds their lines to the coordinator
pub struct Server {
    listener: TcpListener,
    handle: CoordinatorHandle,
    publisher: TcpPublisher,
    peer_buffer: usize,
    clock: Arc<dyn Clock>,
}

impl Server {
    /// Bind the listening socket
    pub async fn bind(addr: &str, handle: CoordinatorHandle, publisher: TcpPublisher, peer_buffer: usize) -> Result<Self> {
        debug!(%addr, "Server::bind: called");
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        Ok(Self {
            listener,
            handle,
            publisher,
            peer_buffer: peer_buffer.max(1),
            clock: Arc::new(SystemClock),
        })
    }

    /// Stamp arrivals with a different clock; must match the coordinator's
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("Failed to read local address")
    }

    /// Accept connections until shutdown is signalled
    pub async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "Server listening");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "Server: accepted connection");
                            let conn = Connection {
                                handle: self.handle.clone(),
                                publisher: self.publisher.clone(),
                                peer,
                                buffer: self.peer_buffer,
                                clock: self.clock.clone(),
                            };
                            tokio::spawn(conn.serve(stream));
                        }
                        Err(e) => warn!(error = %e, "Failed to accept connection"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

struct Connection {
    handle: CoordinatorHandle,
    publisher: TcpPublisher,
    peer: SocketAddr,
    buffer: usize,
    clock: Arc<dyn Clock>,
}

/// One read from a connection
#[derive(Debug, PartialEq)]
enum LineRead {
    Line(String),
    TooLong,
    Eof,
}

/// Read one newline-terminated line, holding at most `MAX_LINE_SIZE + 1` bytes
///
/// The remainder of an oversized line is consumed and dropped.
async fn read_bounded_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let limit = MAX_LINE_SIZE as u64 + 1;
    buf.clear();
    if (&mut *reader).take(limit).read_until(b'\n', buf).await? == 0 {
        return Ok(LineRead::Eof);
    }

    if buf.last() != Some(&b'\n') && buf.len() > MAX_LINE_SIZE {
        loop {
            buf.clear();
            let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
            if n == 0 || buf.last() == Some(&b'\n') {
                break;
            }
        }
        buf.clear();
        return Ok(LineRead::TooLong);
    }

    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(LineRead::Line(String::from_utf8_lossy(buf).into_owned()))
}

impl Connection {
    async fn serve(self, stream: TcpStream) {
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel::<String>(self.buffer);
        let writer = tokio::spawn(write_lines(write_half, rx, self.peer));

        let mut reader = BufReader::new(read_half);
        let mut buf = Vec::new();
        let mut identified: Option<DeviceId> = None;

        loop {
            let line = match read_bounded_line(&mut reader, &mut buf).await {
                Ok(LineRead::Line(line)) => line,
                Ok(LineRead::TooLong) => {
                    warn!(peer = %self.peer, max = MAX_LINE_SIZE, "Dropping oversized line");
                    continue;
                }
                Ok(LineRead::Eof) => break,
                Err(e) => {
                    debug!(peer = %self.peer, error = %e, "Connection: read failed");
                    break;
                }
            };
            let arrived = self.clock.now();
            if line.trim().is_empty() {
                continue;
            }

            let inbound = match classify(&line, identified) {
                Ok(inbound) => inbound,
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "Dropping malformed line");
                    continue;
                }
            };

            if let Some(device) = inbound.device()
                && identified != Some(device)
            {
                if let Some(previous) = identified {
                    self.publisher.unregister(previous, &tx).await;
                }
                info!(peer = %self.peer, %device, "Connection identified");
                self.publisher.register(device, tx.clone()).await;
                identified = Some(device);
            }

            if let Err(e) = self.forward(inbound, arrived).await {
                warn!(peer = %self.peer, error = %e, "Coordinator unavailable, closing connection");
                break;
            }
        }

        if let Some(device) = identified {
            self.publisher.unregister(device, &tx).await;
        }
        drop(tx);
        let _ = writer.await;
        debug!(peer = %self.peer, ?identified, "Connection closed");
    }

    async fn forward(&self, inbound: Inbound, arrived: Instant) -> Result<(), HubError> {
        match inbound {
            Inbound::Announce(device) => self.handle.announce(device).await,
            Inbound::Heartbeat(device) | Inbound::Other { device, .. } => {
                self.handle.liveness_signal_at(device, arrived).await
            }
            Inbound::TaskCompleted { device, task } => {
                self.handle.liveness_signal_at(device, arrived).await?;
                self.handle.task_completed(task).await
            }
            Inbound::TimerFinished(device) => {
                self.handle.liveness_signal_at(device, arrived).await?;
                self.handle.timer_expired().await
            }
            Inbound::Operator(OperatorAction::Pause) => self.handle.manual_pause().await,
            Inbound::Operator(OperatorAction::Resume) => self.handle.manual_resume().await,
            Inbound::Operator(OperatorAction::Reset) => self.handle.reset().await,
        }
    }
}

async fn write_lines(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<String>, peer: SocketAddr) {
    while let Some(line) = rx.recv().await {
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            debug!(%peer, error = %e, "Connection: write failed");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::coordinator::CoordRequest;
    use serde_json::json;

    async fn start(publisher: TcpPublisher) -> (SocketAddr, mpsc::Receiver<CoordRequest>, mpsc::Sender<()>) {
        let (coord_tx, coord_rx) = mpsc::channel(32);
        let handle = CoordinatorHandle::new(coord_tx);
        let server = Server::bind("127.0.0.1:0", handle, publisher, 8).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        tokio::spawn(server.run(shutdown_rx));
        (addr, coord_rx, shutdown_tx)
    }

    async fn recv(rx: &mut mpsc::Receiver<CoordRequest>) -> CoordRequest {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_lines_are_forwarded_in_order() {
        let (addr, mut coord_rx, _shutdown) = start(TcpPublisher::new()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream
            .write_all(b"{\"device\":\"esp3\",\"type\":\"CONNECTED\"}\nnot json\n{\"type\":\"MAZE_COMPLETED\"}\n")
            .await
            .unwrap();

        assert!(matches!(recv(&mut coord_rx).await, CoordRequest::Announce { device: DeviceId::Maze }));
        assert!(matches!(
            recv(&mut coord_rx).await,
            CoordRequest::Signal {
                device: DeviceId::Maze,
                ..
            }
        ));
        assert!(matches!(
            recv(&mut coord_rx).await,
            CoordRequest::TaskCompleted {
                task: crate::domain::TaskId::Maze
            }
        ));
    }

    #[tokio::test]
    async fn test_signals_carry_arrival_time() {
        let clock = crate::clock::ManualClock::new();
        let (coord_tx, mut coord_rx) = mpsc::channel(32);
        let server = Server::bind("127.0.0.1:0", CoordinatorHandle::new(coord_tx), TcpPublisher::new(), 8)
            .await
            .unwrap()
            .with_clock(Arc::new(clock.clone()));
        let addr = server.local_addr().unwrap();
        let (_shutdown, shutdown_rx) = mpsc::channel(1);
        tokio::spawn(server.run(shutdown_rx));

        clock.advance(Duration::from_secs(7));
        let expected = clock.now();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"{\"device\":\"timer\",\"type\":\"HEARTBEAT\"}\n")
            .await
            .unwrap();

        match recv(&mut coord_rx).await {
            CoordRequest::Signal { device, at } => {
                assert_eq!(device, DeviceId::Timer);
                assert_eq!(at, Some(expected));
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        let (addr, mut coord_rx, _shutdown) = start(TcpPublisher::new()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let flood = vec![b'x'; MAX_LINE_SIZE * 3];
        stream.write_all(&flood).await.unwrap();
        stream
            .write_all(b"\n{\"device\":\"wire\",\"type\":\"CONNECTED\"}\n")
            .await
            .unwrap();

        assert!(matches!(recv(&mut coord_rx).await, CoordRequest::Announce { device: DeviceId::Wire }));
    }

    #[tokio::test]
    async fn test_read_bounded_line() {
        let mut input = Vec::new();
        input.extend_from_slice(b"first\r\n");
        input.extend(std::iter::repeat_n(b'y', MAX_LINE_SIZE + 1));
        input.extend_from_slice(b"\nsecond");
        let mut reader = BufReader::new(input.as_slice());
        let mut buf = Vec::new();

        assert_eq!(
            read_bounded_line(&mut reader, &mut buf).await.unwrap(),
            LineRead::Line("first".to_string())
        );
        assert_eq!(read_bounded_line(&mut reader, &mut buf).await.unwrap(), LineRead::TooLong);
        assert_eq!(
            read_bounded_line(&mut reader, &mut buf).await.unwrap(),
            LineRead::Line("second".to_string())
        );
        assert_eq!(read_bounded_line(&mut reader, &mut buf).await.unwrap(), LineRead::Eof);
    }

    #[tokio::test]
    async fn test_operator_line() {
        let (addr, mut coord_rx, _shutdown) = start(TcpPublisher::new()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream
            .write_all(b"{\"type\":\"OPERATOR\",\"action\":\"pause\"}\n")
            .await
            .unwrap();
        assert!(matches!(recv(&mut coord_rx).await, CoordRequest::ManualPause));
    }

    #[tokio::test]
    async fn test_publish_reaches_registered_connection() {
        let publisher = TcpPublisher::new();
        let (addr, mut coord_rx, _shutdown) = start(publisher.clone()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(b"{\"device\":\"button\",\"type\":\"HEARTBEAT\"}\n")
            .await
            .unwrap();
        recv(&mut coord_rx).await;
        assert_eq!(publisher.registered().await, vec![DeviceId::Button]);

        publisher
            .publish(DeviceId::Button, &json!({"type": "PAUSE"}))
            .await
            .unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let line = tokio::time::timeout(Duration::from_secs(1), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "PAUSE");
    }

    #[tokio::test]
    async fn test_publish_to_unconnected_device_fails() {
        let publisher = TcpPublisher::new();
        assert!(publisher.publish(DeviceId::Wire, &json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_disconnect_unregisters() {
        let publisher = TcpPublisher::new();
        let (addr, mut coord_rx, _shutdown) = start(publisher.clone()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"{\"device\":\"wire\",\"type\":\"HEARTBEAT\"}\n")
            .await
            .unwrap();
        recv(&mut coord_rx).await;
        drop(stream);

        for _ in 0..50 {
            if publisher.registered().await.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("connection was not unregistered");
    }
}
