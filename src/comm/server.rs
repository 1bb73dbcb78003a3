use crate::comm::config::CommConfig;
use crate::comm::error::{CommError, CommInitError};
use crate::comm::protocol::{
    HEADER_LEN, decode_header, decode_request_payload, encode_request_ack, encode_response,
};
use crate::comm::types::{MsgType, OperationRequest};
use crate::envelope::ResultEnvelope;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::result::Result as StdResult;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Sequence deduplication entry
#[derive(Debug)]
struct DedupEntry {
    /// When this entry was created
    instant: Instant,
    /// Cached response to resend if duplicate
    cached_response: Option<Vec<u8>>,
}

type DedupTable = Arc<Mutex<HashMap<SocketAddr, HashMap<u32, DedupEntry>>>>;

/// Comm server - receives operations over UDP and returns their envelopes
pub struct Comm {
    socket: Arc<UdpSocket>,
    config: CommConfig,
    /// Channel sender to forward requests to main loop
    loop_sender: mpsc::Sender<OperationRequest>,
    /// Sequence deduplication table per client
    dedup: DedupTable,
}

impl Comm {
    /// Get local socket address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Create a new Comm instance and bind UDP socket.
    /// Returns the comm instance and the receiver the main loop reads from
    pub async fn new(
        config: CommConfig,
    ) -> StdResult<(Comm, mpsc::Receiver<OperationRequest>), CommInitError> {
        let socket = UdpSocket::bind(config.bind_addr()?)
            .await
            .map_err(|e| CommInitError::BindFailed(e.to_string()))?;

        if let Ok(addr) = socket.local_addr() {
            info!(addr = %addr, "comm listening");
        }

        let (tx, rx) = mpsc::channel(1024);

        Ok((
            Self {
                socket: Arc::new(socket),
                config,
                loop_sender: tx,
                dedup: Arc::new(Mutex::new(HashMap::new())),
            },
            rx,
        ))
    }

    /// Run the Comm server
    pub async fn run(self) -> StdResult<(), CommError> {
        let mut buf = vec![0u8; self.config.max_payload_bytes + 1024]; // Extra space for header
        let mut cleanup_interval = tokio::time::interval(Duration::from_secs(
            self.config.dedup_cleanup_interval_secs.max(1),
        ));

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, addr)) => {
                            let packet = &buf[..len];
                            if let Err(e) = self.handle_packet(packet, addr).await {
                                warn!(client = %addr, error = %e, "failed to handle packet");
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "recv error");
                            return Err(CommError::RecvError(e.to_string()));
                        }
                    }
                }
                _ = cleanup_interval.tick() => {
                    self.cleanup_dedup().await;
                }
            }
        }
    }

    async fn handle_packet(
        &self,
        packet: &[u8],
        client_addr: SocketAddr,
    ) -> StdResult<(), CommError> {
        if packet.len() < HEADER_LEN {
            warn!(client = %client_addr, len = packet.len(), "truncated packet");
            return Err(CommError::DecodeError("Packet too short".to_string()));
        }

        let payload_len = packet.len() - HEADER_LEN;
        if payload_len > self.config.max_payload_bytes {
            warn!(client = %client_addr, len = payload_len, "payload too large");
            return Err(CommError::PayloadTooLarge(payload_len));
        }

        let (msg_type, seq) = decode_header(packet)?;
        let payload = &packet[HEADER_LEN..];

        debug!(msg_type = msg_type as u8, client = %client_addr, seq = seq, "packet received");

        match msg_type {
            MsgType::Request => self.handle_request(payload, seq, client_addr).await,
            _ => {
                warn!(msg_type = msg_type as u8, client = %client_addr, "unexpected message type");
                Ok(())
            }
        }
    }

    /// New requests are acked and handed off; duplicates get the cached
    /// response, or another ack while the original is still running
    async fn handle_request(
        &self,
        payload_bytes: &[u8],
        seq: u32,
        client_addr: SocketAddr,
    ) -> StdResult<(), CommError> {
        let mut dedup = self.dedup.lock().await;
        let client_entries = dedup.entry(client_addr).or_default();

        if client_entries.len() >= self.config.dedup_capacity
            && !client_entries.contains_key(&seq)
        {
            let oldest_seq = client_entries
                .iter()
                .min_by_key(|(_, e)| e.instant)
                .map(|(seq, _)| *seq);
            if let Some(seq_to_remove) = oldest_seq {
                client_entries.remove(&seq_to_remove);
                debug!(seq = seq_to_remove, "dedup table at capacity, removed oldest entry");
            }
        }

        match client_entries.entry(seq) {
            Entry::Occupied(entry) => {
                let reply = match &entry.get().cached_response {
                    Some(cached) => {
                        info!(seq = seq, client = %client_addr, "duplicate request, resending cached response");
                        cached.clone()
                    }
                    None => {
                        debug!(seq = seq, client = %client_addr, "duplicate request still running, sending ACK");
                        encode_request_ack(seq)?
                    }
                };
                drop(dedup);
                self.send(&reply, client_addr).await
            }
            Entry::Vacant(entry) => {
                // Registered before decoding so retries during processing are recognized
                entry.insert(DedupEntry {
                    instant: Instant::now(),
                    cached_response: None,
                });
                drop(dedup);

                let request_payload = match decode_request_payload(payload_bytes) {
                    Ok(payload) => payload,
                    Err(e) => {
                        let response = encode_response(
                            seq,
                            &ResultEnvelope::failure(format!("Invalid request: {}", e)),
                        )?;
                        self.send(&response, client_addr).await?;
                        self.cache_response(client_addr, seq, response).await;
                        return Err(e);
                    }
                };

                info!(
                    seq = seq,
                    client = %client_addr,
                    operation = request_payload.operation.name(),
                    "new request"
                );

                let ack = encode_request_ack(seq)?;
                self.send(&ack, client_addr).await?;
                debug!(seq = seq, client = %client_addr, "sent REQUEST_ACK");

                let (reply_tx, reply_rx) = oneshot::channel::<ResultEnvelope>();
                let request = OperationRequest {
                    operation: request_payload.operation,
                    reply: reply_tx,
                    source_addr: client_addr,
                };

                if let Err(e) = self.loop_sender.send(request).await {
                    error!(error = %e, "failed to send request to main loop");
                    let response =
                        encode_response(seq, &ResultEnvelope::failure("Internal server error"))?;
                    self.send(&response, client_addr).await?;
                    return Err(CommError::ChannelClosed);
                }

                let responder = Responder {
                    socket: Arc::clone(&self.socket),
                    dedup: Arc::clone(&self.dedup),
                    response_timeout: Duration::from_secs(self.config.response_timeout_secs),
                    max_response_bytes: self.config.max_response_bytes,
                    spill_dir: self.config.spill_dir.clone(),
                };
                tokio::spawn(async move {
                    if let Err(e) = responder.respond(seq, client_addr, reply_rx).await {
                        warn!(seq = seq, client = %client_addr, error = %e, "failed to send response");
                    }
                });

                Ok(())
            }
        }
    }

    async fn send(&self, bytes: &[u8], client_addr: SocketAddr) -> StdResult<(), CommError> {
        self.socket
            .send_to(bytes, client_addr)
            .await
            .map(|_| ())
            .map_err(|e| CommError::SendError(e.to_string()))
    }

    async fn cache_response(&self, client_addr: SocketAddr, seq: u32, response: Vec<u8>) {
        cache_response(&self.dedup, client_addr, seq, response).await;
    }

    /// Cleanup expired entries from deduplication table
    async fn cleanup_dedup(&self) {
        let mut dedup = self.dedup.lock().await;
        let ttl = Duration::from_secs(self.config.dedup_ttl_secs);
        prune_expired(&mut dedup, ttl, Instant::now());
        debug!(clients = dedup.len(), "dedup table cleaned");
    }
}

/// Drop answered entries older than `ttl`. Pending entries stay until their
/// response is cached, so a retransmit never starts the operation again.
fn prune_expired(
    table: &mut HashMap<SocketAddr, HashMap<u32, DedupEntry>>,
    ttl: Duration,
    now: Instant,
) {
    for entries in table.values_mut() {
        entries.retain(|_seq, entry| {
            entry.cached_response.is_none() || now.duration_since(entry.instant) < ttl
        });
    }
    table.retain(|_addr, entries| !entries.is_empty());
}

/// Waits for one request's envelope off the receive loop and sends it
struct Responder {
    socket: Arc<UdpSocket>,
    dedup: DedupTable,
    response_timeout: Duration,
    max_response_bytes: usize,
    spill_dir: PathBuf,
}

impl Responder {
    async fn respond(
        self,
        seq: u32,
        client_addr: SocketAddr,
        reply_rx: oneshot::Receiver<ResultEnvelope>,
    ) -> StdResult<(), CommError> {
        let envelope = match timeout(self.response_timeout, reply_rx).await {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(_)) => {
                warn!(seq = seq, "channel closed without response");
                ResultEnvelope::failure("No response from handler")
            }
            Err(_) => {
                warn!(seq = seq, "timeout waiting for response");
                ResultEnvelope::failure("Response timeout")
            }
        };

        // Cached before sending: a retransmit must never start the operation again
        let response = self.fit_response(seq, &envelope).await?;
        cache_response(&self.dedup, client_addr, seq, response.clone()).await;

        self.socket
            .send_to(&response, client_addr)
            .await
            .map_err(|e| CommError::SendError(e.to_string()))?;
        debug!(seq = seq, client = %client_addr, success = envelope.success, "sent RESPONSE");
        Ok(())
    }

    /// Encode `envelope`; if it does not fit one datagram, write it to the
    /// spill directory and send its location instead
    async fn fit_response(&self, seq: u32, envelope: &ResultEnvelope) -> StdResult<Vec<u8>, CommError> {
        let response = encode_response(seq, envelope)?;
        if response.len() <= self.max_response_bytes {
            return Ok(response);
        }

        let bytes = response.len();
        warn!(seq = seq, bytes = bytes, limit = self.max_response_bytes, "response exceeds datagram limit, spilling to file");

        let replacement = match spill_envelope(&self.spill_dir, envelope).await {
            Ok(path) => {
                info!(seq = seq, path = %path.display(), "response spilled");
                envelope.spilled(&path, bytes)
            }
            Err(e) => {
                error!(seq = seq, dir = %self.spill_dir.display(), error = %e, "failed to spill response");
                ResultEnvelope::failure(format!("Response too large ({} bytes)", bytes))
            }
        };
        encode_response(seq, &replacement)
    }
}

/// Write the full envelope as JSON; returns the file written
async fn spill_envelope(dir: &Path, envelope: &ResultEnvelope) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("response-{}.json", Uuid::new_v4()));
    let content = serde_json::to_vec(envelope).map_err(std::io::Error::other)?;
    tokio::fs::write(&path, content).await?;
    Ok(path)
}

async fn cache_response(dedup: &DedupTable, client_addr: SocketAddr, seq: u32, response: Vec<u8>) {
    let mut dedup = dedup.lock().await;
    dedup.entry(client_addr).or_default().insert(
        seq,
        DedupEntry {
            instant: Instant::now(),
            cached_response: Some(response),
        },
    );
}
