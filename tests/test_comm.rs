// Integration tests for Comm module
// This file should be run with cargo test --test test_comm
#![allow(dead_code)]

#[path = "../src/comm/mod.rs"]
mod comm;
#[path = "../src/envelope.rs"]
mod envelope;
#[path = "../src/operation.rs"]
mod operation;
#[path = "../src/settings/mod.rs"]
mod settings;

use comm::protocol::{HEADER_LEN, decode_response_payload, encode_packet};
use comm::types::{MsgType, RequestPayload};
use envelope::ResultEnvelope;
use operation::Operation;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    });
}

fn test_config() -> comm::CommConfig {
    comm::CommConfig {
        listen_addr: "127.0.0.1".to_string(),
        listen_port: 0,
        response_timeout_secs: 5,
        spill_dir: std::env::temp_dir().join(format!("syshardn-spill-{}", uuid::Uuid::new_v4())),
        ..Default::default()
    }
}

/// A check report far larger than one datagram
fn oversized_report() -> serde_json::Value {
    json!({"summary": {"total": 500}, "results": "x".repeat(80_000)})
}

fn encode_request(seq: u32, operation: Operation) -> Vec<u8> {
    encode_packet(MsgType::Request, seq, Some(&RequestPayload { operation })).unwrap()
}

/// Start a server; returns its address and the main-loop receiver
async fn start_server(
    config: comm::CommConfig,
) -> (SocketAddr, mpsc::Receiver<comm::OperationRequest>) {
    let (comm, loop_rx) = comm::Comm::new(config).await.unwrap();
    let addr = comm.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = comm.run().await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, loop_rx)
}

async fn recv_packet(client: &UdpSocket, buf: &mut [u8]) -> (MsgType, u32, usize) {
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(buf))
        .await
        .unwrap()
        .unwrap();
    let msg_type = MsgType::from_u8(buf[0]).unwrap();
    let seq = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
    (msg_type, seq, len)
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_normal_request_response() {
        init_tracing();
        let (addr, mut loop_rx) = start_server(test_config()).await;

        tokio::spawn(async move {
            if let Some(req) = loop_rx.recv().await {
                assert_eq!(req.operation, Operation::ListRules);
                req.reply
                    .send(ResultEnvelope::ok(json!([{"id": "R-1"}])))
                    .ok();
            }
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(addr).await.unwrap();
        client.send(&encode_request(1, Operation::ListRules)).await.unwrap();

        let mut buf = vec![0u8; 65536];
        let (msg_type, seq, _) = recv_packet(&client, &mut buf).await;
        assert_eq!(msg_type, MsgType::RequestAck);
        assert_eq!(seq, 1);

        let (msg_type, seq, len) = recv_packet(&client, &mut buf).await;
        assert_eq!(msg_type, MsgType::Response);
        assert_eq!(seq, 1);
        let envelope = decode_response_payload(&buf[HEADER_LEN..len]).unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.data, Some(json!([{"id": "R-1"}])));
    }

    #[tokio::test]
    async fn test_duplicate_request_dedup() {
        init_tracing();
        let (addr, mut loop_rx) = start_server(test_config()).await;

        let (seen_tx, mut seen_rx) = mpsc::channel::<&'static str>(10);
        tokio::spawn(async move {
            while let Some(req) = loop_rx.recv().await {
                let _ = seen_tx.send(req.operation.name()).await;
                let _ = req.reply.send(ResultEnvelope::done());
            }
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(addr).await.unwrap();
        let packet = encode_request(1, Operation::Cancel);
        client.send(&packet).await.unwrap();

        let mut buf = vec![0u8; 65536];
        assert_eq!(recv_packet(&client, &mut buf).await.0, MsgType::RequestAck);
        assert_eq!(recv_packet(&client, &mut buf).await.0, MsgType::Response);

        // Retransmission gets the cached response, not a second dispatch
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.send(&packet).await.unwrap();
        assert_eq!(recv_packet(&client, &mut buf).await.0, MsgType::Response);

        let mut received = Vec::new();
        while let Ok(Some(name)) =
            tokio::time::timeout(Duration::from_millis(100), seen_rx.recv()).await
        {
            received.push(name);
        }
        assert_eq!(received, vec!["cancel"]);
    }

    #[tokio::test]
    async fn test_slow_request_does_not_block_others() {
        init_tracing();
        let (addr, mut loop_rx) = start_server(test_config()).await;

        // Hold the scan open; answer everything else immediately
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Some(req) = loop_rx.recv().await {
                match req.operation {
                    Operation::Check(_) => held.push(req.reply),
                    _ => {
                        let _ = req.reply.send(ResultEnvelope::done());
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        for reply in held.drain(..) {
                            let _ = reply.send(ResultEnvelope::ok(json!({"summary": {"total": 0}})));
                        }
                    }
                }
            }
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(addr).await.unwrap();
        let mut buf = vec![0u8; 65536];

        client
            .send(&encode_request(1, Operation::Check(Default::default())))
            .await
            .unwrap();
        assert_eq!(recv_packet(&client, &mut buf).await, (MsgType::RequestAck, 1, HEADER_LEN));

        client.send(&encode_request(2, Operation::SystemInfo)).await.unwrap();
        assert_eq!(recv_packet(&client, &mut buf).await, (MsgType::RequestAck, 2, HEADER_LEN));

        let mut responses = Vec::new();
        for _ in 0..2 {
            let (msg_type, seq, _) = recv_packet(&client, &mut buf).await;
            assert_eq!(msg_type, MsgType::Response);
            responses.push(seq);
        }
        assert_eq!(responses, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_undecodable_payload_gets_error_response() {
        init_tracing();
        let (addr, _loop_rx) = start_server(test_config()).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(addr).await.unwrap();

        let mut packet = vec![MsgType::Request as u8];
        packet.extend_from_slice(&9u32.to_be_bytes());
        packet.extend_from_slice(&[0xc1, 0xc1]);
        client.send(&packet).await.unwrap();

        let mut buf = vec![0u8; 65536];
        let (msg_type, seq, len) = recv_packet(&client, &mut buf).await;
        assert_eq!((msg_type, seq), (MsgType::Response, 9));
        let envelope = decode_response_payload(&buf[HEADER_LEN..len]).unwrap();
        assert!(!envelope.success);
        assert!(envelope.error.unwrap().starts_with("Invalid request"));
    }

    #[tokio::test]
    async fn test_dropped_reply_reports_no_response() {
        init_tracing();
        let (addr, mut loop_rx) = start_server(test_config()).await;

        tokio::spawn(async move {
            if let Some(req) = loop_rx.recv().await {
                drop(req.reply);
            }
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(addr).await.unwrap();
        client.send(&encode_request(1, Operation::Backups)).await.unwrap();

        let mut buf = vec![0u8; 65536];
        assert_eq!(recv_packet(&client, &mut buf).await.0, MsgType::RequestAck);
        let (msg_type, _, len) = recv_packet(&client, &mut buf).await;
        assert_eq!(msg_type, MsgType::Response);
        let envelope = decode_response_payload(&buf[HEADER_LEN..len]).unwrap();
        assert_eq!(envelope.error.as_deref(), Some("No response from handler"));
    }

    #[tokio::test]
    async fn test_empty_packet() {
        init_tracing();
        let (addr, _rx) = start_server(test_config()).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let _ = client.send_to(&[], addr).await;

        // Should not crash - server continues
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_oversized_payload_ignored() {
        init_tracing();
        let config = comm::CommConfig {
            max_payload_bytes: 16,
            ..test_config()
        };
        let (addr, _rx) = start_server(config).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(addr).await.unwrap();
        let packet = encode_request(
            1,
            Operation::Apply {
                rule_ids: vec!["R-1".repeat(20)],
            },
        );
        client.send(&packet).await.unwrap();

        let mut buf = [0u8; 1024];
        let result =
            tokio::time::timeout(Duration::from_millis(200), client.recv_from(&mut buf)).await;
        assert!(result.is_err(), "oversized request must not be acknowledged");
    }

    #[tokio::test]
    async fn test_invalid_request_ack_from_client() {
        init_tracing();
        let (addr, _rx) = start_server(test_config()).await;

        // REQUEST_ACK is server->client only
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut packet = vec![MsgType::RequestAck as u8];
        packet.extend_from_slice(&1u32.to_be_bytes());
        let _ = client.send_to(&packet, addr).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_oversized_response_spilled_to_file() {
        init_tracing();
        let config = test_config();
        let spill_dir = config.spill_dir.clone();
        let (addr, mut loop_rx) = start_server(config).await;

        let (seen_tx, mut seen_rx) = mpsc::channel::<&'static str>(10);
        tokio::spawn(async move {
            while let Some(req) = loop_rx.recv().await {
                let _ = seen_tx.send(req.operation.name()).await;
                let _ = req.reply.send(ResultEnvelope::ok(oversized_report()));
            }
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(addr).await.unwrap();
        let packet = encode_request(1, Operation::Check(Default::default()));
        client.send(&packet).await.unwrap();

        let mut buf = vec![0u8; 65536];
        assert_eq!(recv_packet(&client, &mut buf).await.0, MsgType::RequestAck);
        let (msg_type, seq, len) = recv_packet(&client, &mut buf).await;
        assert_eq!((msg_type, seq), (MsgType::Response, 1));

        let reply = decode_response_payload(&buf[HEADER_LEN..len]).unwrap();
        assert!(reply.success);
        let data = reply.data.unwrap();
        assert!(data["bytes"].as_u64().unwrap() > 80_000);
        let path = std::path::PathBuf::from(data[envelope::SPILLED_PATH_KEY].as_str().unwrap());
        assert!(path.starts_with(&spill_dir));

        let full: ResultEnvelope =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(full, ResultEnvelope::ok(oversized_report()));

        // A retransmit gets the same stand-in, not a second scan
        client.send(&packet).await.unwrap();
        let (msg_type, _, len) = recv_packet(&client, &mut buf).await;
        assert_eq!(msg_type, MsgType::Response);
        let again = decode_response_payload(&buf[HEADER_LEN..len]).unwrap();
        assert_eq!(again.data.unwrap()[envelope::SPILLED_PATH_KEY], path.to_str().unwrap());

        let mut received = Vec::new();
        while let Ok(Some(name)) =
            tokio::time::timeout(Duration::from_millis(100), seen_rx.recv()).await
        {
            received.push(name);
        }
        assert_eq!(received, vec!["check"]);
    }

    #[tokio::test]
    async fn test_oversized_response_without_spill_dir_fails_cleanly() {
        init_tracing();
        // A regular file cannot hold the spill directory
        let blocker = std::env::temp_dir().join(format!("syshardn-blocker-{}", uuid::Uuid::new_v4()));
        std::fs::write(&blocker, "").unwrap();
        let config = comm::CommConfig {
            spill_dir: blocker.join("responses"),
            ..test_config()
        };
        let (addr, mut loop_rx) = start_server(config).await;

        tokio::spawn(async move {
            if let Some(req) = loop_rx.recv().await {
                let _ = req.reply.send(ResultEnvelope::ok(oversized_report()));
            }
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(addr).await.unwrap();
        client
            .send(&encode_request(1, Operation::Check(Default::default())))
            .await
            .unwrap();

        let mut buf = vec![0u8; 65536];
        assert_eq!(recv_packet(&client, &mut buf).await.0, MsgType::RequestAck);
        let (msg_type, _, len) = recv_packet(&client, &mut buf).await;
        assert_eq!(msg_type, MsgType::Response);
        let envelope = decode_response_payload(&buf[HEADER_LEN..len]).unwrap();
        assert!(!envelope.success);
        assert!(envelope.error.unwrap().starts_with("Response too large"));
    }

    #[tokio::test]
    async fn test_long_request_survives_dedup_cleanup() {
        init_tracing();
        let config = comm::CommConfig {
            dedup_ttl_secs: 1,
            dedup_cleanup_interval_secs: 1,
            ..test_config()
        };
        let (addr, mut loop_rx) = start_server(config).await;

        let (seen_tx, mut seen_rx) = mpsc::channel::<&'static str>(10);
        tokio::spawn(async move {
            while let Some(req) = loop_rx.recv().await {
                let _ = seen_tx.send(req.operation.name()).await;
                // Outlive the TTL and at least two sweeps
                tokio::time::sleep(Duration::from_millis(2500)).await;
                let _ = req.reply.send(ResultEnvelope::done());
            }
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(addr).await.unwrap();
        let packet = encode_request(1, Operation::Apply { rule_ids: vec!["R-1".to_string()] });
        client.send(&packet).await.unwrap();

        let mut buf = vec![0u8; 65536];
        assert_eq!(recv_packet(&client, &mut buf).await.0, MsgType::RequestAck);

        // Retransmit while the request is still running, past the TTL
        tokio::time::sleep(Duration::from_millis(1500)).await;
        client.send(&packet).await.unwrap();
        assert_eq!(recv_packet(&client, &mut buf).await.0, MsgType::RequestAck);

        assert_eq!(recv_packet(&client, &mut buf).await.0, MsgType::Response);

        // Retransmit after completion gets the cached response
        client.send(&packet).await.unwrap();
        assert_eq!(recv_packet(&client, &mut buf).await.0, MsgType::Response);

        let mut received = Vec::new();
        while let Ok(Some(name)) =
            tokio::time::timeout(Duration::from_millis(200), seen_rx.recv()).await
        {
            received.push(name);
        }
        assert_eq!(received, vec!["apply"]);
    }

    #[tokio::test]
    async fn test_client_timeout_no_daemon() {
        init_tracing();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect("127.0.0.1:19999").await.unwrap();
        let _ = client.send(&encode_request(1, Operation::Cancel)).await;

        // Either a timeout or a refused-connection error; never a packet
        let mut buf = [0u8; 1024];
        let result =
            tokio::time::timeout(Duration::from_millis(100), client.recv_from(&mut buf)).await;
        assert!(!matches!(result, Ok(Ok(_))));
    }
}
