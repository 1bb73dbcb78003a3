use crate::envelope::ResultEnvelope;
use crate::operation::Operation;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::oneshot;

/// Message types for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    /// Client → daemon: an operation to run
    Request = 0x01,
    /// Daemon → client: request received, work started
    RequestAck = 0x02,
    /// Daemon → client: the operation's result envelope
    Response = 0x03,
}

impl MsgType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::Request),
            0x02 => Some(Self::RequestAck),
            0x03 => Some(Self::Response),
            _ => None,
        }
    }
}

/// Request payload from client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub operation: Operation,
}

/// Request handed from Comm to the main loop
#[derive(Debug)]
pub struct OperationRequest {
    pub operation: Operation,
    /// Channel to send the envelope back to Comm
    pub reply: oneshot::Sender<ResultEnvelope>,
    /// Client source address
    pub source_addr: SocketAddr,
}
