//! Topology and transaction submission
//!
//! A submission is one request/reply exchange with the first producer listed
//! in the topology. Each frame is a 4-byte big-endian length followed by a
//! bincode payload.

use crate::crypto::ProtocolMagic;
use crate::error::{CliError, Result};
use crate::ops::Protocol;
use crate::persistence::{InputFile, TopologyFile};
use crate::transaction::{TxAux, TxId, MAX_TRANSACTION_SIZE};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, warn};

/// Largest frame accepted in either direction.
pub const MAX_FRAME_SIZE: usize = MAX_TRANSACTION_SIZE + 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    pub addr: String,
    pub port: u16,
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub producers: Vec<NodeAddress>,
}

pub fn read_topology(file: &TopologyFile) -> Result<Topology> {
    let text = file.read_string()?;
    let topology: Topology = serde_json::from_str(&text).map_err(|e| {
        CliError::Config(format!("Invalid topology {}: {}", file.path().display(), e))
    })?;
    if topology.producers.is_empty() {
        return Err(CliError::Config(format!(
            "Topology {} lists no producers",
            file.path().display()
        )));
    }
    Ok(topology)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub protocol: Protocol,
    pub protocol_magic: u32,
    pub tx: TxAux,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitReply {
    Accepted(TxId),
    Rejected(String),
}

/// Length-prefixes the bincode encoding of `message`.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(CliError::Transport(format!(
            "Frame too large: {} bytes (max: {})",
            payload.len(),
            MAX_FRAME_SIZE
        )));
    }
    let mut frame = (payload.len() as u32).to_be_bytes().to_vec();
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Payload length announced by a frame header.
pub fn frame_length(header: [u8; 4]) -> Result<usize> {
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(CliError::Transport(format!(
            "Peer announced a {} byte frame (max: {})",
            len, MAX_FRAME_SIZE
        )));
    }
    Ok(len)
}

pub fn decode_frame<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    bincode::deserialize(payload)
        .map_err(|e| CliError::Transport(format!("Malformed frame: {}", e)))
}

fn transport(peer: &NodeAddress, e: std::io::Error) -> CliError {
    CliError::Transport(format!("{}: {}", peer, e))
}

async fn exchange(peer: &NodeAddress, frame: &[u8]) -> Result<SubmitReply> {
    let mut stream = TcpStream::connect((peer.addr.as_str(), peer.port))
        .await
        .map_err(|e| transport(peer, e))?;
    stream.write_all(frame).await.map_err(|e| transport(peer, e))?;
    stream.flush().await.map_err(|e| transport(peer, e))?;

    let mut header = [0u8; 4];
    stream
        .read_exact(&mut header)
        .await
        .map_err(|e| transport(peer, e))?;
    let mut payload = vec![0u8; frame_length(header)?];
    stream
        .read_exact(&mut payload)
        .await
        .map_err(|e| transport(peer, e))?;
    decode_frame(&payload)
}

/// Sends `tx` to the first producer in `topology`. No retries.
pub fn submit_transaction(
    protocol: Protocol,
    topology: &Topology,
    magic: ProtocolMagic,
    tx: &TxAux,
) -> Result<TxId> {
    let peer = topology
        .producers
        .first()
        .ok_or_else(|| CliError::Transport("topology lists no producers".to_string()))?;
    let frame = encode_frame(&SubmitRequest {
        protocol,
        protocol_magic: magic.id,
        tx: tx.clone(),
    })?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .map_err(|e| CliError::Transport(format!("Failed to start runtime: {}", e)))?;

    info!("Submitting transaction to {}", peer);
    match runtime.block_on(exchange(peer, &frame))? {
        SubmitReply::Accepted(id) => {
            info!("Transaction {} accepted by {}", id, peer);
            Ok(id)
        }
        SubmitReply::Rejected(reason) => {
            warn!("Transaction rejected by {}: {}", peer, reason);
            Err(CliError::SubmissionRejected(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Address, NetworkMagic, RequiresNetworkMagic, SigningKey};
    use crate::transaction::{assemble_genesis_expenditure, Lovelace, NonEmpty, TxOut};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use tempfile::TempDir;

    const MAGIC: ProtocolMagic = ProtocolMagic {
        id: 42,
        requires_network_magic: RequiresNetworkMagic::RequiresNoMagic,
    };

    fn sample_tx() -> TxAux {
        let owner = SigningKey::generate();
        let address =
            Address::from_verification_key(&owner.verification_key(), NetworkMagic::NetworkMainOrStage);
        let outputs = NonEmpty::singleton(TxOut {
            address,
            amount: Lovelace(100),
        });
        assemble_genesis_expenditure(MAGIC, &address, &owner, outputs).unwrap()
    }

    /// Accepts one connection and answers it with `respond`.
    fn mock_node<F>(respond: F) -> (Topology, thread::JoinHandle<()>)
    where
        F: FnOnce(SubmitRequest) -> SubmitReply + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut header = [0u8; 4];
            stream.read_exact(&mut header).unwrap();
            let mut payload = vec![0u8; frame_length(header).unwrap()];
            stream.read_exact(&mut payload).unwrap();
            let request: SubmitRequest = decode_frame(&payload).unwrap();
            let reply = encode_frame(&respond(request)).unwrap();
            stream.write_all(&reply).unwrap();
        });
        let topology = Topology {
            producers: vec![NodeAddress {
                addr: "127.0.0.1".to_string(),
                port,
            }],
        };
        (topology, handle)
    }

    #[test]
    fn test_accepted_submission_returns_tx_id() {
        let tx = sample_tx();
        let (topology, node) = mock_node(|request| {
            assert_eq!(request.protocol, Protocol::RealPbft);
            assert_eq!(request.protocol_magic, 42);
            assert!(request.tx.verify_witnesses(MAGIC).is_ok());
            SubmitReply::Accepted(request.tx.tx.id().unwrap())
        });

        let id = submit_transaction(Protocol::RealPbft, &topology, MAGIC, &tx).unwrap();
        node.join().unwrap();
        assert_eq!(id, tx.tx.id().unwrap());
    }

    #[test]
    fn test_rejection_is_reported() {
        let (topology, node) = mock_node(|_| SubmitReply::Rejected("bad witness".to_string()));
        let result = submit_transaction(Protocol::ByronLegacy, &topology, MAGIC, &sample_tx());
        node.join().unwrap();
        match result {
            Err(CliError::SubmissionRejected(reason)) => assert_eq!(reason, "bad witness"),
            other => panic!("Expected SubmissionRejected, got {:?}", other),
        }
    }

    #[test]
    fn test_unreachable_producer_is_transport_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let topology = Topology {
            producers: vec![NodeAddress {
                addr: "127.0.0.1".to_string(),
                port,
            }],
        };
        assert!(matches!(
            submit_transaction(Protocol::RealPbft, &topology, MAGIC, &sample_tx()),
            Err(CliError::Transport(_))
        ));
    }

    #[test]
    fn test_oversized_frame_header_is_refused() {
        let header = ((MAX_FRAME_SIZE + 1) as u32).to_be_bytes();
        assert!(matches!(frame_length(header), Err(CliError::Transport(_))));
    }

    #[test]
    fn test_read_topology() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("topology.json");
        std::fs::write(&path, r#"{"producers":[{"addr":"10.0.0.1","port":3001}]}"#).unwrap();
        let topology = read_topology(&TopologyFile(path.clone())).unwrap();
        assert_eq!(topology.producers[0].to_string(), "10.0.0.1:3001");

        std::fs::write(&path, r#"{"producers":[]}"#).unwrap();
        assert!(matches!(
            read_topology(&TopologyFile(path)),
            Err(CliError::Config(_))
        ));
    }
}
