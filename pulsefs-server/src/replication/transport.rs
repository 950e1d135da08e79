//! Peer links: newline-delimited JSON over TCP.
//!
//! Each server keeps one outgoing connection per known peer and sends only
//! on its own outgoing links; frames read from an accepted connection are
//! attributed to the peer named in its `hello` preamble. A pair of servers
//! therefore shares two unidirectional message streams, each ordered by TCP.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::EngineRequest;
use super::message::PeerMessage;

/// Spawn the task that owns the outgoing link to `peer`. Messages arrive on
/// `rx`; connect failures back off and retry until the engine drops the
/// sender. Backlog queued while the peer was unreachable is discarded on
/// each failed attempt; synchronization replaces anything lost.
pub(super) fn spawn_outgoing_link(
    peer: String,
    self_id: String,
    mut rx: mpsc::UnboundedReceiver<PeerMessage>,
    inbox: mpsc::Sender<EngineRequest>,
    retry: Duration,
) {
    tokio::spawn(async move {
        loop {
            let stream = match TcpStream::connect(&peer).await {
                Ok(stream) => stream,
                Err(err) => {
                    trace!(peer, %err, "peer connect failed");
                    while rx.try_recv().is_ok() {}
                    tokio::time::sleep(retry).await;
                    if rx.is_closed() {
                        return;
                    }
                    continue;
                }
            };
            debug!(peer, "peer link established");
            if write_frames(stream, &self_id, &peer, &mut rx, &inbox).await {
                // engine dropped the link; we're done
                return;
            }
            let _ = inbox
                .send(EngineRequest::PeerDisconnected { addr: peer.clone() })
                .await;
            tokio::time::sleep(retry).await;
        }
    });
}

/// Pump `rx` into the socket until an error (returns `false`) or the engine
/// closes the link (returns `true`).
async fn write_frames(
    mut stream: TcpStream,
    self_id: &str,
    peer: &str,
    rx: &mut mpsc::UnboundedReceiver<PeerMessage>,
    inbox: &mpsc::Sender<EngineRequest>,
) -> bool {
    let hello = PeerMessage::Hello {
        from: self_id.to_string(),
    };
    if write_line(&mut stream, &hello).await.is_err() {
        return false;
    }
    let _ = inbox
        .send(EngineRequest::PeerConnected {
            addr: peer.to_string(),
        })
        .await;

    loop {
        match rx.recv().await {
            None => return true,
            Some(message) => {
                if let Err(err) = write_line(&mut stream, &message).await {
                    warn!(peer, %err, "peer link write failed");
                    return false;
                }
            }
        }
    }
}

async fn write_line(stream: &mut TcpStream, message: &PeerMessage) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(message).map_err(std::io::Error::other)?;
    line.push(b'\n');
    stream.write_all(&line).await
}

/// Accept inbound peer connections and feed their frames to the engine.
/// The returned handle is aborted at shutdown so the port closes with the
/// server (peers must see the address go dark to declare it dead).
pub(super) fn spawn_acceptor(
    listener: TcpListener,
    inbox: mpsc::Sender<EngineRequest>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(%err, "peer accept failed");
                    continue;
                }
            };
            trace!(%remote, "inbound peer connection");
            tokio::spawn(read_frames(stream, inbox.clone()));
        }
    })
}

async fn read_frames(stream: TcpStream, inbox: mpsc::Sender<EngineRequest>) {
    let mut lines = BufReader::new(stream).lines();

    // the preamble names the sender; everything after is attributed to it
    let from = match lines.next_line().await {
        Ok(Some(line)) => match serde_json::from_str::<PeerMessage>(&line) {
            Ok(PeerMessage::Hello { from }) => from,
            Ok(other) => {
                warn!(?other, "peer spoke before hello, dropping connection");
                return;
            }
            Err(err) => {
                warn!(%err, "undecodable peer preamble");
                return;
            }
        },
        _ => return,
    };

    if inbox
        .send(EngineRequest::Peer {
            from: from.clone(),
            message: PeerMessage::Hello { from: from.clone() },
        })
        .await
        .is_err()
    {
        return;
    }

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<PeerMessage>(&line) {
                Ok(message) => {
                    if inbox
                        .send(EngineRequest::Peer {
                            from: from.clone(),
                            message,
                        })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Err(err) => {
                    warn!(peer = %from, %err, "undecodable peer frame, dropping connection");
                    break;
                }
            },
            Ok(None) => break,
            Err(err) => {
                debug!(peer = %from, %err, "peer read failed");
                break;
            }
        }
    }

    let _ = inbox
        .send(EngineRequest::PeerDisconnected { addr: from })
        .await;
}
