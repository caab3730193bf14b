// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Live set of relay connections and the all-but-sender fan-out over it.
//!
//! Each connection is represented by the sending half of its bounded
//! outbound queue; the connection's writer task owns the receiving half and
//! does the actual socket writes. Broadcasting therefore never touches a
//! socket and never holds a registry lock while a peer is being written to.
//! A peer whose queue is full is treated as dead.

use std::{net::SocketAddr, sync::Arc};

use axum::extract::ws::{Message, Utf8Bytes};
use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type ConnectionId = Uuid;
pub type OutboundTx = mpsc::Sender<Message>;
pub type OutboundRx = mpsc::Receiver<Message>;

/// Frames a connection may have queued before it counts as stalled.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct ConnectionHandle {
    peer: SocketAddr,
    outbound: OutboundTx,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<ConnectionId, ConnectionHandle>>,
}

/// Keeps a connection registered for as long as it is alive. Dropping it
/// unregisters the connection, whichever way the socket task exits.
#[derive(Debug)]
pub struct Registration {
    registry: ConnectionRegistry,
    id: ConnectionId,
}

impl Registration {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

impl ConnectionRegistry {
    pub fn register(&self, peer: SocketAddr, outbound: OutboundTx) -> Registration {
        let id = Uuid::new_v4();
        self.connections
            .insert(id, ConnectionHandle { peer, outbound });
        info!(
            connection_id = %id,
            peer = %peer,
            live_connections = self.connections.len(),
            "relay connection registered"
        );
        Registration {
            registry: self.clone(),
            id,
        }
    }

    /// Remove a connection from the live set. Removing an absent connection
    /// is a no-op; returns whether anything was removed.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        match self.connections.remove(&id) {
            Some((_, handle)) => {
                info!(
                    connection_id = %id,
                    peer = %handle.peer,
                    live_connections = self.connections.len(),
                    "relay connection unregistered"
                );
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Decode one inbound text frame and relay it to every other connection.
    /// Malformed JSON is logged and dropped; `None` is returned in that case,
    /// otherwise the number of connections the frame was delivered to.
    pub fn handle_inbound(&self, from: ConnectionId, raw: &str) -> Option<usize> {
        let payload = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(connection_id = %from, error = %error, "dropping malformed relay message");
                return None;
            }
        };

        debug!(connection_id = %from, payload = %payload, "relay message received");
        Some(self.broadcast(&payload, Some(from)))
    }

    /// Send `payload` to every live connection except `excluding`. A closed
    /// or full queue unregisters that connection and delivery to the rest
    /// continues.
    pub fn broadcast(&self, payload: &serde_json::Value, excluding: Option<ConnectionId>) -> usize {
        let frame: Utf8Bytes = match serde_json::to_string(payload) {
            Ok(encoded) => encoded.into(),
            Err(error) => {
                warn!(error = %error, "failed to encode relay payload");
                return 0;
            }
        };

        let targets: Vec<(ConnectionId, OutboundTx)> = self
            .connections
            .iter()
            .filter(|entry| Some(*entry.key()) != excluding)
            .map(|entry| (*entry.key(), entry.outbound.clone()))
            .collect();

        let mut delivered = 0;
        for (id, outbound) in targets {
            match outbound.try_send(Message::Text(frame.clone())) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(connection_id = %id, "relay outbound queue full; dropping stalled connection");
                    self.unregister(id);
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(connection_id = %id, "relay send failed; dropping connection");
                    self.unregister(id);
                }
            }
        }
        delivered
    }
}
