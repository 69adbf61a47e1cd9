//! The broadcast bus.
//!
//! One named topic connects every surface. In-process it is a tokio
//! broadcast channel of decoded frames; remote surfaces attach over a
//! WebSocket that relays frames both ways. Semantics match a fire-and-forget
//! broadcast: at-most-once, nothing persisted, no ordering across senders,
//! and a peer never receives its own frames back.

use axum::extract::ws::{Message, WebSocket};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::protocol::BusMessage;

const BUS_CAPACITY: usize = 256;

/// One frame on the topic, tagged with the publishing peer so consumers can
/// skip their own traffic.
#[derive(Clone, Debug)]
pub struct BusFrame {
    pub from: Uuid,
    pub msg: BusMessage,
}

#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<BusFrame>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Fire-and-forget publish. No receivers is not an error.
    pub fn publish_from(&self, from: Uuid, msg: BusMessage) {
        let _ = self.tx.send(BusFrame { from, msg });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusFrame> {
        self.tx.subscribe()
    }
}

/// Bridge one WebSocket peer onto the topic. Frames from other peers are
/// forwarded as JSON text; inbound text decodes through the closed protocol
/// and anything malformed is dropped without closing the connection.
pub async fn serve_socket(socket: WebSocket, bus: Bus) {
    let peer_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut rx = bus.subscribe();

    tracing::debug!("bus peer connected: {peer_id}");

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Ok(frame) => {
                    if frame.from == peer_id {
                        continue;
                    }
                    if sender
                        .send(Message::Text(frame.msg.encode()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // A slow surface misses frames rather than stalling the
                    // topic; the next snapshot re-syncs it.
                    tracing::warn!("bus peer {peer_id} lagged, dropped {n} frames");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match BusMessage::decode(&text) {
                        Some(decoded) => bus.publish_from(peer_id, decoded),
                        None => tracing::debug!("ignoring malformed bus frame from {peer_id}"),
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }

    tracing::debug!("bus peer disconnected: {peer_id}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_reach_other_subscribers() {
        let bus = Bus::new();
        let a = Uuid::new_v4();
        let mut rx_b = bus.subscribe();
        let mut rx_c = bus.subscribe();

        bus.publish_from(a, BusMessage::Ended);

        let frame = rx_b.recv().await.unwrap();
        assert_eq!(frame.from, a);
        assert_eq!(frame.msg, BusMessage::Ended);
        assert_eq!(rx_c.recv().await.unwrap().msg, BusMessage::Ended);
    }

    #[tokio::test]
    async fn consumers_can_skip_their_own_frames() {
        let bus = Bus::new();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut rx = bus.subscribe();

        bus.publish_from(me, BusMessage::Play);
        bus.publish_from(other, BusMessage::Pause);

        // The receive loop's own-id filter leaves only the other's frame.
        let mut seen = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if frame.from != me {
                seen.push(frame.msg);
            }
        }
        assert_eq!(seen, [BusMessage::Pause]);
    }

    #[tokio::test]
    async fn publish_without_receivers_is_fine() {
        let bus = Bus::new();
        bus.publish_from(Uuid::new_v4(), BusMessage::Play);
    }

    #[tokio::test]
    async fn frames_from_one_sender_arrive_in_order() {
        let bus = Bus::new();
        let a = Uuid::new_v4();
        let mut rx = bus.subscribe();
        bus.publish_from(a, BusMessage::Play);
        bus.publish_from(a, BusMessage::Seek { seconds: 10.0 });
        bus.publish_from(a, BusMessage::Pause);

        assert_eq!(rx.recv().await.unwrap().msg, BusMessage::Play);
        assert_eq!(rx.recv().await.unwrap().msg, BusMessage::Seek { seconds: 10.0 });
        assert_eq!(rx.recv().await.unwrap().msg, BusMessage::Pause);
    }
}
