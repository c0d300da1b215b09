//! Lobby signal server: tracks who is in the lobby and relays signals
//! between peers by id.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};
use uuid::Uuid;

use crate::peer::PeerId;
use crate::protocol::PeersDelta;

/// Client → server, as the relay sees it. Signal payloads stay opaque.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RelayRequest {
    EnterLobby {
        #[serde(default = "unknown_username")]
        username: String,
    },
    LeaveLobby {},
    Signal { id: PeerId, signal: Value },
}

fn unknown_username() -> String {
    "unknown".to_string()
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RelayMessage {
    Peers(PeersDelta),
    Signal { id: PeerId, signal: Value },
}

/// Room membership and per-connection outboxes.
#[derive(Default)]
pub struct Lobby {
    clients: HashMap<PeerId, mpsc::UnboundedSender<RelayMessage>>,
    members: BTreeMap<PeerId, String>,
}

impl Lobby {
    pub fn connect(&mut self, id: PeerId, outbox: mpsc::UnboundedSender<RelayMessage>) {
        log::info!("connect sid={}", id);
        self.clients.insert(id, outbox);
    }

    pub fn disconnect(&mut self, id: &PeerId) {
        log::info!("disconnect sid={}", id);
        self.forget(id);
        self.clients.remove(id);
    }

    pub fn members(&self) -> impl Iterator<Item = (&PeerId, &String)> {
        self.members.iter()
    }

    pub fn handle(&mut self, from: &PeerId, message: RelayRequest) {
        match message {
            RelayRequest::EnterLobby { username } => self.enter(from, username),
            RelayRequest::LeaveLobby {} => {
                log::info!("leave_lobby: sid={}", from);
                self.forget(from);
            }
            RelayRequest::Signal { id, signal } => {
                log::debug!("signal: sid={} --> tid={} signal={}", from, id, signal);
                // Target need not be in the lobby, only connected.
                self.send_to(&id, RelayMessage::Signal { id: from.clone(), signal });
            }
        }
    }

    fn enter(&mut self, id: &PeerId, username: String) {
        if self.members.contains_key(id) {
            return;
        }
        let joined = PeersDelta {
            enter: vec![(id.clone(), username.clone())],
            exit: vec![],
        };
        self.broadcast(id, RelayMessage::Peers(joined));

        let everyone = PeersDelta {
            enter: self.members.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            exit: vec![],
        };
        self.send_to(id, RelayMessage::Peers(everyone));

        log::info!("enter_lobby: sid={} username='{}'", id, username);
        self.members.insert(id.clone(), username);
    }

    fn forget(&mut self, id: &PeerId) {
        if self.members.remove(id).is_none() {
            return;
        }
        let left = PeersDelta {
            enter: vec![],
            exit: vec![id.clone()],
        };
        self.broadcast(id, RelayMessage::Peers(left));
    }

    /// Send to every lobby member except `skip`.
    fn broadcast(&self, skip: &PeerId, message: RelayMessage) {
        for id in self.members.keys().filter(|id| *id != skip) {
            self.send_to(id, message.clone());
        }
    }

    fn send_to(&self, id: &PeerId, message: RelayMessage) {
        match self.clients.get(id) {
            Some(outbox) => {
                if outbox.send(message).is_err() {
                    log::debug!("Message for sid={} dropped, connection closing", id);
                }
            }
            None => log::warn!("No connection for sid={}", id),
        }
    }
}

/// Accept websocket clients forever.
pub async fn serve(listener: TcpListener) -> Result<()> {
    let lobby = Arc::new(Mutex::new(Lobby::default()));
    loop {
        let (stream, addr) = listener.accept().await?;
        let lobby = lobby.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, lobby).await {
                log::warn!("Client {} error: {}", addr, e);
            }
        });
    }
}

async fn handle_client(stream: TcpStream, lobby: Arc<Mutex<Lobby>>) -> Result<()> {
    let ws = accept_async(stream).await?;
    let (mut write, mut read) = ws.split();
    let id = PeerId::new(Uuid::new_v4().simple().to_string());
    let (tx, mut rx) = mpsc::unbounded_channel();
    lobby.lock().await.connect(id.clone(), tx);

    let result = async {
        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<RelayRequest>(&text) {
                                Ok(message) => lobby.lock().await.handle(&id, message),
                                Err(e) => log::warn!("malformed data: sid={} ({}) data={}", id, e, text),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(anyhow::Error::from(e)),
                    }
                }
                Some(message) = rx.recv() => {
                    let text = serde_json::to_string(&message)?;
                    write.send(Message::Text(text.into())).await?;
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    lobby.lock().await.disconnect(&id);
    result
}
