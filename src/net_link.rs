use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use crate::peer::PeerId;
use crate::protocol::{ClientMessage, PeersDelta, ServerMessage, SignalMessage, SignalPayload};
use crate::signaling::SignalingClient;

#[derive(Debug)]
pub enum NetEvent {
    Connected,
    Disconnected,
    Peers(PeersDelta),
    Signal(SignalMessage),
}

#[derive(Debug)]
pub enum NetCommand {
    Send(ClientMessage),
}

/// Websocket link to the lobby / signal server.
pub struct NetLink {
    url: Url,
    max_retry_delay_secs: u64,
    tx: mpsc::Sender<NetEvent>,
    // 无界：主循环与 NetLink 互相投递时不能互相等待
    rx_cmd: mpsc::UnboundedReceiver<NetCommand>,
}

impl NetLink {
    pub fn new(
        url: &str,
        max_retry_delay_secs: u64,
        tx: mpsc::Sender<NetEvent>,
        rx_cmd: mpsc::UnboundedReceiver<NetCommand>,
    ) -> Result<Self> {
        Ok(Self {
            url: Url::parse(url)?,
            max_retry_delay_secs: max_retry_delay_secs.max(1),
            tx,
            rx_cmd,
        })
    }

    // 断线后指数退避重连；命令通道关闭时退出
    pub async fn run(mut self) {
        let mut retry_delay = 1;
        loop {
            match self.connect_and_loop().await {
                Ok(()) => break,
                Err(ConnectionEnd::AfterConnect(e)) => {
                    log::warn!("Signaling connection lost: {}. Reconnecting in 1s...", e);
                    let _ = self.tx.send(NetEvent::Disconnected).await;
                    retry_delay = 1;
                }
                Err(ConnectionEnd::BeforeConnect(e)) => {
                    log::warn!("Signaling connect failed: {}. Retrying in {}s...", e, retry_delay);
                }
            }
            tokio::time::sleep(tokio::time::Duration::from_secs(retry_delay)).await;
            retry_delay = std::cmp::min(retry_delay * 2, self.max_retry_delay_secs);
        }
        log::info!("NetLink stopped");
    }

    async fn connect_and_loop(&mut self) -> Result<(), ConnectionEnd> {
        log::info!("Connecting to {}...", self.url);
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ConnectionEnd::BeforeConnect(e.into()))?;
        log::info!("Connected to signal server");

        let (mut write, mut read) = ws_stream.split();
        self.tx
            .send(NetEvent::Connected)
            .await
            .map_err(|e| ConnectionEnd::AfterConnect(e.into()))?;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = parse_server_text(&text) {
                                self.tx.send(event).await.map_err(|e| ConnectionEnd::AfterConnect(e.into()))?;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            log::info!("Server closed connection: {:?}", frame);
                            return Err(ConnectionEnd::AfterConnect(anyhow::anyhow!("Connection closed")));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(ConnectionEnd::AfterConnect(e.into())),
                        None => return Err(ConnectionEnd::AfterConnect(anyhow::anyhow!("Connection closed"))),
                    }
                }
                cmd = self.rx_cmd.recv() => {
                    let Some(NetCommand::Send(message)) = cmd else {
                        // 所有发送端都已释放，正常退出
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    };
                    let text = serde_json::to_string(&message)
                        .map_err(|e| ConnectionEnd::AfterConnect(e.into()))?;
                    log::debug!("SEND {}", text);
                    write
                        .send(Message::Text(text.into()))
                        .await
                        .map_err(|e| ConnectionEnd::AfterConnect(e.into()))?;
                }
            }
        }
    }
}

enum ConnectionEnd {
    BeforeConnect(anyhow::Error),
    AfterConnect(anyhow::Error),
}

/// Decode one server text frame; malformed frames are logged and skipped.
pub fn parse_server_text(text: &str) -> Option<NetEvent> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(ServerMessage::Peers(delta)) => {
            log::debug!("RECV peers: {}", text);
            Some(NetEvent::Peers(delta))
        }
        Ok(ServerMessage::Signal { id, signal }) => {
            log::debug!("RECV signal from {}: {}", id, signal.kind());
            Some(NetEvent::Signal(SignalMessage { from: id, payload: signal }))
        }
        Err(e) => {
            log::warn!("Malformed server message ({}): {}", e, text);
            None
        }
    }
}

/// [`SignalingClient`] that queues messages onto the NetLink command channel.
#[derive(Debug, Clone)]
pub struct NetSignaling {
    tx: mpsc::UnboundedSender<NetCommand>,
}

impl NetSignaling {
    pub fn new(tx: mpsc::UnboundedSender<NetCommand>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl SignalingClient for NetSignaling {
    async fn send(&self, to: &PeerId, payload: SignalPayload) -> Result<()> {
        self.tx
            .send(NetCommand::Send(ClientMessage::Signal { id: to.clone(), signal: payload }))?;
        Ok(())
    }
}
