use std::sync::Arc;

use tokio::sync::mpsc;

use crate::connection::{ControllerContext, ControllerEvent};
use crate::net_link::{NetCommand, NetEvent};
use crate::protocol::ClientMessage;
use crate::registry::PeerRegistry;
use crate::ui::UiCommand;

/// Application context: the peer registry plus the signaling command channel.
///
/// Everything runs on the caller's event loop; each handler finishes before
/// the next event is looked at.
pub struct App {
    username: String,
    registry: PeerRegistry,
    net_tx: mpsc::UnboundedSender<NetCommand>,
    in_lobby: bool,
}

impl App {
    pub fn new(username: impl Into<String>, ctx: Arc<ControllerContext>, net_tx: mpsc::UnboundedSender<NetCommand>) -> Self {
        Self {
            username: username.into(),
            registry: PeerRegistry::new(ctx),
            net_tx,
            in_lobby: false,
        }
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PeerRegistry {
        &mut self.registry
    }

    pub fn in_lobby(&self) -> bool {
        self.in_lobby
    }

    pub async fn handle_net_event(&mut self, event: NetEvent) {
        match event {
            NetEvent::Connected => {
                log::info!("Signaling connected, entering lobby as {}", self.username);
                self.send(ClientMessage::EnterLobby { username: self.username.clone() });
                self.in_lobby = true;
            }
            NetEvent::Disconnected => {
                log::warn!("Signaling disconnected, closing all peer connections");
                self.in_lobby = false;
                self.registry.close_all().await;
            }
            NetEvent::Peers(delta) => {
                self.registry.apply_delta(delta).await;
            }
            NetEvent::Signal(message) => {
                self.registry.dispatch_signal(message).await;
            }
        }
    }

    pub async fn handle_controller_event(&mut self, event: ControllerEvent) {
        self.registry.dispatch_event(event).await;
    }

    /// Returns false when the user asked to quit.
    pub async fn handle_command(&mut self, command: UiCommand) -> bool {
        match command {
            UiCommand::Toggle(sanitized_id) => {
                self.registry.toggle(&sanitized_id).await;
            }
            UiCommand::List => {
                if self.registry.is_empty() {
                    println!("(no peers in lobby)");
                }
                for status in self.registry.statuses() {
                    println!(
                        "{:<20} [{}] {} ({})",
                        status.name, status.button.label, status.sanitized_id, status.state
                    );
                }
            }
            UiCommand::Quit => return false,
        }
        true
    }

    /// Leave the lobby and release every connection.
    pub async fn shutdown(&mut self) {
        if self.in_lobby {
            self.send(ClientMessage::LeaveLobby {});
            self.in_lobby = false;
        }
        self.registry.close_all().await;
    }

    fn send(&self, message: ClientMessage) {
        if let Err(e) = self.net_tx.send(NetCommand::Send(message)) {
            log::error!("Failed to queue message for NetLink: {}", e);
        }
    }
}
