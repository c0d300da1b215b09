//! Terminal stand-in for the peer list: status lines on stdout and commands
//! read from stdin.

use crate::connection::{ButtonStatus, ConnectionState, PeerStatus, StatusListener};
use crate::peer::PeerId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    /// Toggle the peer with this sanitized (or full) id.
    Toggle(String),
    List,
    Quit,
}

impl UiCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = match (words.next()?, words.next()) {
            ("toggle" | "t", Some(id)) => Self::Toggle(id.to_string()),
            ("list" | "ls", None) => Self::List,
            ("quit" | "q" | "exit", None) => Self::Quit,
            _ => return None,
        };
        words.next().is_none().then_some(command)
    }
}

pub const HELP: &str = "commands: toggle <id> | list | quit";

/// Prints every status change.
#[derive(Debug, Default)]
pub struct ConsoleStatus;

impl StatusListener for ConsoleStatus {
    fn state_changed(&self, peer: &PeerId, state: ConnectionState) {
        let button = ButtonStatus::for_state(state);
        println!("{} -> {} [{} / {}]", peer.sanitized(), state, button.label, button.color);
    }

    fn peers_changed(&self, peers: &[PeerStatus]) {
        println!("Peers ({}):", peers.len());
        for status in peers {
            println!("  {:<20} [{}] {}", status.name, status.button.label, status.sanitized_id);
        }
    }
}
