mod common;

use std::sync::Arc;

use tokio::sync::mpsc;

use common::{FakeSessionFactory, RecordingOutput, RecordingSignaling, RecordingStatus};
use lobby_voice::App;
use lobby_voice::audio::TransformConfig;
use lobby_voice::connection::{ConnectionState, ControllerContext};
use lobby_voice::net_link::{parse_server_text, NetCommand, NetEvent};
use lobby_voice::peer::PeerId;
use lobby_voice::protocol::ClientMessage;
use lobby_voice::ui::UiCommand;

struct Fixture {
    app: App,
    net_rx: mpsc::UnboundedReceiver<NetCommand>,
    sessions: Arc<FakeSessionFactory>,
}

fn fixture() -> Fixture {
    let (events, _events_rx) = mpsc::unbounded_channel();
    let (net_tx, net_rx) = mpsc::unbounded_channel();
    let sessions = Arc::new(FakeSessionFactory::default());
    let ctx = Arc::new(ControllerContext {
        sessions: sessions.clone(),
        signaling: Arc::new(RecordingSignaling::default()),
        output: Arc::new(RecordingOutput::default()),
        status: Arc::new(RecordingStatus::default()),
        transform: TransformConfig::default(),
        events,
    });
    Fixture {
        app: App::new("tester", ctx, net_tx),
        net_rx,
        sessions,
    }
}

#[tokio::test]
async fn connecting_enters_the_lobby() {
    let mut f = fixture();

    f.app.handle_net_event(NetEvent::Connected).await;

    assert!(f.app.in_lobby());
    let NetCommand::Send(message) = f.net_rx.recv().await.unwrap();
    assert_eq!(message, ClientMessage::EnterLobby { username: "tester".into() });
}

#[tokio::test]
async fn server_frames_drive_the_registry() {
    let mut f = fixture();
    let event = parse_server_text(r#"{"event":"peers","data":{"enter":[["abc123","Chrome"]]}}"#).unwrap();

    f.app.handle_net_event(event).await;

    let record = f.app.registry().get(&PeerId::new("abc123")).unwrap();
    assert_eq!(record.controller.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn lost_signaling_closes_every_connection() {
    let mut f = fixture();
    f.app.handle_net_event(NetEvent::Connected).await;
    let event = parse_server_text(r#"{"event":"peers","data":{"enter":[["abc123","Chrome"]]}}"#).unwrap();
    f.app.handle_net_event(event).await;
    assert!(f.app.handle_command(UiCommand::Toggle("abc123".into())).await);

    f.app.handle_net_event(NetEvent::Disconnected).await;

    assert!(!f.app.in_lobby());
    assert!(f.app.registry().is_empty());
    assert_eq!(f.sessions.last().closes(), 1);
}

#[tokio::test]
async fn quit_command_stops_and_shutdown_leaves_lobby() {
    let mut f = fixture();
    f.app.handle_net_event(NetEvent::Connected).await;
    let _enter = f.net_rx.recv().await.unwrap();

    assert!(f.app.handle_command(UiCommand::List).await);
    assert!(!f.app.handle_command(UiCommand::Quit).await);
    f.app.shutdown().await;

    let NetCommand::Send(message) = f.net_rx.recv().await.unwrap();
    assert_eq!(message, ClientMessage::LeaveLobby {});
    assert!(!f.app.in_lobby());
}
