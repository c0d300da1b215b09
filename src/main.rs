use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use uuid::Uuid;

use lobby_voice::App;
use lobby_voice::audio::{AudioOutput, LogOutput};
use lobby_voice::config::Config;
use lobby_voice::connection::{ControllerContext, ControllerEvent, SessionFactory};
use lobby_voice::net_link::{NetCommand, NetEvent, NetLink, NetSignaling};
use lobby_voice::ui::{self, ConsoleStatus, UiCommand};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let mut config = Config::new().unwrap_or_default();

    // 用户名：环境变量优先，未配置则生成随机名字
    if let Ok(name) = std::env::var("LOBBY_USERNAME") {
        if !name.trim().is_empty() {
            config.username = name.trim().to_string();
        }
    }
    if config.username == "unknown" {
        let uuid = Uuid::new_v4().simple().to_string();
        config.username = format!("peer-{}", &uuid[..8]);
        println!("Generated username: {}", config.username);
    }

    // 事件通道 / 命令通道
    let (tx_net_event, mut rx_net_event) = mpsc::channel::<NetEvent>(100);
    // 命令通道无界，避免与事件通道形成互等
    let (tx_net_cmd, rx_net_cmd) = mpsc::unbounded_channel::<NetCommand>();
    // 控制器事件通道（协商任务、传输状态、远端音轨）
    let (tx_ctrl_event, mut rx_ctrl_event) = mpsc::unbounded_channel::<ControllerEvent>();

    // 启动网络链接，与信令服务器通信
    let net_link = NetLink::new(
        config.signaling_url,
        config.max_retry_delay_secs,
        tx_net_event,
        rx_net_cmd,
    )?;
    tokio::spawn(async move {
        net_link.run().await;
    });

    let ctx = Arc::new(ControllerContext {
        sessions: session_factory(&config)?,
        signaling: Arc::new(NetSignaling::new(tx_net_cmd.clone())),
        output: audio_output(&config),
        status: Arc::new(ConsoleStatus),
        transform: config.transform(),
        events: tx_ctrl_event,
    });
    let mut app = App::new(config.username.clone(), ctx, tx_net_cmd);

    // 读取终端命令
    let (tx_cmd, mut rx_cmd) = mpsc::channel::<UiCommand>(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match UiCommand::parse(&line) {
                Some(cmd) => {
                    if tx_cmd.send(cmd).await.is_err() {
                        break;
                    }
                }
                None => println!("{}", ui::HELP),
            }
        }
    });

    println!(
        "{} {} started as {}. {}",
        env!("APP_NAME"),
        env!("APP_VERSION"),
        config.username,
        ui::HELP
    );

    // 主事件循环，所有状态变更都在这里串行处理
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down...");
                break;
            }
            Some(event) = rx_net_event.recv() => {
                app.handle_net_event(event).await;
            }
            Some(event) = rx_ctrl_event.recv() => {
                app.handle_controller_event(event).await;
            }
            cmd = rx_cmd.recv() => {
                // stdin 关闭等同于退出
                let Some(cmd) = cmd else { break };
                if !app.handle_command(cmd).await {
                    break;
                }
            }
        }
    }

    app.shutdown().await;
    // 给 NetLink 一点时间把 leave_lobby 发出去
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
    Ok(())
}

#[cfg(feature = "media")]
fn session_factory(config: &Config) -> Result<Arc<dyn SessionFactory>> {
    Ok(Arc::new(lobby_voice::media::WebRtcSessionFactory::new(&config.ice_servers)?))
}

#[cfg(not(feature = "media"))]
fn session_factory(_config: &Config) -> Result<Arc<dyn SessionFactory>> {
    log::warn!("Built without the `media` feature: connections will fail to open");
    Ok(Arc::new(no_media::NoMedia))
}

#[cfg(not(feature = "media"))]
mod no_media {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;
    use lobby_voice::connection::{MediaSession, SessionEvents, SessionFactory};
    use lobby_voice::peer::PeerId;

    /// Stand-in factory for builds without a media backend.
    pub struct NoMedia;

    #[async_trait]
    impl SessionFactory for NoMedia {
        async fn create(&self, _peer: &PeerId, _events: SessionEvents) -> Result<Arc<dyn MediaSession>> {
            anyhow::bail!("media backend not compiled in (enable the `media` feature)")
        }
    }
}

fn audio_output(config: &Config) -> Arc<dyn AudioOutput> {
    match config.audio_output {
        #[cfg(feature = "playback")]
        "alsa" => Arc::new(lobby_voice::audio::AlsaOutput::new(config.playback_device)),
        "log" => Arc::new(LogOutput),
        other => {
            log::warn!("Audio output '{}' unavailable, logging frames instead", other);
            Arc::new(LogOutput)
        }
    }
}
