use anyhow::Result;
use tokio::net::TcpListener;

use lobby_voice::config::Config;
use lobby_voice::lobby_server;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = Config::new().unwrap_or_default();
    let addr = format!("{}:{}", config.server_bind_ip, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    log::info!("{} signal server {} listening on ws://{}/", env!("APP_NAME"), env!("APP_VERSION"), addr);

    lobby_server::serve(listener).await
}
