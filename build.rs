use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    signaling: Signaling,
    server: Server,
    transform: Transform,
    audio: Audio,
    ice: Ice,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Signaling {
    url: String,
    username: String,
    max_retry_delay_secs: u64,
}

#[derive(Deserialize)]
struct Server {
    bind_ip: String,
    port: u16,
}

#[derive(Deserialize)]
struct Transform {
    enabled: bool,
    pulse_min_hz: f32,
    pulse_max_hz: f32,
    tone_min_hz: f32,
    tone_max_hz: f32,
    right_shift: f32,
}

#[derive(Deserialize)]
struct Audio {
    max_channels: usize,
    max_frames: usize,
    output: String,
    playback_device: String,
}

#[derive(Deserialize)]
struct Ice {
    servers: Vec<String>,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 信令配置
    println!("cargo:rustc-env=SIGNALING_URL={}", config.signaling.url);
    println!("cargo:rustc-env=SIGNALING_USERNAME={}", config.signaling.username);
    println!(
        "cargo:rustc-env=SIGNALING_MAX_RETRY_DELAY_SECS={}",
        config.signaling.max_retry_delay_secs
    );

    println!("cargo:rustc-env=SERVER_BIND_IP={}", config.server.bind_ip);
    println!("cargo:rustc-env=SERVER_PORT={}", config.server.port);

    // 音频变换配置
    println!("cargo:rustc-env=TRANSFORM_ENABLED={}", config.transform.enabled);
    println!("cargo:rustc-env=TRANSFORM_PULSE_MIN_HZ={}", config.transform.pulse_min_hz);
    println!("cargo:rustc-env=TRANSFORM_PULSE_MAX_HZ={}", config.transform.pulse_max_hz);
    println!("cargo:rustc-env=TRANSFORM_TONE_MIN_HZ={}", config.transform.tone_min_hz);
    println!("cargo:rustc-env=TRANSFORM_TONE_MAX_HZ={}", config.transform.tone_max_hz);
    println!("cargo:rustc-env=TRANSFORM_RIGHT_SHIFT={}", config.transform.right_shift);

    println!("cargo:rustc-env=AUDIO_MAX_CHANNELS={}", config.audio.max_channels);
    println!("cargo:rustc-env=AUDIO_MAX_FRAMES={}", config.audio.max_frames);
    println!("cargo:rustc-env=AUDIO_OUTPUT={}", config.audio.output);
    println!("cargo:rustc-env=AUDIO_PLAYBACK_DEVICE={}", config.audio.playback_device);

    // 逗号分隔的 STUN/TURN 地址，空字符串表示不使用
    println!("cargo:rustc-env=ICE_SERVERS={}", config.ice.servers.join(","));
}
