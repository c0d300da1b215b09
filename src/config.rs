use crate::audio::TransformConfig;

#[derive(Debug, Clone)]
pub struct Config {
    // 信令配置
    pub signaling_url: &'static str,
    pub username: String,
    pub max_retry_delay_secs: u64,

    // 信令服务器配置
    pub server_bind_ip: &'static str,
    pub server_port: u16,

    // 音频变换配置
    pub transform_enabled: bool,
    pub pulse_min_hz: f32,
    pub pulse_max_hz: f32,
    pub tone_min_hz: f32,
    pub tone_max_hz: f32,
    pub right_shift: f32,

    // 音频缓冲与输出
    pub max_channels: usize,
    pub max_frames: usize,
    pub audio_output: &'static str,
    pub playback_device: &'static str,

    pub ice_servers: Vec<String>,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            signaling_url: env!("SIGNALING_URL"),
            username: env!("SIGNALING_USERNAME").to_string(),
            max_retry_delay_secs: env!("SIGNALING_MAX_RETRY_DELAY_SECS").parse()
                .map_err(|_| "Failed to parse SIGNALING_MAX_RETRY_DELAY_SECS")?,

            server_bind_ip: env!("SERVER_BIND_IP"),
            server_port: env!("SERVER_PORT").parse()
                .map_err(|_| "Failed to parse SERVER_PORT")?,

            transform_enabled: env!("TRANSFORM_ENABLED").parse()
                .map_err(|_| "Failed to parse TRANSFORM_ENABLED")?,
            pulse_min_hz: env!("TRANSFORM_PULSE_MIN_HZ").parse()
                .map_err(|_| "Failed to parse TRANSFORM_PULSE_MIN_HZ")?,
            pulse_max_hz: env!("TRANSFORM_PULSE_MAX_HZ").parse()
                .map_err(|_| "Failed to parse TRANSFORM_PULSE_MAX_HZ")?,
            tone_min_hz: env!("TRANSFORM_TONE_MIN_HZ").parse()
                .map_err(|_| "Failed to parse TRANSFORM_TONE_MIN_HZ")?,
            tone_max_hz: env!("TRANSFORM_TONE_MAX_HZ").parse()
                .map_err(|_| "Failed to parse TRANSFORM_TONE_MAX_HZ")?,
            right_shift: env!("TRANSFORM_RIGHT_SHIFT").parse()
                .map_err(|_| "Failed to parse TRANSFORM_RIGHT_SHIFT")?,

            max_channels: env!("AUDIO_MAX_CHANNELS").parse()
                .map_err(|_| "Failed to parse AUDIO_MAX_CHANNELS")?,
            max_frames: env!("AUDIO_MAX_FRAMES").parse()
                .map_err(|_| "Failed to parse AUDIO_MAX_FRAMES")?,
            audio_output: env!("AUDIO_OUTPUT"),
            playback_device: env!("AUDIO_PLAYBACK_DEVICE"),

            ice_servers: env!("ICE_SERVERS")
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        })
    }

    /// Transform parameters handed to every connection controller.
    pub fn transform(&self) -> TransformConfig {
        TransformConfig {
            enabled: self.transform_enabled,
            pulse_hz: (self.pulse_min_hz, self.pulse_max_hz),
            tone_hz: (self.tone_min_hz, self.tone_max_hz),
            right_shift: self.right_shift,
            buffer_capacity: self.max_channels * self.max_frames,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new().expect("Failed to create default Config from build-time environment variables")
    }
}
