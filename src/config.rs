use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub catalog_path: Option<PathBuf>,
    pub sequence: SequenceConfig,
    pub ghost_clone: GhostCloneConfig,
    pub challenge: ChallengeConfig,
    pub local: LocalConfig,
    pub streaming: StreamingConfig,
    pub workers: WorkerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            catalog_path: None,
            sequence: SequenceConfig::default(),
            ghost_clone: GhostCloneConfig::default(),
            challenge: ChallengeConfig::default(),
            local: LocalConfig::default(),
            streaming: StreamingConfig::default(),
            workers: WorkerConfig::default(),
        }
    }
}

impl Settings {
    /// Layers an optional config file and `JUTSU__SECTION__KEY` environment
    /// variables over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(Environment::with_prefix("JUTSU").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    pub cooldown_secs: f64,
    pub min_confidence: f32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 0.5,
            min_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GhostCloneConfig {
    /// Working width for segmentation; frames narrower than this run at full size.
    pub segment_width: u32,
    pub mask_every_n_frames: u32,
    pub alpha_threshold: f32,
    pub edge_blur_sigma: f32,
    pub bbox_pad: u32,
    pub offset_ratio: f32,
    pub max_opacity: f32,
    pub fade_in: bool,
    pub anim_duration_secs: f64,
    pub burst_cooldown_secs: f64,
    pub aliases: Vec<String>,
}

impl Default for GhostCloneConfig {
    fn default() -> Self {
        Self {
            segment_width: 320,
            mask_every_n_frames: 2,
            alpha_threshold: 0.35,
            edge_blur_sigma: 2.0,
            bbox_pad: 12,
            offset_ratio: 0.28,
            max_opacity: 0.85,
            fade_in: true,
            anim_duration_secs: 0.35,
            burst_cooldown_secs: 0.35,
            aliases: [
                "shadow clone",
                "kage bunshin",
                "kagebunshin",
                "kage bunshin no jutsu",
                "clone",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    pub countdown_secs: f64,
    pub leaderboard_limit: usize,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 3.0,
            leaderboard_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub target_fps: u32,
    pub mirror: bool,
    pub player_name: String,
    pub player_level: u32,
    pub initial_jutsu: Option<String>,
    pub camera_width: u32,
    pub camera_height: u32,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            mirror: true,
            player_name: "Guest".to_string(),
            player_level: 0,
            initial_jutsu: None,
            camera_width: 640,
            camera_height: 480,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub host: String,
    pub port: u16,
    pub inbound_poll_ms: u64,
    pub detection_timeout_ms: Option<u64>,
    pub max_message_bytes: usize,
    pub client: ClientSettings,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            inbound_poll_ms: 1,
            detection_timeout_ms: Some(500),
            max_message_bytes: 1 << 20,
            client: ClientSettings::default(),
        }
    }
}

/// Per-connection settings, echoed to and overridable by the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientSettings {
    pub current_jutsu: String,
    pub effects_enabled: bool,
    pub send_frames: bool,
    pub frame_quality: u8,
    /// `0` sends frames as fast as capture allows.
    pub target_fps: u32,
    pub send_landmarks: bool,
    pub player_level: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            current_jutsu: "Fireball".to_string(),
            effects_enabled: true,
            send_frames: true,
            frame_quality: 30,
            target_fps: 30,
            send_landmarks: false,
            player_level: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub result_buffer: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { result_buffer: 32 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_tuning() {
        let settings = Settings::default();
        assert_eq!(settings.sequence.cooldown_secs, 0.5);
        assert_eq!(settings.ghost_clone.mask_every_n_frames, 2);
        assert_eq!(settings.challenge.countdown_secs, 3.0);
        assert_eq!(settings.streaming.port, 8765);
        assert_eq!(settings.streaming.client.frame_quality, 30);
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let settings = Settings::load(None).expect("defaults should load");
        assert_eq!(settings.local.target_fps, 60);
    }
}
