use serde::{Deserialize, Serialize};

use crate::{
    catalog::JutsuCatalog,
    config::ClientSettings,
    detection::{Detection, FaceSummary, HandSummary},
    session::{SequenceSummary, SessionEvent},
};

pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Peer to server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Settings(SettingsPatch),
    Ping,
    GetJutsus,
    Reset,
}

/// Partial update of [`ClientSettings`]. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SettingsPatch {
    #[serde(alias = "currentJutsu")]
    pub current_jutsu: Option<String>,
    #[serde(alias = "effectsEnabled")]
    pub effects_enabled: Option<bool>,
    #[serde(alias = "sendFrames")]
    pub send_frames: Option<bool>,
    #[serde(alias = "frameQuality")]
    pub frame_quality: Option<u8>,
    #[serde(alias = "targetFps")]
    pub target_fps: Option<u32>,
    #[serde(alias = "sendLandmarks")]
    pub send_landmarks: Option<bool>,
    #[serde(alias = "playerLevel")]
    pub player_level: Option<u32>,
}

impl SettingsPatch {
    /// Applies every present field except `current_jutsu`, which needs the
    /// session to validate it.
    pub fn apply(&self, settings: &mut ClientSettings) {
        if let Some(v) = self.effects_enabled {
            settings.effects_enabled = v;
        }
        if let Some(v) = self.send_frames {
            settings.send_frames = v;
        }
        if let Some(v) = self.frame_quality {
            settings.frame_quality = v.clamp(1, 100);
        }
        if let Some(v) = self.target_fps {
            settings.target_fps = v;
        }
        if let Some(v) = self.send_landmarks {
            settings.send_landmarks = v;
        }
        if let Some(v) = self.player_level {
            settings.player_level = v;
        }
    }
}

/// Server to peer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        #[serde(rename = "serverVersion")]
        server_version: String,
        jutsus: Vec<String>,
        #[serde(rename = "classNames")]
        class_names: Vec<String>,
    },
    FrameData(FrameRecord),
    Pong {
        timestamp: f64,
    },
    JutsuRegistry {
        jutsus: JutsuCatalog,
    },
    Settings(ClientSettings),
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRecord {
    /// Unix seconds.
    pub timestamp: f64,
    pub fps: f32,
    pub frame_size: [u32; 2],
    pub detections: Vec<Detection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face: Option<FaceSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hand: Option<HandSummary>,
    /// Base64 JPEG, mirrored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_encoded: Option<String>,
    pub sequence: SequenceSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SessionEvent>,
}

pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
