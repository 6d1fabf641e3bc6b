use serde::{Deserialize, Serialize};

use crate::utils::coordinate::MIDDLE_MCP;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraConfig {
    pub device_index: i32,
    pub width: i32,
    pub height: i32,
}

impl CameraConfig {
    pub fn new() -> Self {
        CameraConfig {
            device_index: 0,
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandTrackingConfig {
    pub endpoint: String,
    pub max_hands: u32,
    pub model_complexity: u32,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl HandTrackingConfig {
    pub fn new() -> Self {
        HandTrackingConfig {
            endpoint: "http://127.0.0.1:9500".to_string(),
            max_hands: 1,
            model_complexity: 1,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameSpaceConfig {
    /// Upper bound of the output range on both axes.
    pub scale: f32,
    /// Landmark index used as the single tracked control point.
    pub reference_index: usize,
}

impl GameSpaceConfig {
    pub fn new() -> Self {
        GameSpaceConfig {
            scale: 180.0,
            reference_index: MIDDLE_MCP,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerConfig {
    pub endpoint: String,
    pub topic: String,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
}

impl BrokerConfig {
    pub fn new() -> Self {
        BrokerConfig {
            endpoint: "http://127.0.0.1:9600".to_string(),
            topic: "FAB24/test".to_string(),
            reconnect_initial_ms: 500,
            reconnect_max_ms: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenServiceConfig {
    pub endpoint: String,
}

impl TokenServiceConfig {
    pub fn new() -> Self {
        TokenServiceConfig {
            endpoint: "http://127.0.0.1:9700".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceConfig {
    pub endpoint: String,
    pub player_id: String,
}

impl PresenceConfig {
    pub fn new() -> Self {
        PresenceConfig {
            endpoint: "http://127.0.0.1:9700".to_string(),
            player_id: "p1".to_string(),
        }
    }
}

/// Top-level configuration for one controller screen session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub username: String,
    pub camera: CameraConfig,
    pub hand_tracking: HandTrackingConfig,
    pub game_space: GameSpaceConfig,
    pub broker: BrokerConfig,
    pub token_service: TokenServiceConfig,
    pub presence: PresenceConfig,
}

impl SessionConfig {
    pub fn new(username: &str) -> Self {
        SessionConfig {
            username: username.to_string(),
            camera: CameraConfig::new(),
            hand_tracking: HandTrackingConfig::new(),
            game_space: GameSpaceConfig::new(),
            broker: BrokerConfig::new(),
            token_service: TokenServiceConfig::new(),
            presence: PresenceConfig::new(),
        }
    }

    /// controller_identity returns the identity presented to the token
    /// service for this participant.
    pub fn controller_identity(&self) -> String {
        format!("{}-controller", self.username)
    }
}
