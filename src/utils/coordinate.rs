use serde::{Deserialize, Serialize};

/// Number of tracked points in the 21-point hand model.
pub const HAND_LANDMARK_COUNT: usize = 21;

// Landmark indices of the 21-point hand model.
pub const WRIST: usize = 0;
pub const THUMB_CMC: usize = 1;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_DIP: usize = 7;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_DIP: usize = 11;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_DIP: usize = 15;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_DIP: usize = 19;
pub const PINKY_TIP: usize = 20;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One detected hand: ordered landmark points in normalized [0,1] image space.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LandmarkSet {
    pub points: Vec<Landmark>,
    pub score: f32,
}

impl LandmarkSet {
    pub fn landmark(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate2D {
    pub x: f32,
    pub y: f32,
}

impl Coordinate2D {
    /// to_payload formats the coordinate as the wire payload `"<x>,<y>"`,
    /// both axes rounded to whole integers.
    pub fn to_payload(&self) -> String {
        format!("{},{}", self.x.round() as i64, self.y.round() as i64)
    }

    /// from_payload parses a `"<x>,<y>"` payload defensively.
    ///
    /// Returns `None` for anything that is not exactly two
    /// comma-separated integers.
    pub fn from_payload(payload: &str) -> Option<Self> {
        let mut parts = payload.split(',');
        let x = parts.next()?.trim().parse::<i64>().ok()?;
        let y = parts.next()?.trim().parse::<i64>().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Coordinate2D {
            x: x as f32,
            y: y as f32,
        })
    }
}
