use crate::config::config::GameSpaceConfig;
use crate::utils::coordinate::{Coordinate2D, LandmarkSet};

/// Converts a detected hand into a point in the fixed game-space range.
///
/// Pure: no state is kept here. When no hand is present the mapper yields
/// nothing, so the caller's last known coordinate survives untouched.
#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    scale: f32,
    reference_index: usize,
}

impl CoordinateMapper {
    pub fn new(config: GameSpaceConfig) -> Self {
        CoordinateMapper {
            scale: config.scale,
            reference_index: config.reference_index,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// map projects the first hand's reference landmark from normalized
    /// [0,1] image space into [0, scale] game space.
    ///
    /// Returns `None` when no hand is present or the reference landmark is
    /// missing from the set. Out-of-range inference output is clamped rather
    /// than propagated.
    pub fn map(&self, hands: &[LandmarkSet]) -> Option<Coordinate2D> {
        let hand = hands.first()?;
        let landmark = hand.landmark(self.reference_index)?;
        Some(Coordinate2D {
            x: (landmark.x * self.scale).clamp(0.0, self.scale),
            y: (landmark.y * self.scale).clamp(0.0, self.scale),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::coordinate::{Landmark, HAND_LANDMARK_COUNT, MIDDLE_MCP};

    fn hand_at(x: f32, y: f32) -> LandmarkSet {
        let mut points = vec![Landmark::default(); HAND_LANDMARK_COUNT];
        points[MIDDLE_MCP] = Landmark { x, y, z: 0.0 };
        LandmarkSet { points, score: 0.9 }
    }

    fn mapper() -> CoordinateMapper {
        CoordinateMapper::new(GameSpaceConfig::new())
    }

    #[test]
    fn test_center_of_frame_maps_to_center_of_game_space() {
        let coord = mapper().map(&[hand_at(0.5, 0.5)]).unwrap();
        assert_eq!(coord.x, 90.0);
        assert_eq!(coord.y, 90.0);
        assert_eq!(coord.to_payload(), "90,90");
    }

    #[test]
    fn test_output_stays_inside_game_space() {
        let m = mapper();
        for &(x, y) in &[(0.0, 0.0), (1.0, 1.0), (0.25, 0.75), (0.999, 0.001)] {
            let coord = m.map(&[hand_at(x, y)]).unwrap();
            assert!(coord.x >= 0.0 && coord.x <= m.scale());
            assert!(coord.y >= 0.0 && coord.y <= m.scale());
        }
    }

    #[test]
    fn test_out_of_range_inference_output_is_clamped() {
        let m = mapper();
        let coord = m.map(&[hand_at(1.7, -0.3)]).unwrap();
        assert_eq!(coord.x, 180.0);
        assert_eq!(coord.y, 0.0);
    }

    #[test]
    fn test_absent_hand_maps_to_nothing() {
        let m = mapper();
        assert!(m.map(&[]).is_none());
    }

    #[test]
    fn test_short_landmark_set_is_discarded() {
        let m = mapper();
        let short = LandmarkSet {
            points: vec![Landmark::default(); 3],
            score: 0.9,
        };
        assert!(m.map(&[short]).is_none());
    }

    #[test]
    fn test_first_hand_wins() {
        let coord = mapper()
            .map(&[hand_at(0.1, 0.1), hand_at(0.9, 0.9)])
            .unwrap();
        assert_eq!(coord.to_payload(), "18,18");
    }
}
