use std::future::Future;

use anyhow::Error;
use tracing::{debug, info};

use crate::config::config::HandTrackingConfig;
use crate::handpose_client::client::handpose::{DetectRequest, DetectResponse, TrackerOptions};
use crate::handpose_client::client::HandPoseInferenceClient;
use crate::pipeline::extractor::LandmarkEngine;
use crate::utils::coordinate::{Landmark, LandmarkSet, HAND_LANDMARK_COUNT};
use crate::utils::image::{encode_frame_jpeg, Frame};

/// Domain client for the hand-pose inference service.
///
/// Wraps the raw RPC client with tracker configuration and conversion of the
/// wire detections into [`LandmarkSet`]s.
#[derive(Debug, Clone)]
pub struct HandLandmarkClient {
    inference_client: HandPoseInferenceClient,
    client_id: String,
}

impl HandLandmarkClient {
    /// connect dials the inference service and pushes the tracker options.
    ///
    /// A failure here is terminal for the session: the caller must surface
    /// it rather than run a pipeline that can never produce landmarks.
    ///
    /// # Arguments
    /// * `client_id` - session identity presented to the tracker
    /// * `config` - tracker tunables
    ///
    /// # Returns
    /// * `Result<HandLandmarkClient, Error>`
    pub async fn connect(client_id: &str, config: &HandTrackingConfig) -> Result<Self, Error> {
        let inference_client = HandPoseInferenceClient::new(&config.endpoint).await?;

        let options = TrackerOptions {
            client_id: client_id.to_string(),
            max_hands: config.max_hands,
            model_complexity: config.model_complexity,
            min_detection_confidence: config.min_detection_confidence,
            min_tracking_confidence: config.min_tracking_confidence,
        };
        let descriptor = inference_client.configure(options).await?;

        if descriptor.landmark_count as usize != HAND_LANDMARK_COUNT {
            return Err(Error::msg(format!(
                "hand_landmark_client - model {} tracks {} landmarks, expected {}",
                descriptor.model_name, descriptor.landmark_count, HAND_LANDMARK_COUNT
            )));
        }

        info!(model = %descriptor.model_name, "hand tracker configured");
        Ok(HandLandmarkClient {
            inference_client,
            client_id: client_id.to_string(),
        })
    }

    fn convert(response: DetectResponse) -> Vec<LandmarkSet> {
        let mut sets: Vec<LandmarkSet> = Vec::with_capacity(response.hands.len());
        for hand in response.hands {
            // A hand with the wrong point count cannot be trusted; drop it
            // instead of letting a short set reach the mapper.
            if hand.points.len() != HAND_LANDMARK_COUNT {
                debug!(points = hand.points.len(), "malformed hand discarded");
                continue;
            }
            let points = hand
                .points
                .iter()
                .map(|p| Landmark {
                    x: p.x,
                    y: p.y,
                    z: p.z,
                })
                .collect();
            sets.push(LandmarkSet {
                points,
                score: hand.score,
            });
        }
        sets
    }
}

impl LandmarkEngine for HandLandmarkClient {
    fn detect(
        &mut self,
        frame: &Frame,
    ) -> impl Future<Output = Result<Vec<LandmarkSet>, Error>> + Send {
        let client = self.inference_client.clone();
        let client_id = self.client_id.to_owned();
        let encoded = encode_frame_jpeg(frame);
        let width = frame.width();
        let height = frame.height();
        async move {
            let request = DetectRequest {
                client_id,
                image: encoded?,
                width,
                height,
            };
            let response = client.detect(request).await?;
            Ok(Self::convert(response))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handpose_client::client::handpose::{Hand, Point};

    fn wire_hand(n: usize) -> Hand {
        Hand {
            points: (0..n)
                .map(|i| Point {
                    x: i as f32 / 21.0,
                    y: 0.5,
                    z: 0.0,
                })
                .collect(),
            score: 0.8,
        }
    }

    #[test]
    fn test_convert_keeps_complete_hands() {
        let response = DetectResponse {
            hands: vec![wire_hand(HAND_LANDMARK_COUNT)],
        };
        let sets = HandLandmarkClient::convert(response);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].points.len(), HAND_LANDMARK_COUNT);
        assert_eq!(sets[0].score, 0.8);
    }

    #[test]
    fn test_convert_discards_malformed_hands() {
        let response = DetectResponse {
            hands: vec![wire_hand(7), wire_hand(HAND_LANDMARK_COUNT), wire_hand(0)],
        };
        let sets = HandLandmarkClient::convert(response);
        assert_eq!(sets.len(), 1);
    }

    #[test]
    fn test_convert_empty_response_is_no_detection() {
        let response = DetectResponse { hands: vec![] };
        assert!(HandLandmarkClient::convert(response).is_empty());
    }
}
