use anyhow::Error;
use tonic::transport::Channel;

pub mod handpose {
    tonic::include_proto!("handpose");
}

use handpose::hand_pose_client::HandPoseClient;
use handpose::{DetectRequest, DetectResponse, TrackerDescriptor, TrackerOptions};

/// gRPC connection to the hand-pose inference service.
#[derive(Debug, Clone)]
pub struct HandPoseInferenceClient {
    client: HandPoseClient<Channel>,
}

impl HandPoseInferenceClient {
    /// new establishes a channel to the inference service.
    ///
    /// # Arguments
    /// * `endpoint` - full service URI, e.g. `http://127.0.0.1:9500`
    ///
    /// # Returns
    /// * `Result<HandPoseInferenceClient, Error>`
    pub async fn new(endpoint: &str) -> Result<Self, Error> {
        let client = match HandPoseClient::connect(endpoint.to_string()).await {
            Ok(client) => client,
            Err(e) => return Err(Error::from(e)),
        };
        Ok(HandPoseInferenceClient { client })
    }

    /// configure pushes the tracker options for this session and returns the
    /// model descriptor the service will run.
    pub async fn configure(&self, options: TrackerOptions) -> Result<TrackerDescriptor, Error> {
        let mut client = self.client.clone();
        let response = match client.configure(options).await {
            Ok(response) => response,
            Err(e) => return Err(Error::from(e)),
        };
        Ok(response.into_inner())
    }

    /// detect submits one encoded frame and returns the raw detection result.
    pub async fn detect(&self, request: DetectRequest) -> Result<DetectResponse, Error> {
        let mut client = self.client.clone();
        let response = match client.detect(request).await {
            Ok(response) => response,
            Err(e) => return Err(Error::from(e)),
        };
        Ok(response.into_inner())
    }
}
