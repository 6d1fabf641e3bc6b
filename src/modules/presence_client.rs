use anyhow::Error;
use tonic::transport::Channel;

use crate::config::config::PresenceConfig;

pub mod presence {
    tonic::include_proto!("presence");
}

use presence::player_state_client::PlayerStateClient;
use presence::PlayerStateUpdate;

/// Client for the player-state store read by the viewer surface.
#[derive(Debug, Clone)]
pub struct PresenceClient {
    client: PlayerStateClient<Channel>,
}

impl PresenceClient {
    pub async fn new(config: &PresenceConfig) -> Result<Self, Error> {
        let client = match PlayerStateClient::connect(config.endpoint.to_owned()).await {
            Ok(client) => client,
            Err(e) => return Err(Error::from(e)),
        };
        Ok(PresenceClient { client })
    }

    /// update_player_state flips the active flag for one player slot.
    pub async fn update_player_state(&self, player_id: &str, is_active: bool) -> Result<(), Error> {
        let mut client = self.client.clone();
        let request = PlayerStateUpdate {
            player_id: player_id.to_string(),
            is_active,
        };
        let response = match client.update_player_state(request).await {
            Ok(response) => response,
            Err(e) => return Err(Error::from(e)),
        };

        if !response.into_inner().applied {
            return Err(Error::msg("presence_client - player state update was not applied"));
        }
        Ok(())
    }
}
