use anyhow::Error;
use tonic::transport::Channel;

use crate::config::config::TokenServiceConfig;

pub mod token {
    tonic::include_proto!("token");
}

use token::token_service_client::TokenServiceClient;
use token::TokenRequest;

/// Client for the participant token service.
#[derive(Debug, Clone)]
pub struct TokenClient {
    client: TokenServiceClient<Channel>,
}

impl TokenClient {
    pub async fn new(config: &TokenServiceConfig) -> Result<Self, Error> {
        let client = match TokenServiceClient::connect(config.endpoint.to_owned()).await {
            Ok(client) => client,
            Err(e) => return Err(Error::from(e)),
        };
        Ok(TokenClient { client })
    }

    /// issue_token requests an access token for the given identity.
    ///
    /// # Arguments
    /// * `identity` - participant identity, e.g. `"ana-controller"`
    ///
    /// # Returns
    /// * `Result<String, Error>`
    pub async fn issue_token(&self, identity: &str) -> Result<String, Error> {
        let mut client = self.client.clone();
        let request = TokenRequest {
            identity: identity.to_string(),
        };
        let response = match client.issue_token(request).await {
            Ok(response) => response,
            Err(e) => return Err(Error::from(e)),
        };

        let token = response.into_inner().token;
        if token.is_empty() {
            return Err(Error::msg("token_client - token service returned an empty token"));
        }
        Ok(token)
    }
}
