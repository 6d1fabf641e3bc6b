use std::future::Future;

use anyhow::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::config::config::BrokerConfig;
use crate::transport::session::BrokerLink;

pub mod broker {
    tonic::include_proto!("broker");
}

use broker::broker_client::BrokerClient;
use broker::{AttachRequest, Envelope};

/// gRPC-backed [`BrokerLink`].
///
/// Each connection attaches a server stream alongside the channel; the
/// stream carries no data the producer cares about, but its end is the
/// liveness signal the session driver reconnects on.
pub struct GrpcBrokerLink {
    endpoint: String,
    client_id: String,
    token: String,
    client: Option<BrokerClient<Channel>>,
    watcher: Option<JoinHandle<()>>,
}

impl GrpcBrokerLink {
    pub fn new(config: &BrokerConfig, client_id: &str, token: &str) -> Self {
        GrpcBrokerLink {
            endpoint: config.endpoint.to_owned(),
            client_id: client_id.to_string(),
            token: token.to_string(),
            client: None,
            watcher: None,
        }
    }
}

impl BrokerLink for GrpcBrokerLink {
    fn connect(&mut self) -> impl Future<Output = Result<oneshot::Receiver<()>, Error>> + Send {
        async move {
            let channel = Endpoint::from_shared(self.endpoint.to_owned())?
                .connect()
                .await?;
            let mut client = BrokerClient::new(channel);

            let request = AttachRequest {
                client_id: self.client_id.to_owned(),
                token: self.token.to_owned(),
            };
            let mut stream = client.attach(request).await?.into_inner();

            let (lost_tx, lost_rx) = oneshot::channel();
            let watcher = tokio::spawn(async move {
                loop {
                    match stream.message().await {
                        Ok(Some(_)) => continue,
                        Ok(None) | Err(_) => break,
                    }
                }
                let _ = lost_tx.send(());
            });

            if let Some(stale) = self.watcher.replace(watcher) {
                stale.abort();
            }
            self.client = Some(client);
            Ok(lost_rx)
        }
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        let client = self.client.clone();
        let envelope = Envelope {
            topic: topic.to_string(),
            payload: payload.to_string(),
        };
        async move {
            let mut client = match client {
                Some(client) => client,
                None => return Err(Error::msg("transport - publish before connect")),
            };
            let ack = client.publish(envelope).await?.into_inner();
            if !ack.accepted {
                return Err(Error::msg("transport - broker refused the message"));
            }
            Ok(())
        }
    }

    fn close(&mut self) -> impl Future<Output = ()> + Send {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.client = None;
        debug!("broker link released");
        std::future::ready(())
    }
}
