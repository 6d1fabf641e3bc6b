use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::config::BrokerConfig;

/// Connection status of one broker session, as seen by the rest of the
/// pipeline. Status changes are independent of publish attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Low-level connection to the pub/sub broker.
///
/// `connect` is called for the initial dial and again after every drop; it
/// returns a signal that resolves once that particular connection is lost.
/// `close` is called exactly once, when the session ends.
pub trait BrokerLink: Send + 'static {
    fn connect(&mut self) -> impl Future<Output = Result<oneshot::Receiver<()>, Error>> + Send;

    fn publish(
        &mut self,
        topic: &str,
        payload: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

enum SessionCommand {
    Publish { topic: String, payload: String },
    Disconnect,
}

/// One live session against the broker, created fresh on every screen mount.
///
/// Publishing is best-effort and non-blocking: messages are handed to the
/// driver task and failures surface only in the log. The session keeps
/// re-dialing after unexpected drops and re-announces `Connected` once the
/// link is restored.
#[derive(Clone)]
pub struct TransportSession {
    commands: mpsc::UnboundedSender<SessionCommand>,
    status: watch::Receiver<LinkStatus>,
    disconnect_requested: Arc<AtomicBool>,
}

impl TransportSession {
    /// connect spawns the session driver and returns the handle immediately;
    /// the status watch reports the dial progress.
    pub fn connect<L: BrokerLink>(link: L, config: BrokerConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(LinkStatus::Connecting);
        tokio::spawn(drive(link, config, status_tx, commands_rx));
        TransportSession {
            commands: commands_tx,
            status: status_rx,
            disconnect_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn status(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    /// publish enqueues one payload for the topic. Never blocks and never
    /// fails the caller; a dead session simply swallows the message.
    pub fn publish(&self, topic: &str, payload: &str) {
        let command = SessionCommand::Publish {
            topic: topic.to_string(),
            payload: payload.to_string(),
        };
        if self.commands.send(command).is_err() {
            debug!("publish after session end dropped");
        }
    }

    /// disconnect ends the session and waits for the driver to release the
    /// link. Idempotent: concurrent and repeated calls all wait for the same
    /// single teardown, and calling it while still connecting abandons the
    /// dial.
    pub async fn disconnect(&self) {
        if !self.disconnect_requested.swap(true, Ordering::SeqCst) {
            let _ = self.commands.send(SessionCommand::Disconnect);
        }
        let mut status = self.status.clone();
        while status.changed().await.is_ok() {}
    }
}

async fn drive<L: BrokerLink>(
    mut link: L,
    config: BrokerConfig,
    status_tx: watch::Sender<LinkStatus>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
) {
    let initial_backoff = Duration::from_millis(config.reconnect_initial_ms.max(1));
    let max_backoff =
        Duration::from_millis(config.reconnect_max_ms.max(config.reconnect_initial_ms.max(1)));
    let mut backoff = initial_backoff;

    'session: loop {
        // Dial phase. A disconnect command abandons the in-flight attempt;
        // publishes arriving here are dropped, not queued.
        let connection_lost = 'dial: loop {
            {
                let connect = link.connect();
                tokio::pin!(connect);
                loop {
                    tokio::select! {
                        command = commands.recv() => match command {
                            Some(SessionCommand::Publish { topic, .. }) => {
                                debug!(topic = %topic, "publish dropped, session not connected");
                            }
                            Some(SessionCommand::Disconnect) | None => break 'dial None,
                        },
                        result = &mut connect => match result {
                            Ok(lost) => break 'dial Some(lost),
                            Err(e) => {
                                warn!(error = %e, "broker dial failed");
                                status_tx.send_replace(LinkStatus::Disconnected);
                                break;
                            }
                        },
                    }
                }
            }

            // Wait out the backoff window, still responsive to teardown.
            let sleep = tokio::time::sleep(backoff);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    command = commands.recv() => match command {
                        Some(SessionCommand::Publish { topic, .. }) => {
                            debug!(topic = %topic, "publish dropped, session not connected");
                        }
                        Some(SessionCommand::Disconnect) | None => break 'dial None,
                    },
                    _ = &mut sleep => break,
                }
            }
            backoff = (backoff * 2).min(max_backoff);
        };

        let Some(mut lost) = connection_lost else {
            break 'session;
        };

        backoff = initial_backoff;
        status_tx.send_replace(LinkStatus::Connected);
        info!("broker session connected");

        // Connected phase: forward publishes until the link drops or the
        // session is told to end.
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Publish { topic, payload }) => {
                        if let Err(e) = link.publish(&topic, &payload).await {
                            warn!(error = %e, topic = %topic, "publish failed");
                        }
                    }
                    Some(SessionCommand::Disconnect) | None => break 'session,
                },
                _ = &mut lost => {
                    warn!("broker connection lost, reconnecting");
                    status_tx.send_replace(LinkStatus::Disconnected);
                    continue 'session;
                }
            }
        }
    }

    link.close().await;
    status_tx.send_replace(LinkStatus::Disconnected);
    debug!("broker session closed");
}
