use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::config::SessionConfig;
use crate::modules::hand_landmark_client::HandLandmarkClient;
use crate::modules::presence_client::PresenceClient;
use crate::modules::token_client::TokenClient;
use crate::pipeline::extractor::{CameraSource, LandmarkExtractor};
use crate::pipeline::mapper::CoordinateMapper;
use crate::transport::broker::GrpcBrokerLink;
use crate::transport::session::{LinkStatus, TransportSession};
use crate::utils::coordinate::{Coordinate2D, LandmarkSet};

/// Terminal initialization failures. Everything here means the screen shows
/// an error state instead of a running controller; nothing is retried.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("token service failed for {identity}: {source}")]
    Token {
        identity: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("camera unavailable: {0}")]
    Camera(#[source] anyhow::Error),
    #[error("hand tracker unavailable: {0}")]
    Tracker(#[source] anyhow::Error),
}

/// Publish gate. The state is always a pure function of the publish intent
/// and the transport status; it carries no memory of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Toggle off: coordinates stay local.
    Idle,
    /// Toggle on but the transport is not connected: publishing is paused.
    Blocked,
    /// Toggle on and the transport is connected: coordinates go out.
    Publishing,
}

impl GateState {
    pub fn derive(intent: bool, link: LinkStatus) -> Self {
        match (intent, link) {
            (false, _) => GateState::Idle,
            (true, LinkStatus::Connected) => GateState::Publishing,
            (true, _) => GateState::Blocked,
        }
    }
}

/// Snapshot surfaced to the surrounding UI: the connection dot, the publish
/// indicator, and the live position readout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStatus {
    pub gate: GateState,
    pub link: LinkStatus,
    pub last_position: Option<Coordinate2D>,
}

enum ControlCommand {
    TogglePublishing,
}

/// Orchestrates one controller screen session.
///
/// Owns the publish toggle, the last mapped coordinate, and the lifetime of
/// the transport session and extractor. All gate transitions happen inside a
/// single event-loop task, so toggle commands, link changes, and detections
/// are strictly interleaved, never concurrent.
pub struct SessionController {
    commands: mpsc::UnboundedSender<ControlCommand>,
    status: watch::Receiver<SessionStatus>,
    transport: TransportSession,
    extractor: Mutex<Option<LandmarkExtractor>>,
    presence: Option<PresenceClient>,
    player_id: String,
    exited: Arc<AtomicBool>,
}

impl SessionController {
    /// mount performs the full screen-mount sequence: token issuance, camera
    /// claim, tracker configuration, and the broker session spin-up.
    ///
    /// Token, camera, and tracker failures are terminal ([`MountError`]).
    /// The broker connecting later (or not at all) is not: the controller
    /// simply starts out `Blocked` once the toggle goes on. An unreachable
    /// presence store is logged and skipped at exit.
    pub async fn mount(config: SessionConfig) -> Result<SessionController, MountError> {
        let identity = config.controller_identity();

        let token_client =
            TokenClient::new(&config.token_service)
                .await
                .map_err(|e| MountError::Token {
                    identity: identity.to_owned(),
                    source: e,
                })?;
        let token = token_client
            .issue_token(&identity)
            .await
            .map_err(|e| MountError::Token {
                identity: identity.to_owned(),
                source: e,
            })?;

        let source = CameraSource::open(&config.camera).map_err(MountError::Camera)?;
        let engine = HandLandmarkClient::connect(&identity, &config.hand_tracking)
            .await
            .map_err(MountError::Tracker)?;
        let (extractor, detections) = LandmarkExtractor::spawn(source, engine);

        let link = GrpcBrokerLink::new(&config.broker, &identity, &token);
        let transport = TransportSession::connect(link, config.broker.clone());

        let presence = match PresenceClient::new(&config.presence).await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "presence store unavailable, exit will skip the player-state update");
                None
            }
        };

        info!(identity = %identity, "controller session mounted");
        Ok(SessionController::new(
            CoordinateMapper::new(config.game_space),
            detections,
            transport,
            Some(extractor),
            presence,
            config.broker.topic,
            config.presence.player_id,
        ))
    }

    /// new wires an already-built pipeline together and starts the event
    /// loop. `mount` is the production path; this constructor is the seam
    /// for driving the controller with fabricated detections and transports.
    pub fn new(
        mapper: CoordinateMapper,
        mut detections: mpsc::UnboundedReceiver<Vec<LandmarkSet>>,
        transport: TransportSession,
        extractor: Option<LandmarkExtractor>,
        presence: Option<PresenceClient>,
        topic: String,
        player_id: String,
    ) -> Self {
        let (commands_tx, mut commands_rx) = mpsc::unbounded_channel();
        let mut link_status = transport.status();
        let initial_link = *link_status.borrow();
        let (status_tx, status_rx) = watch::channel(SessionStatus {
            gate: GateState::derive(false, initial_link),
            link: initial_link,
            last_position: None,
        });

        let publisher = transport.clone();
        tokio::spawn(async move {
            let mut intent = false;
            let mut link = initial_link;
            let mut gate = GateState::derive(intent, link);
            let mut last_position: Option<Coordinate2D> = None;

            loop {
                tokio::select! {
                    command = commands_rx.recv() => match command {
                        Some(ControlCommand::TogglePublishing) => {
                            intent = !intent;
                            let next = GateState::derive(intent, link);
                            // Re-entering Publishing re-announces the held
                            // position so the viewer snaps to it right away.
                            if next == GateState::Publishing && gate != GateState::Publishing {
                                if let Some(coord) = last_position {
                                    publisher.publish(&topic, &coord.to_payload());
                                }
                            }
                            gate = next;
                            info!(?gate, intent, "publish toggle flipped");
                            status_tx.send_replace(SessionStatus { gate, link, last_position });
                        }
                        None => break,
                    },
                    changed = link_status.changed() => match changed {
                        Ok(()) => {
                            link = *link_status.borrow();
                            let next = GateState::derive(intent, link);
                            if next == GateState::Publishing && gate != GateState::Publishing {
                                if let Some(coord) = last_position {
                                    publisher.publish(&topic, &coord.to_payload());
                                }
                            }
                            gate = next;
                            debug!(?link, ?gate, "transport status changed");
                            status_tx.send_replace(SessionStatus { gate, link, last_position });
                        }
                        // Transport driver is gone; the session is over.
                        Err(_) => break,
                    },
                    detection = detections.recv() => match detection {
                        Some(hands) => {
                            // No hand in frame is not an update: the held
                            // coordinate survives and nothing is published.
                            if let Some(coord) = mapper.map(&hands) {
                                last_position = Some(coord);
                                if gate == GateState::Publishing {
                                    publisher.publish(&topic, &coord.to_payload());
                                }
                                status_tx.send_replace(SessionStatus { gate, link, last_position });
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!("session controller loop ended");
        });

        SessionController {
            commands: commands_tx,
            status: status_rx,
            transport,
            extractor: Mutex::new(extractor),
            presence,
            player_id,
            exited: Arc::new(AtomicBool::new(false)),
        }
    }

    /// toggle_publishing flips the publish intent. Double-toggling restores
    /// the previous intent.
    pub fn toggle_publishing(&self) {
        if self.commands.send(ControlCommand::TogglePublishing).is_err() {
            debug!("toggle after session end ignored");
        }
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// exit runs the screen teardown: player slot goes inactive, the camera
    /// and any in-flight inference stop, and the transport session ends.
    ///
    /// Every step is attempted even when an earlier one fails, and repeated
    /// or concurrent calls perform the teardown only once.
    pub async fn exit(&self) {
        if self.exited.swap(true, Ordering::SeqCst) {
            self.transport.disconnect().await;
            return;
        }

        if let Some(presence) = &self.presence {
            if let Err(e) = presence.update_player_state(&self.player_id, false).await {
                warn!(error = %e, "player state update failed on exit");
            }
        }

        if let Some(extractor) = self.extractor.lock().await.take() {
            extractor.shutdown().await;
        }

        self.transport.disconnect().await;
        info!("controller session ended");
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use anyhow::Error;
    use tokio::sync::oneshot;

    use super::*;
    use crate::config::config::{BrokerConfig, GameSpaceConfig};
    use crate::transport::session::BrokerLink;
    use crate::utils::coordinate::{Landmark, HAND_LANDMARK_COUNT, MIDDLE_MCP};

    #[derive(Default)]
    struct LinkState {
        // Dials consume permits, so a test decides exactly when a
        // reconnect attempt may succeed.
        dial_permits: usize,
        publishes: Vec<(String, String)>,
        close_calls: usize,
        lost_signals: Vec<oneshot::Sender<()>>,
    }

    #[derive(Clone)]
    struct RecordingLink {
        state: Arc<StdMutex<LinkState>>,
    }

    impl RecordingLink {
        fn new() -> (Self, Arc<StdMutex<LinkState>>) {
            let state = Arc::new(StdMutex::new(LinkState {
                dial_permits: 1,
                ..LinkState::default()
            }));
            (RecordingLink { state: state.clone() }, state)
        }
    }

    impl BrokerLink for RecordingLink {
        fn connect(&mut self) -> impl Future<Output = Result<oneshot::Receiver<()>, Error>> + Send {
            let state = self.state.clone();
            async move {
                loop {
                    {
                        let mut guard = state.lock().unwrap();
                        if guard.dial_permits > 0 {
                            guard.dial_permits -= 1;
                            let (lost_tx, lost_rx) = oneshot::channel();
                            guard.lost_signals.push(lost_tx);
                            return Ok(lost_rx);
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        }

        fn publish(
            &mut self,
            topic: &str,
            payload: &str,
        ) -> impl Future<Output = Result<(), Error>> + Send {
            let state = self.state.clone();
            let entry = (topic.to_string(), payload.to_string());
            async move {
                state.lock().unwrap().publishes.push(entry);
                Ok(())
            }
        }

        fn close(&mut self) -> impl Future<Output = ()> + Send {
            let state = self.state.clone();
            async move {
                state.lock().unwrap().close_calls += 1;
            }
        }
    }

    struct Rig {
        controller: SessionController,
        detections: mpsc::UnboundedSender<Vec<LandmarkSet>>,
        link_state: Arc<StdMutex<LinkState>>,
    }

    fn rig() -> Rig {
        let (link, link_state) = RecordingLink::new();
        let mut config = BrokerConfig::new();
        config.reconnect_initial_ms = 1;
        config.reconnect_max_ms = 4;
        let topic = config.topic.to_owned();
        let transport = TransportSession::connect(link, config);

        let (detections_tx, detections_rx) = mpsc::unbounded_channel();
        let controller = SessionController::new(
            CoordinateMapper::new(GameSpaceConfig::new()),
            detections_rx,
            transport,
            None,
            None,
            topic,
            "p1".to_string(),
        );
        Rig {
            controller,
            detections: detections_tx,
            link_state,
        }
    }

    fn hand_at(x: f32, y: f32) -> Vec<LandmarkSet> {
        let mut points = vec![Landmark::default(); HAND_LANDMARK_COUNT];
        points[MIDDLE_MCP] = Landmark { x, y, z: 0.0 };
        vec![LandmarkSet { points, score: 0.9 }]
    }

    async fn wait_for<F>(mut predicate: F)
    where
        F: FnMut() -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if predicate() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition never became true");
    }

    fn publishes(state: &Arc<StdMutex<LinkState>>) -> Vec<(String, String)> {
        state.lock().unwrap().publishes.to_owned()
    }

    #[test]
    fn test_gate_is_a_pure_function_of_its_inputs() {
        assert_eq!(GateState::derive(false, LinkStatus::Connecting), GateState::Idle);
        assert_eq!(GateState::derive(false, LinkStatus::Connected), GateState::Idle);
        assert_eq!(GateState::derive(false, LinkStatus::Disconnected), GateState::Idle);
        assert_eq!(GateState::derive(true, LinkStatus::Connecting), GateState::Blocked);
        assert_eq!(GateState::derive(true, LinkStatus::Connected), GateState::Publishing);
        assert_eq!(GateState::derive(true, LinkStatus::Disconnected), GateState::Blocked);
    }

    #[tokio::test]
    async fn test_center_hand_publishes_ninety_ninety() {
        let rig = rig();
        let mut status = rig.controller.status();
        wait_for(|| status.borrow_and_update().link == LinkStatus::Connected).await;

        rig.controller.toggle_publishing();
        wait_for(|| status.borrow_and_update().gate == GateState::Publishing).await;

        rig.detections.send(hand_at(0.5, 0.5)).unwrap();
        wait_for(|| !publishes(&rig.link_state).is_empty()).await;

        assert_eq!(
            publishes(&rig.link_state),
            vec![("FAB24/test".to_string(), "90,90".to_string())]
        );
        rig.controller.exit().await;
    }

    #[tokio::test]
    async fn test_no_publish_while_idle() {
        let rig = rig();
        let mut status = rig.controller.status();
        wait_for(|| status.borrow_and_update().link == LinkStatus::Connected).await;

        rig.detections.send(hand_at(0.5, 0.5)).unwrap();
        wait_for(|| status.borrow_and_update().last_position.is_some()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(publishes(&rig.link_state).is_empty());
        assert_eq!(status.borrow_and_update().gate, GateState::Idle);
        rig.controller.exit().await;
    }

    #[tokio::test]
    async fn test_no_publish_while_blocked_then_resumes_on_reconnect() {
        let rig = rig();
        let mut status = rig.controller.status();
        wait_for(|| status.borrow_and_update().link == LinkStatus::Connected).await;

        rig.controller.toggle_publishing();
        wait_for(|| status.borrow_and_update().gate == GateState::Publishing).await;

        // Drop the link: Publishing -> Blocked.
        let lost_tx = rig.link_state.lock().unwrap().lost_signals.pop().unwrap();
        lost_tx.send(()).unwrap();
        wait_for(|| status.borrow_and_update().gate == GateState::Blocked).await;

        rig.detections.send(hand_at(0.1, 0.1)).unwrap();
        wait_for(|| {
            status.borrow_and_update().last_position == Some(Coordinate2D { x: 18.0, y: 18.0 })
        })
        .await;
        let while_blocked = publishes(&rig.link_state).len();
        assert_eq!(while_blocked, 0);

        // The session redials on its own; Blocked -> Publishing without any
        // user action, and the next update goes out.
        rig.link_state.lock().unwrap().dial_permits += 1;
        wait_for(|| status.borrow_and_update().gate == GateState::Publishing).await;
        rig.detections.send(hand_at(0.9, 0.9)).unwrap();
        wait_for(|| {
            publishes(&rig.link_state)
                .last()
                .map(|(_, payload)| payload == "162,162")
                .unwrap_or(false)
        })
        .await;
        rig.controller.exit().await;
    }

    #[tokio::test]
    async fn test_double_toggle_restores_idle() {
        let rig = rig();
        let mut status = rig.controller.status();
        wait_for(|| status.borrow_and_update().link == LinkStatus::Connected).await;

        rig.controller.toggle_publishing();
        rig.controller.toggle_publishing();
        wait_for(|| status.borrow_and_update().gate == GateState::Idle).await;

        rig.detections.send(hand_at(0.5, 0.5)).unwrap();
        wait_for(|| status.borrow_and_update().last_position.is_some()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(publishes(&rig.link_state).is_empty());
        rig.controller.exit().await;
    }

    #[tokio::test]
    async fn test_absent_detections_keep_last_coordinate_and_stay_silent() {
        let rig = rig();
        let mut status = rig.controller.status();
        wait_for(|| status.borrow_and_update().link == LinkStatus::Connected).await;

        rig.controller.toggle_publishing();
        wait_for(|| status.borrow_and_update().gate == GateState::Publishing).await;

        rig.detections.send(hand_at(0.5, 0.5)).unwrap();
        wait_for(|| publishes(&rig.link_state).len() == 1).await;

        // Five empty frames in a row: no update, no publish, held position.
        for _ in 0..5 {
            rig.detections.send(Vec::new()).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(publishes(&rig.link_state).len(), 1);
        assert_eq!(
            status.borrow_and_update().last_position,
            Some(Coordinate2D { x: 90.0, y: 90.0 })
        );
        rig.controller.exit().await;
    }

    #[tokio::test]
    async fn test_toggle_on_republishes_held_position() {
        let rig = rig();
        let mut status = rig.controller.status();
        wait_for(|| status.borrow_and_update().link == LinkStatus::Connected).await;

        // Position observed while idle, then publishing turned on.
        rig.detections.send(hand_at(0.5, 0.5)).unwrap();
        wait_for(|| status.borrow_and_update().last_position.is_some()).await;

        rig.controller.toggle_publishing();
        wait_for(|| publishes(&rig.link_state).len() == 1).await;
        assert_eq!(publishes(&rig.link_state)[0].1, "90,90");
        rig.controller.exit().await;
    }

    #[tokio::test]
    async fn test_gate_tracks_interleaved_toggles_and_link_changes() {
        let rig = rig();
        let mut status = rig.controller.status();
        wait_for(|| status.borrow_and_update().link == LinkStatus::Connected).await;

        rig.controller.toggle_publishing();
        wait_for(|| status.borrow_and_update().gate == GateState::Publishing).await;

        let lost_tx = rig.link_state.lock().unwrap().lost_signals.pop().unwrap();
        lost_tx.send(()).unwrap();
        wait_for(|| status.borrow_and_update().gate == GateState::Blocked).await;

        // Toggle off while blocked.
        rig.controller.toggle_publishing();
        wait_for(|| status.borrow_and_update().gate == GateState::Idle).await;

        // Link restored while idle: still idle.
        rig.link_state.lock().unwrap().dial_permits += 1;
        wait_for(|| status.borrow_and_update().link == LinkStatus::Connected).await;
        assert_eq!(status.borrow_and_update().gate, GateState::Idle);

        // Toggle back on against the restored link: straight to Publishing.
        rig.controller.toggle_publishing();
        wait_for(|| status.borrow_and_update().gate == GateState::Publishing).await;
        rig.controller.exit().await;
    }

    #[tokio::test]
    async fn test_exit_tears_down_exactly_once() {
        let rig = rig();
        let mut status = rig.controller.status();
        wait_for(|| status.borrow_and_update().link == LinkStatus::Connected).await;

        tokio::join!(rig.controller.exit(), rig.controller.exit());
        rig.controller.exit().await;

        assert_eq!(rig.link_state.lock().unwrap().close_calls, 1);
    }
}
