use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Error;
use opencv::core::{Mat, MatTraitConst};
use opencv::videoio;
use opencv::videoio::{VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::config::CameraConfig;
use crate::utils::coordinate::LandmarkSet;
use crate::utils::image::Frame;

/// Continuous supply of camera frames.
///
/// `Ok(None)` signals the end of the stream; errors are treated the same way
/// since a camera that stops delivering cannot be recovered mid-session.
pub trait FrameSource: Send + 'static {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error>;
}

/// Asynchronous hand-landmark detector.
///
/// One call per submitted frame; the result arrives later, so the caller
/// decides how many submissions may overlap.
pub trait LandmarkEngine: Send + 'static {
    fn detect(
        &mut self,
        frame: &Frame,
    ) -> impl Future<Output = Result<Vec<LandmarkSet>, Error>> + Send;
}

/// Webcam frame source backed by the local video capture device.
pub struct CameraSource {
    capture: VideoCapture,
}

impl CameraSource {
    /// open claims the capture device and applies the requested geometry.
    pub fn open(config: &CameraConfig) -> Result<Self, Error> {
        let mut capture = VideoCapture::new(config.device_index, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(Error::msg("extractor - camera device could not be opened"));
        }
        capture.set(videoio::CAP_PROP_FRAME_WIDTH, config.width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64)?;
        Ok(CameraSource { capture })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        let mut mat = Mat::default();
        let grabbed = self.capture.read(&mut mat)?;
        if !grabbed || mat.rows() == 0 {
            return Ok(None);
        }
        Ok(Some(Frame::new(mat)))
    }
}

/// Drives a [`FrameSource`] through a [`LandmarkEngine`] and emits one
/// detection result per inference cycle.
///
/// The loop awaits each inference result before reading the next frame, so at
/// most one submission is in flight and the backlog depth is bounded at one.
/// An empty result (no hand in frame) is forwarded as an empty vec; a failed
/// inference drops that frame and keeps the loop alive.
pub struct LandmarkExtractor {
    stop: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

impl LandmarkExtractor {
    /// spawn starts the capture/inference loop.
    ///
    /// # Arguments
    /// * `source` - frame supplier, consumed by the loop
    /// * `engine` - landmark detector, consumed by the loop
    ///
    /// # Returns
    /// * the extractor handle and the detection stream
    pub fn spawn<S, E>(
        mut source: S,
        mut engine: E,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<LandmarkSet>>)
    where
        S: FrameSource,
        E: LandmarkEngine,
    {
        let (detections_tx, detections_rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let worker = tokio::spawn(async move {
            loop {
                if stop_flag.load(Ordering::Acquire) {
                    break;
                }
                let frame = match source.next_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        debug!("frame source ended");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "frame capture failed, stopping extractor");
                        break;
                    }
                };

                match engine.detect(&frame).await {
                    Ok(hands) => {
                        if detections_tx.send(hands).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "hand inference failed, frame dropped"),
                }
            }
        });

        (LandmarkExtractor { stop, worker }, detections_rx)
    }

    /// shutdown stops frame capture and abandons any in-flight inference.
    pub async fn shutdown(self) {
        self.stop.store(true, Ordering::Release);
        self.worker.abort();
        let _ = self.worker.await;
    }
}
