use crate::config::Config;
use crate::loader;
use chrono::Local;
use rollcall_core::encoder::EncoderError;
use rollcall_core::{
    AttendanceSession, FaceDetector, FaceEncoder, Matcher, NearestMatcher, Roster,
};
use rollcall_hw::{Camera, CameraError, Frame};
use rollcall_store::{AttendanceError, AttendanceWriter, RosterError, RosterStore};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};

/// Overlay colors for matched and unknown faces.
const MATCH_COLOR: [u8; 3] = [0, 255, 0];
const UNKNOWN_COLOR: [u8; 3] = [255, 0, 0];

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] rollcall_core::detector::DetectorError),
    #[error("encoder error: {0}")]
    Encoder(#[from] rollcall_core::encoder::EncoderError),
    #[error("roster error: {0}")]
    Roster(#[from] RosterError),
    #[error("attendance error: {0}")]
    Attendance(#[from] AttendanceError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from the CLI to the engine thread.
enum EngineRequest {
    Toggle { reply: oneshot::Sender<bool> },
    Present { reply: oneshot::Sender<Vec<String>> },
    NotPresent { reply: oneshot::Sender<Vec<String>> },
    Absent { reply: oneshot::Sender<Vec<String>> },
}

/// Clone-safe handle to the engine thread. Dropping every handle closes the
/// channel and ends the recognition loop.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Flip recognition on/off; returns the new state.
    pub async fn toggle(&self) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::Toggle { reply }).await
    }

    /// Students currently marked present.
    pub async fn present(&self) -> Result<Vec<String>, EngineError> {
        self.request(|reply| EngineRequest::Present { reply }).await
    }

    /// Students never recognized this session.
    pub async fn not_present(&self) -> Result<Vec<String>, EngineError> {
        self.request(|reply| EngineRequest::NotPresent { reply }).await
    }

    /// Students marked as having left.
    pub async fn absent(&self) -> Result<Vec<String>, EngineError> {
        self.request(|reply| EngineRequest::Absent { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the recognition engine on a dedicated OS thread.
///
/// Opens the camera, loads both ONNX models, loads the roster and encodes
/// every student photo, then enters the tick loop. Fails fast if any
/// resource is unavailable; students whose photos cannot be encoded are
/// skipped with a warning.
pub fn spawn_engine(config: &Config, recognize: bool) -> Result<EngineHandle, EngineError> {
    let camera = Camera::open(&config.camera_device())?;
    tracing::info!(
        device = %camera.device_path,
        width = camera.width,
        height = camera.height,
        "camera opened"
    );

    let mut detector = FaceDetector::load(&config.detector_model_path())?;
    let mut encoder = FaceEncoder::load(&config.encoder_model_path())?;

    let store = RosterStore::load(&config.roster_path)?;
    let roster = loader::build_roster(store.students(), |student| {
        loader::encode_photo(&mut detector, &mut encoder, student)
    });
    tracing::info!(
        registered = store.len(),
        enrolled = roster.len(),
        "roster loaded"
    );

    let mut session = AttendanceSession::new(config.exit_after_misses);
    for name in roster.names() {
        session.add_student(name);
    }

    let engine = Engine {
        camera,
        detector,
        encoder,
        roster,
        session,
        writer: AttendanceWriter::new(&config.attendance_dir),
        matcher: NearestMatcher,
        threshold: config.match_threshold,
        tick_interval: Duration::from_millis(config.tick_ms),
        frame_dir: config.frame_dir.clone(),
        recognizing: recognize,
    };

    let (tx, rx) = mpsc::channel::<EngineRequest>(8);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || engine.run(rx))
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}

struct Engine {
    camera: Camera,
    detector: FaceDetector,
    encoder: FaceEncoder,
    roster: Roster,
    session: AttendanceSession,
    writer: AttendanceWriter,
    matcher: NearestMatcher,
    threshold: f32,
    tick_interval: Duration,
    frame_dir: Option<PathBuf>,
    recognizing: bool,
}

impl Engine {
    fn run(mut self, mut rx: mpsc::Receiver<EngineRequest>) {
        tracing::info!(recognizing = self.recognizing, "engine thread started");

        loop {
            loop {
                match rx.try_recv() {
                    Ok(req) => self.handle(req),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        tracing::info!("engine thread exiting");
                        return;
                    }
                }
            }

            if self.recognizing {
                if let Err(error) = self.run_tick() {
                    tracing::error!(%error, "recognition tick failed; stopping engine");
                    return;
                }
            }

            std::thread::sleep(self.tick_interval);
        }
    }

    fn handle(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::Toggle { reply } => {
                self.recognizing = !self.recognizing;
                tracing::info!(recognizing = self.recognizing, "recognition toggled");
                let _ = reply.send(self.recognizing);
            }
            EngineRequest::Present { reply } => {
                let _ = reply.send(self.session.present());
            }
            EngineRequest::NotPresent { reply } => {
                let _ = reply.send(self.session.not_present());
            }
            EngineRequest::Absent { reply } => {
                let _ = reply.send(self.session.absent());
            }
        }
    }

    /// One recognition tick: capture, detect, match, mark, persist.
    fn run_tick(&mut self) -> Result<(), EngineError> {
        let now = Local::now();

        let mut frame = match self.camera.capture_frame() {
            Ok(frame) => frame,
            Err(error) => {
                tracing::debug!(%error, "frame capture failed; skipping tick");
                return Ok(());
            }
        };

        let faces = self.detector.detect(&frame.data, frame.width, frame.height)?;

        let mut matched = Vec::new();
        for face in &faces {
            let encoding = match self.encoder.extract(&frame.data, frame.width, frame.height, face)
            {
                Ok(encoding) => encoding,
                Err(EncoderError::DegenerateCrop) => continue,
                Err(e) => return Err(e.into()),
            };

            let result = self.matcher.nearest(&encoding, &self.roster, self.threshold);
            let color = if result.matched { MATCH_COLOR } else { UNKNOWN_COLOR };
            frame.draw_box(face.x, face.y, face.width, face.height, color);

            tracing::debug!(
                label = result.label(),
                distance = result.distance,
                confidence = face.confidence,
                "face processed"
            );
            if let Some(name) = result.name {
                matched.push(name);
            }
        }

        let outcome = self.session.observe(matched.iter().map(|s| s.as_str()), now);
        for name in &outcome.entered {
            let course = self
                .roster
                .student_by_name(name)
                .map(|s| s.course.as_str())
                .unwrap_or_default();
            tracing::info!(name = %name, course, "marked present");
        }
        for name in &outcome.exited {
            tracing::info!(name = %name, "marked exited");
        }

        if outcome.rewrite_needed {
            self.writer.write_day(now.date_naive(), &self.session)?;
        }

        if !faces.is_empty() {
            if let Some(dir) = &self.frame_dir {
                let path = dir.join(format!("{}.jpg", now.format("%Y%m%d-%H%M%S%3f")));
                if let Err(error) = std::fs::create_dir_all(dir)
                    .map_err(anyhow::Error::from)
                    .and_then(|_| save_frame_jpeg(&frame, &path))
                {
                    tracing::warn!(%error, path = %path.display(), "failed to save annotated frame");
                }
            }
        }

        Ok(())
    }
}

/// Encode an RGB frame as a JPEG file.
pub fn save_frame_jpeg(frame: &Frame, path: &Path) -> anyhow::Result<()> {
    let img = image::RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| anyhow::anyhow!("frame buffer does not match its dimensions"))?;
    img.save(path)?;
    Ok(())
}
