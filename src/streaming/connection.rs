use base64::{engine::general_purpose::STANDARD, Engine};
use image::{codecs::jpeg::JpegEncoder, imageops, RgbImage};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::Instant,
};
use tower::{Service, ServiceExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    catalog::JutsuCatalog,
    common::SessionClock,
    config::{ClientSettings, Settings},
    detection::best_detection,
    error::{AppError, CatalogError, FrameError},
    session::{Session, SessionConfig},
};

use super::{
    analysis::{analysis_pipeline, into_app_error, AnalysisPipeline, AnalysisRequest, Analyzer},
    backend::Backend,
    codec::{MessageReader, MessageWriter},
    fps::FpsCounter,
    protocol::{unix_timestamp, ControlMessage, FrameRecord, ServerMessage, SERVER_VERSION},
};

/// Shared, read-only state handed to every connection.
pub struct ServerContext {
    pub catalog: Arc<JutsuCatalog>,
    pub settings: Settings,
    pub backend: Arc<dyn Backend>,
}

/// One peer: its own session, camera and models, driven by its own task.
pub struct Connection {
    id: Uuid,
    context: Arc<ServerContext>,
    session: Session,
    settings: ClientSettings,
    analyzer: Arc<Mutex<Analyzer>>,
    pipeline: AnalysisPipeline,
    writer: Box<dyn MessageWriter>,
    inbound: mpsc::Receiver<ControlMessage>,
    reader_task: JoinHandle<()>,
    clock: SessionClock,
    fps: FpsCounter,
    class_names: Vec<String>,
}

fn open_session(
    context: &ServerContext,
    settings: &ClientSettings,
) -> Result<Session, CatalogError> {
    let config = SessionConfig::from_settings(&context.settings)
        .with_player_level(settings.player_level);
    let config = if context.catalog.get(&settings.current_jutsu).is_some() {
        config.with_initial_jutsu(settings.current_jutsu.clone())
    } else {
        warn!(
            "Unknown jutsu {} requested, starting on the first one",
            settings.current_jutsu
        );
        SessionConfig {
            initial_jutsu: None,
            ..config
        }
    };
    Session::new(context.catalog.clone(), config, context.backend.segmenter())
}

/// Forwards parsed control messages until the peer goes away. Malformed
/// messages are logged and dropped.
fn spawn_reader(
    id: Uuid,
    mut reader: Box<dyn MessageReader>,
    inbound: mpsc::Sender<ControlMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match reader.read().await {
                Ok(Some(payload)) => match serde_json::from_slice::<ControlMessage>(&payload) {
                    Ok(message) => {
                        if inbound.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let preview = String::from_utf8_lossy(&payload[..payload.len().min(100)])
                            .into_owned();
                        warn!("Invalid message from {}: {} ({})", id, e, preview);
                    }
                },
                Ok(None) => {
                    debug!("Peer {} closed its stream", id);
                    break;
                }
                Err(e) => {
                    warn!("Read from {} failed: {}", id, e);
                    break;
                }
            }
        }
    })
}

impl Connection {
    pub fn open(
        id: Uuid,
        context: Arc<ServerContext>,
        reader: Box<dyn MessageReader>,
        writer: Box<dyn MessageWriter>,
    ) -> Result<Self, AppError> {
        let settings = context.settings.streaming.client.clone();
        let session = open_session(&context, &settings)?;
        let analyzer = Analyzer::new(
            context.backend.camera()?,
            context.backend.classifier()?,
            context.backend.landmarks(),
        );
        let class_names = analyzer.class_names();
        let analyzer = Arc::new(Mutex::new(analyzer));
        let timeout = context
            .settings
            .streaming
            .detection_timeout_ms
            .map(Duration::from_millis);
        let pipeline = analysis_pipeline(analyzer.clone(), timeout);
        let (inbound_tx, inbound) = mpsc::channel(32);
        let reader_task = spawn_reader(id, reader, inbound_tx);
        let mut connection = Self {
            id,
            context,
            session,
            settings,
            analyzer,
            pipeline,
            writer,
            inbound,
            reader_task,
            clock: SessionClock::start(),
            fps: FpsCounter::new(),
            class_names,
        };
        let effects_enabled = connection.settings.effects_enabled;
        connection.session.set_effects_enabled(effects_enabled);
        Ok(connection)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Runs until the peer disconnects, a write fails or `shutdown` fires.
    /// Either way only this connection's state is torn down.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), AppError> {
        info!("Connection {} started on {}", self.id, self.session.jutsu());
        let result = tokio::select! {
            _ = shutdown.recv() => {
                debug!("Connection {} received shutdown", self.id);
                Ok(())
            }
            result = self.serve() => result,
        };
        self.close();
        match &result {
            Ok(()) => info!("Connection {} closed", self.id),
            Err(e) => warn!("Connection {} closed with error: {}", self.id, e),
        }
        result
    }

    async fn serve(&mut self) -> Result<(), AppError> {
        let hello = ServerMessage::Connected {
            server_version: SERVER_VERSION.to_string(),
            jutsus: self.context.catalog.names().map(str::to_string).collect(),
            class_names: self.class_names.clone(),
        };
        self.writer.send(&hello).await?;

        let poll = Duration::from_millis(self.context.settings.streaming.inbound_poll_ms);
        loop {
            let cycle_start = Instant::now();
            match tokio::time::timeout(poll, self.inbound.recv()).await {
                Ok(Some(message)) => self.handle_control(message).await?,
                Ok(None) => return Ok(()),
                Err(_) => {}
            }
            while let Ok(message) = self.inbound.try_recv() {
                self.handle_control(message).await?;
            }

            if let Some(record) = self.process_frame().await? {
                self.writer.send(&ServerMessage::FrameData(record)).await?;
                self.fps.record(cycle_start.elapsed());
                if self.fps.total_frames() % 300 == 0 {
                    debug!(
                        "Connection {}: {:.1} fps, {:.0}us per frame",
                        self.id,
                        self.fps.fps(),
                        self.fps.average_frame_time_us()
                    );
                }
            }

            match self.settings.target_fps {
                0 => tokio::task::yield_now().await,
                fps => {
                    let deadline = cycle_start + Duration::from_secs_f64(1.0 / f64::from(fps));
                    tokio::time::sleep_until(deadline).await;
                }
            }
        }
    }

    async fn handle_control(&mut self, message: ControlMessage) -> Result<(), FrameError> {
        let now = self.clock.now();
        match message {
            ControlMessage::Settings(patch) => {
                patch.apply(&mut self.settings);
                if let Some(jutsu) = &patch.current_jutsu {
                    match self.session.select_jutsu(jutsu, now) {
                        Ok(true) => self.settings.current_jutsu = jutsu.clone(),
                        Ok(false) => debug!("Jutsu switch refused during a challenge"),
                        Err(e) => {
                            warn!("Connection {} asked for {}: {}", self.id, jutsu, e);
                            let error = ServerMessage::Error {
                                message: e.to_string(),
                            };
                            self.writer.send(&error).await?;
                        }
                    }
                }
                self.session.set_effects_enabled(self.settings.effects_enabled);
                self.session.set_player_level(self.settings.player_level);
                debug!("Connection {} settings now {:?}", self.id, self.settings);
                let echo = ServerMessage::Settings(self.settings.clone());
                self.writer.send(&echo).await
            }
            ControlMessage::Ping => {
                let pong = ServerMessage::Pong {
                    timestamp: unix_timestamp(),
                };
                self.writer.send(&pong).await
            }
            ControlMessage::GetJutsus => {
                let registry = ServerMessage::JutsuRegistry {
                    jutsus: self.context.catalog.as_ref().clone(),
                };
                self.writer.send(&registry).await
            }
            ControlMessage::Reset => {
                self.session.reset(now);
                Ok(())
            }
        }
    }

    /// Capture, classify, track and render one frame. A failed capture or
    /// model call skips the frame.
    async fn process_frame(&mut self) -> Result<Option<FrameRecord>, AppError> {
        let request = AnalysisRequest {
            keep_landmarks: self.settings.send_landmarks,
        };
        let pipeline = self.pipeline.ready().await.map_err(into_app_error)?;
        let analysis = match pipeline.call(request).await {
            Ok(analysis) => analysis,
            Err(e) => {
                debug!("Connection {} skipped a frame: {}", self.id, into_app_error(e));
                return Ok(None);
            }
        };

        let now = self.clock.now();
        self.session.set_landmarks(&analysis.landmarks);
        if !self.session.needs_precision_tracking() && self.session.detection_enabled() {
            let min_confidence = self.context.settings.sequence.min_confidence;
            let classification = best_detection(&analysis.detections, min_confidence);
            self.session
                .handle_classification(classification.as_ref(), now);
        }
        self.session.tick(now);
        let image = analysis.frame.image();
        self.session.update_effects(now, Some(image));

        let frame_encoded = if self.settings.send_frames {
            let rendered = self.session.render(now, image);
            Some(encode_frame(&rendered, self.settings.frame_quality)?)
        } else {
            None
        };

        let mut landmarks = analysis.landmarks;
        if !self.settings.send_landmarks {
            if let Some(face) = landmarks.face.as_mut() {
                face.landmarks = None;
            }
            if let Some(hand) = landmarks.hand.as_mut() {
                hand.landmarks = None;
            }
        }

        Ok(Some(FrameRecord {
            timestamp: unix_timestamp(),
            fps: self.fps.fps(),
            frame_size: [image.width(), image.height()],
            detections: analysis.detections,
            face: landmarks.face,
            hand: landmarks.hand,
            frame_encoded,
            sequence: self.session.summary(),
            events: self.session.drain_events(),
        }))
    }

    fn close(&mut self) {
        self.reader_task.abort();
        match self.analyzer.lock() {
            Ok(mut analyzer) => analyzer.release(),
            Err(_) => warn!("Connection {} could not release its camera", self.id),
        }
    }
}

/// Mirrors the frame and encodes it as base64 JPEG.
pub fn encode_frame(image: &RgbImage, quality: u8) -> Result<String, FrameError> {
    let mirrored = imageops::flip_horizontal(image);
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode_image(&mirrored)?;
    Ok(STANDARD.encode(jpeg))
}
