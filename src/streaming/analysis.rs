use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::timeout::{error::Elapsed, TimeoutLayer};
use tower::util::BoxService;
use tower::{BoxError, Service, ServiceBuilder};
use tracing::debug;

use crate::{
    common::Frame,
    detection::{Classifier, Detection, FrameSource, LandmarkTracker, Landmarks},
    error::{AppError, DetectionError},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisRequest {
    pub keep_landmarks: bool,
}

pub struct FrameAnalysis {
    pub frame: Frame,
    pub detections: Vec<Detection>,
    pub landmarks: Landmarks,
}

/// One connection's camera and models. Everything here may block.
pub struct Analyzer {
    camera: Box<dyn FrameSource>,
    classifier: Box<dyn Classifier>,
    landmarks: Box<dyn LandmarkTracker>,
}

impl Analyzer {
    pub fn new(
        camera: Box<dyn FrameSource>,
        classifier: Box<dyn Classifier>,
        landmarks: Box<dyn LandmarkTracker>,
    ) -> Self {
        Self {
            camera,
            classifier,
            landmarks,
        }
    }

    pub fn class_names(&self) -> Vec<String> {
        self.classifier.class_names()
    }

    pub fn analyze(&mut self, request: AnalysisRequest) -> Result<FrameAnalysis, AppError> {
        let frame = self.camera.capture()?;
        let detections = self.classifier.detect(&frame)?;
        let landmarks = match self.landmarks.track(&frame, request.keep_landmarks) {
            Ok(landmarks) => landmarks,
            Err(e) => {
                debug!("Landmark tracking failed: {}", e);
                Landmarks::default()
            }
        };
        Ok(FrameAnalysis {
            frame,
            detections,
            landmarks,
        })
    }

    pub fn release(&mut self) {
        self.camera.release();
    }
}

pub type SharedAnalyzer = Arc<Mutex<Analyzer>>;

/// Runs the analyzer on the blocking pool so a slow camera or model never
/// stalls the tasks of other connections.
#[derive(Clone)]
pub struct AnalysisService {
    analyzer: SharedAnalyzer,
}

impl AnalysisService {
    pub fn new(analyzer: SharedAnalyzer) -> Self {
        Self { analyzer }
    }
}

impl Service<AnalysisRequest> for AnalysisService {
    type Response = FrameAnalysis;
    type Error = BoxError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: AnalysisRequest) -> Self::Future {
        let analyzer = self.analyzer.clone();
        Box::pin(async move {
            let analysis = tokio::task::spawn_blocking(move || {
                let mut analyzer = analyzer.lock().map_err(|_| {
                    DetectionError::Failed("analyzer lock poisoned".to_string())
                })?;
                analyzer.analyze(request)
            })
            .await
            .map_err(|e| AppError::Detection(DetectionError::Failed(e.to_string())))??;
            Ok::<_, BoxError>(analysis)
        })
    }
}

pub type AnalysisPipeline = BoxService<AnalysisRequest, FrameAnalysis, BoxError>;

pub fn analysis_pipeline(analyzer: SharedAnalyzer, timeout: Option<Duration>) -> AnalysisPipeline {
    let service = ServiceBuilder::new()
        .option_layer(timeout.map(TimeoutLayer::new))
        .service(AnalysisService::new(analyzer));
    BoxService::new(service)
}

/// Recovers the typed error from a pipeline failure.
pub fn into_app_error(error: BoxError) -> AppError {
    if error.is::<Elapsed>() {
        return AppError::Detection(DetectionError::Timeout);
    }
    match error.downcast::<AppError>() {
        Ok(e) => *e,
        Err(other) => AppError::Detection(DetectionError::Failed(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{NoLandmarks, ScriptedClassifier, SyntheticCamera};
    use crate::error::CaptureError;
    use tower::ServiceExt;

    fn analyzer(camera: SyntheticCamera) -> SharedAnalyzer {
        Arc::new(Mutex::new(Analyzer::new(
            Box::new(camera),
            Box::new(ScriptedClassifier::new(vec![Some(("ram", 0.9))])),
            Box::new(NoLandmarks),
        )))
    }

    #[tokio::test]
    async fn pipeline_captures_and_detects() {
        let mut pipeline = analysis_pipeline(
            analyzer(SyntheticCamera::new(32, 24)),
            Some(Duration::from_secs(5)),
        );
        let analysis = pipeline
            .ready()
            .await
            .unwrap()
            .call(AnalysisRequest::default())
            .await
            .unwrap();
        assert_eq!(analysis.frame.width(), 32);
        assert_eq!(analysis.detections.len(), 1);
        assert_eq!(analysis.detections[0].class, "ram");
    }

    #[tokio::test]
    async fn capture_failures_keep_their_type() {
        let mut camera = SyntheticCamera::new(32, 24);
        camera.release();
        let mut pipeline = analysis_pipeline(analyzer(camera), None);
        let error = match pipeline
            .ready()
            .await
            .unwrap()
            .call(AnalysisRequest::default())
            .await
        {
            Ok(_) => panic!("released camera produced a frame"),
            Err(e) => into_app_error(e),
        };
        assert!(matches!(
            error,
            AppError::Capture(CaptureError::Unavailable(_))
        ));
    }

    #[test]
    fn elapsed_maps_to_timeout() {
        let error: BoxError = Box::new(Elapsed::new());
        assert!(matches!(
            into_app_error(error),
            AppError::Detection(DetectionError::Timeout)
        ));
    }
}
