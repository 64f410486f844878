use crate::{
    common::SignToken,
    detection::{
        synthetic::BACKDROP, Classifier, FrameSource, LandmarkTracker, ScriptedClassifier,
        StaticLandmarks, SyntheticCamera,
    },
    effects::{ChromaKeySegmenter, Segmenter},
    error::{CaptureError, DetectionError, SegmentationError},
};

/// Builds the per-connection collaborators. Every connection gets its own
/// camera, classifier and trackers so no model state is shared between peers.
pub trait Backend: Send + Sync {
    fn camera(&self) -> Result<Box<dyn FrameSource>, CaptureError>;

    fn classifier(&self) -> Result<Box<dyn Classifier>, DetectionError>;

    fn landmarks(&self) -> Box<dyn LandmarkTracker>;

    fn segmenter(&self) -> Result<Box<dyn Segmenter>, SegmentationError>;
}

/// Chroma-key camera with a scripted classifier. With a demo script each
/// connection performs it in a loop; without one nothing is ever detected.
#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    width: u32,
    height: u32,
    class_names: Vec<String>,
    demo: Option<Vec<SignToken>>,
}

const DEMO_HOLD_FRAMES: usize = 20;
const DEMO_GAP_FRAMES: usize = 10;

impl SyntheticBackend {
    pub fn new(width: u32, height: u32, class_names: Vec<String>) -> Self {
        Self {
            width,
            height,
            class_names,
            demo: None,
        }
    }

    pub fn with_demo(mut self, signs: Vec<SignToken>) -> Self {
        self.demo = Some(signs);
        self
    }
}

impl Backend for SyntheticBackend {
    fn camera(&self) -> Result<Box<dyn FrameSource>, CaptureError> {
        Ok(Box::new(SyntheticCamera::new(self.width, self.height)))
    }

    fn classifier(&self) -> Result<Box<dyn Classifier>, DetectionError> {
        let classifier = match &self.demo {
            Some(signs) => {
                ScriptedClassifier::performing(signs, DEMO_HOLD_FRAMES, DEMO_GAP_FRAMES, 1)
                    .looping()
            }
            None => ScriptedClassifier::new(Vec::<Option<(String, f32)>>::new()),
        };
        Ok(Box::new(
            classifier.with_class_names(self.class_names.clone()),
        ))
    }

    fn landmarks(&self) -> Box<dyn LandmarkTracker> {
        Box::new(StaticLandmarks::centered())
    }

    fn segmenter(&self) -> Result<Box<dyn Segmenter>, SegmentationError> {
        Ok(Box::new(ChromaKeySegmenter::new(BACKDROP)))
    }
}
