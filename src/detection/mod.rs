pub mod landmarks;
pub mod synthetic;

use serde::{Deserialize, Serialize};

use crate::{
    common::{Frame, SignToken},
    error::{CaptureError, DetectionError},
};

pub use landmarks::{FaceSummary, HandSummary, LandmarkTracker, Landmarks, NoLandmarks};
pub use synthetic::{
    ChannelClassifier, ScriptedClassifier, SignInjector, StaticLandmarks, SyntheticCamera,
};

/// Best sign found in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: SignToken,
    pub confidence: f32,
}

/// One raw classifier hit, in pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
    pub center: [f32; 2],
}

impl Detection {
    pub fn new(class: impl Into<String>, confidence: f32, bbox: [f32; 4]) -> Self {
        Self {
            class: class.into(),
            confidence,
            center: [(bbox[0] + bbox[2]) / 2.0, (bbox[1] + bbox[3]) / 2.0],
            bbox,
        }
    }
}

/// Picks the most confident detection strictly above `min_confidence`.
pub fn best_detection(detections: &[Detection], min_confidence: f32) -> Option<Classification> {
    detections
        .iter()
        .filter(|d| d.confidence > min_confidence)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .map(|d| Classification {
            label: SignToken::new(&d.class),
            confidence: d.confidence,
        })
}

/// Hand-sign classifier collaborator.
pub trait Classifier: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError>;

    fn class_names(&self) -> Vec<String>;

    fn classify(
        &mut self,
        frame: &Frame,
        min_confidence: f32,
    ) -> Result<Option<Classification>, DetectionError> {
        Ok(best_detection(&self.detect(frame)?, min_confidence))
    }
}

/// Camera collaborator. `capture` may block for up to one frame interval.
pub trait FrameSource: Send {
    fn capture(&mut self) -> Result<Frame, CaptureError>;

    fn release(&mut self) {}
}

impl<T: Classifier + ?Sized> Classifier for Box<T> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        (**self).detect(frame)
    }

    fn class_names(&self) -> Vec<String> {
        (**self).class_names()
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        (**self).capture()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_detection_keeps_highest_confidence_above_threshold() {
        let detections = vec![
            Detection::new("ram", 0.6, [0.0, 0.0, 10.0, 10.0]),
            Detection::new("Tiger", 0.9, [0.0, 0.0, 10.0, 10.0]),
            Detection::new("ox", 0.5, [0.0, 0.0, 10.0, 10.0]),
        ];
        let best = best_detection(&detections, 0.5).expect("one detection qualifies");
        assert_eq!(best.label, SignToken::new("tiger"));
        assert!(best_detection(&detections[2..], 0.5).is_none());
    }

    #[test]
    fn detection_center_is_bbox_midpoint() {
        let d = Detection::new("ram", 0.9, [10.0, 20.0, 30.0, 60.0]);
        assert_eq!(d.center, [20.0, 40.0]);
    }
}
