use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

use crate::{
    common::{Frame, SignToken},
    error::{CaptureError, DetectionError},
};

use super::{
    landmarks::{FaceSummary, HandSummary, LandmarkTracker, Landmarks},
    Classifier, Detection, FrameSource,
};

pub const BACKDROP: [u8; 3] = [0, 177, 64];

/// Renders a chroma-key backdrop with a swaying silhouette. Stands in for a
/// webcam in headless runs and tests.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    frames: u64,
    released: bool,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(8),
            height: height.max(8),
            frames: 0,
            released: false,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames
    }
}

impl FrameSource for SyntheticCamera {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        if self.released {
            return Err(CaptureError::Unavailable("camera released".to_string()));
        }
        let sway = ((self.frames as f32) * 0.05).sin() * self.width as f32 * 0.05;
        let cx = self.width as f32 / 2.0 + sway;
        let head_r = self.height as f32 * 0.12;
        let head_cy = self.height as f32 * 0.3;
        let body_top = head_cy + head_r;
        let body_half = self.width as f32 * 0.12;
        let image = RgbImage::from_fn(self.width, self.height, |x, y| {
            let (fx, fy) = (x as f32, y as f32);
            let in_head = (fx - cx).powi(2) + (fy - head_cy).powi(2) <= head_r * head_r;
            let in_body = fy >= body_top && (fx - cx).abs() <= body_half;
            if in_head {
                Rgb([224, 172, 140])
            } else if in_body {
                Rgb([40, 40, 120])
            } else {
                Rgb(BACKDROP)
            }
        });
        self.frames += 1;
        Ok(Frame::new(image))
    }

    fn release(&mut self) {
        debug!("Releasing synthetic camera after {} frames", self.frames);
        self.released = true;
    }
}

fn full_frame_detection(frame: &Frame, label: &str, confidence: f32) -> Detection {
    let (w, h) = (frame.width() as f32, frame.height() as f32);
    Detection::new(label, confidence, [w * 0.3, h * 0.4, w * 0.7, h * 0.9])
}

/// Replays a fixed list of per-frame results, then reports nothing unless
/// looping.
#[derive(Debug, Clone, Default)]
pub struct ScriptedClassifier {
    script: VecDeque<Option<(String, f32)>>,
    class_names: Vec<String>,
    looping: bool,
}

impl ScriptedClassifier {
    pub fn new<I, S>(script: I) -> Self
    where
        I: IntoIterator<Item = Option<(S, f32)>>,
        S: Into<String>,
    {
        let script: VecDeque<_> = script
            .into_iter()
            .map(|entry| entry.map(|(label, confidence)| (label.into(), confidence)))
            .collect();
        let mut class_names: Vec<String> = Vec::new();
        for (label, _) in script.iter().flatten() {
            if !class_names.contains(label) {
                class_names.push(label.clone());
            }
        }
        Self {
            script,
            class_names,
            looping: false,
        }
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    pub fn with_class_names(mut self, class_names: Vec<String>) -> Self {
        self.class_names = class_names;
        self
    }

    /// Shows each sign for `hold` frames then `gap` idle frames, `repeats` times.
    pub fn performing(signs: &[SignToken], hold: usize, gap: usize, repeats: usize) -> Self {
        let mut script = Vec::new();
        for _ in 0..repeats {
            for sign in signs {
                script.extend(std::iter::repeat(Some((sign.to_string(), 0.9))).take(hold));
                script.extend(std::iter::repeat(None).take(gap));
            }
        }
        Self::new(script)
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Classifier for ScriptedClassifier {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        let entry = self.script.pop_front();
        if self.looping {
            if let Some(entry) = &entry {
                self.script.push_back(entry.clone());
            }
        }
        Ok(match entry.flatten() {
            Some((label, confidence)) => vec![full_frame_detection(frame, &label, confidence)],
            None => Vec::new(),
        })
    }

    fn class_names(&self) -> Vec<String> {
        self.class_names.clone()
    }
}

/// Sender half used to inject signs by hand (keyboard, tests).
#[derive(Debug, Clone)]
pub struct SignInjector {
    sender: mpsc::UnboundedSender<SignToken>,
}

impl SignInjector {
    pub fn inject(&self, sign: impl Into<SignToken>) -> bool {
        self.sender.send(sign.into()).is_ok()
    }
}

/// Reports one full-confidence detection per injected sign.
pub struct ChannelClassifier {
    receiver: mpsc::UnboundedReceiver<SignToken>,
    class_names: Vec<String>,
}

impl ChannelClassifier {
    pub fn new(class_names: Vec<String>) -> (Self, SignInjector) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                receiver,
                class_names,
            },
            SignInjector { sender },
        )
    }
}

impl Classifier for ChannelClassifier {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        match self.receiver.try_recv() {
            Ok(sign) => Ok(vec![full_frame_detection(frame, sign.as_str(), 1.0)]),
            Err(TryRecvError::Empty) => Ok(Vec::new()),
            Err(TryRecvError::Disconnected) => Err(DetectionError::Unavailable(
                "sign injector dropped".to_string(),
            )),
        }
    }

    fn class_names(&self) -> Vec<String> {
        self.class_names.clone()
    }
}

/// Fixed face and hand positions, for driving anchored effects without a
/// landmark model.
#[derive(Debug, Clone)]
pub struct StaticLandmarks {
    landmarks: Landmarks,
}

impl StaticLandmarks {
    pub fn new(landmarks: Landmarks) -> Self {
        Self { landmarks }
    }

    /// Matches the silhouette drawn by [`SyntheticCamera`].
    pub fn centered() -> Self {
        Self::new(Landmarks {
            face: Some(FaceSummary {
                mouth: [0.5, 0.36, 0.0],
                nose: [0.5, 0.3, 0.0],
                left_eye: [0.46, 0.27, 0.0],
                right_eye: [0.54, 0.27, 0.0],
                head_yaw: 0.0,
                landmarks: None,
            }),
            hand: Some(HandSummary {
                palm_center: [0.62, 0.62],
                handedness: "Right".to_string(),
                palm_span: 0.18,
                landmarks: None,
            }),
        })
    }
}

impl LandmarkTracker for StaticLandmarks {
    fn track(&mut self, _frame: &Frame, _keep: bool) -> Result<Landmarks, DetectionError> {
        Ok(self.landmarks.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_camera_stops_after_release() {
        let mut camera = SyntheticCamera::new(64, 48);
        let frame = camera.capture().expect("camera is open");
        assert_eq!((frame.width(), frame.height()), (64, 48));
        assert_eq!(frame.image().get_pixel(0, 0), &Rgb(BACKDROP));
        camera.release();
        assert!(matches!(camera.capture(), Err(CaptureError::Unavailable(_))));
    }

    #[test]
    fn scripted_classifier_replays_then_goes_quiet() {
        let frame = Frame::new(RgbImage::new(10, 10));
        let mut classifier =
            ScriptedClassifier::new(vec![Some(("Ram", 0.9)), None, Some(("snake", 0.4))]);
        let first = classifier.classify(&frame, 0.5).unwrap();
        assert_eq!(first.map(|c| c.label), Some(SignToken::new("ram")));
        assert!(classifier.classify(&frame, 0.5).unwrap().is_none());
        assert!(classifier.classify(&frame, 0.5).unwrap().is_none());
        assert!(classifier.detect(&frame).unwrap().is_empty());
        assert_eq!(classifier.class_names(), vec!["Ram", "snake"]);
    }

    #[test]
    fn looping_script_starts_over() {
        let frame = Frame::new(RgbImage::new(10, 10));
        let mut classifier = ScriptedClassifier::new(vec![Some(("ram", 0.9)), None]).looping();
        let labels: Vec<usize> = (0..5)
            .map(|_| classifier.detect(&frame).unwrap().len())
            .collect();
        assert_eq!(labels, vec![1, 0, 1, 0, 1]);
        assert_eq!(classifier.remaining(), 2);
    }

    #[test]
    fn channel_classifier_reports_injected_signs_once() {
        let frame = Frame::new(RgbImage::new(10, 10));
        let (mut classifier, injector) = ChannelClassifier::new(vec!["ram".to_string()]);
        assert!(injector.inject("ram"));
        assert_eq!(classifier.detect(&frame).unwrap().len(), 1);
        assert!(classifier.detect(&frame).unwrap().is_empty());
        drop(injector);
        assert!(classifier.detect(&frame).is_err());
    }
}
