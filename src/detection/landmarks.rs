use serde::{Deserialize, Serialize};

use crate::{common::Frame, effects::Anchors, error::DetectionError};

const MOUTH: usize = 13;
const NOSE: usize = 1;
const FACE_LEFT_EDGE: usize = 234;
const FACE_RIGHT_EDGE: usize = 454;
const LEFT_IRIS: usize = 468;
const RIGHT_IRIS: usize = 473;
const LEFT_EYELID: usize = 159;
const RIGHT_EYELID: usize = 386;
const PALM_POINTS: [usize; 5] = [0, 5, 9, 13, 17];
const INDEX_KNUCKLE: usize = 5;
const PINKY_KNUCKLE: usize = 17;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceSummary {
    pub mouth: [f32; 3],
    pub nose: [f32; 3],
    pub left_eye: [f32; 3],
    pub right_eye: [f32; 3],
    /// `-1..1`, zero when facing the camera.
    pub head_yaw: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<[f32; 2]>>,
}

impl FaceSummary {
    /// Summarizes a face mesh of normalized `[x, y, z]` points. Returns
    /// `None` when the mesh is too small to contain the key indices.
    pub fn from_mesh(points: &[[f32; 3]], keep_landmarks: bool) -> Option<Self> {
        if points.len() <= FACE_RIGHT_EDGE {
            return None;
        }
        let nose = points[NOSE];
        let left = points[FACE_LEFT_EDGE][0];
        let right = points[FACE_RIGHT_EDGE][0];
        let width = right - left;
        let head_yaw = if width > 0.0 {
            ((nose[0] - left) / width - 0.5) * 2.0
        } else {
            0.0
        };
        let left_eye = points.get(LEFT_IRIS).unwrap_or(&points[LEFT_EYELID]);
        let right_eye = points.get(RIGHT_IRIS).unwrap_or(&points[RIGHT_EYELID]);
        Some(Self {
            mouth: points[MOUTH],
            nose,
            left_eye: *left_eye,
            right_eye: *right_eye,
            head_yaw,
            landmarks: keep_landmarks.then(|| points.iter().map(|p| [p[0], p[1]]).collect()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandSummary {
    pub palm_center: [f32; 2],
    pub handedness: String,
    /// Distance between the index and pinky knuckles.
    #[serde(default)]
    pub palm_span: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<[f32; 2]>>,
}

impl HandSummary {
    /// Summarizes the 21 normalized hand landmarks.
    pub fn from_points(
        points: &[[f32; 3]],
        handedness: Option<&str>,
        keep_landmarks: bool,
    ) -> Option<Self> {
        if points.len() <= PINKY_KNUCKLE {
            return None;
        }
        let n = PALM_POINTS.len() as f32;
        let (sx, sy) = PALM_POINTS
            .iter()
            .fold((0.0, 0.0), |(sx, sy), &i| (sx + points[i][0], sy + points[i][1]));
        let a = points[INDEX_KNUCKLE];
        let b = points[PINKY_KNUCKLE];
        Some(Self {
            palm_center: [sx / n, sy / n],
            handedness: handedness.unwrap_or("Unknown").to_string(),
            palm_span: ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt(),
            landmarks: keep_landmarks.then(|| points.iter().map(|p| [p[0], p[1]]).collect()),
        })
    }
}

/// Face and hand tracking results for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Landmarks {
    pub face: Option<FaceSummary>,
    pub hand: Option<HandSummary>,
}

impl Landmarks {
    pub fn anchors(&self) -> Anchors {
        let mut anchors = Anchors::default();
        if let Some(face) = &self.face {
            anchors.mouth = Some([face.mouth[0], face.mouth[1]]);
            anchors.left_eye = Some([face.left_eye[0], face.left_eye[1]]);
            anchors.right_eye = Some([face.right_eye[0], face.right_eye[1]]);
            anchors.head_yaw = face.head_yaw;
        }
        if let Some(hand) = &self.hand {
            anchors.palm = Some(hand.palm_center);
            anchors.hand_scale = Some(hand.palm_span);
        }
        anchors
    }
}

/// Face/hand landmark collaborator, used for effect positioning.
pub trait LandmarkTracker: Send {
    fn track(&mut self, frame: &Frame, keep_landmarks: bool) -> Result<Landmarks, DetectionError>;
}

/// Tracker used when no landmark model is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLandmarks;

impl LandmarkTracker for NoLandmarks {
    fn track(&mut self, _frame: &Frame, _keep: bool) -> Result<Landmarks, DetectionError> {
        Ok(Landmarks::default())
    }
}

impl<T: LandmarkTracker + ?Sized> LandmarkTracker for Box<T> {
    fn track(&mut self, frame: &Frame, keep_landmarks: bool) -> Result<Landmarks, DetectionError> {
        (**self).track(frame, keep_landmarks)
    }
}
