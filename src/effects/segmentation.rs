use image::{ImageBuffer, Luma, RgbImage};

use crate::error::SegmentationError;

/// Per-pixel foreground confidence in `[0, 1]`.
pub type AlphaMask = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Person-segmentation collaborator consumed by the ghost-clone effect.
pub trait Segmenter: Send {
    fn segment(&mut self, frame: &RgbImage) -> Result<AlphaMask, SegmentationError>;
}

/// Treats everything far enough from a known backdrop colour as foreground.
/// Good enough for a green screen or the synthetic camera.
#[derive(Debug, Clone)]
pub struct ChromaKeySegmenter {
    key: [u8; 3],
    tolerance: f32,
    softness: f32,
}

impl ChromaKeySegmenter {
    pub fn new(key: [u8; 3]) -> Self {
        Self {
            key,
            tolerance: 40.0,
            softness: 30.0,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f32, softness: f32) -> Self {
        self.tolerance = tolerance;
        self.softness = softness.max(f32::EPSILON);
        self
    }
}

impl Segmenter for ChromaKeySegmenter {
    fn segment(&mut self, frame: &RgbImage) -> Result<AlphaMask, SegmentationError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(SegmentationError::Failed("empty frame".to_string()));
        }
        let key = self.key.map(f32::from);
        Ok(AlphaMask::from_fn(frame.width(), frame.height(), |x, y| {
            let px = frame.get_pixel(x, y).0;
            let distance = px
                .iter()
                .zip(key.iter())
                .map(|(&c, &k)| (f32::from(c) - k).powi(2))
                .sum::<f32>()
                .sqrt();
            Luma([((distance - self.tolerance) / self.softness).clamp(0.0, 1.0)])
        }))
    }
}
