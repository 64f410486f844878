use chrono::{DateTime, Utc};
use image::{imageops, RgbImage};
use std::sync::Arc;
use uuid::Uuid;

/// One captured camera frame. Cloning shares the pixel buffer.
#[derive(Clone)]
pub struct Frame {
    frame_id: Uuid,
    image: Arc<RgbImage>,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            frame_id: Uuid::new_v4(),
            image: Arc::new(image),
            captured_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.frame_id
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Horizontally flipped copy, used for the selfie-style mirror view.
    pub fn mirrored(&self) -> Self {
        Self {
            frame_id: self.frame_id,
            image: Arc::new(imageops::flip_horizontal(self.image.as_ref())),
            captured_at: self.captured_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn cloning_frame_shares_image_buffer() {
        let f1 = Frame::new(RgbImage::from_pixel(16, 16, Rgb([1, 2, 3])));
        let f2 = f1.clone();
        assert!(Arc::ptr_eq(&f1.image, &f2.image));
    }

    #[test]
    fn mirrored_frame_flips_columns() {
        let mut img = RgbImage::new(4, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let mirrored = Frame::new(img).mirrored();
        assert_eq!(mirrored.image().get_pixel(3, 0), &Rgb([255, 0, 0]));
        assert_eq!(mirrored.image().get_pixel(0, 0), &Rgb([0, 0, 0]));
    }
}
