use image::{Rgb, RgbImage};

use super::segmentation::AlphaMask;

/// Render target effects composite onto: the (mirrored) camera frame.
#[derive(Debug, Clone)]
pub struct Surface {
    image: RgbImage,
}

impl Surface {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(RgbImage::new(width, height))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Maps a normalized `[0, 1]` point to pixel coordinates.
    pub fn to_pixels(&self, point: [f32; 2]) -> (f32, f32) {
        (point[0] * self.width() as f32, point[1] * self.height() as f32)
    }

    pub fn blend_pixel(&mut self, x: i64, y: i64, color: [u8; 3], alpha: f32) {
        if x < 0 || y < 0 || x >= self.width() as i64 || y >= self.height() as i64 {
            return;
        }
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let Rgb(dst) = self.image.get_pixel_mut(x as u32, y as u32);
        for (d, c) in dst.iter_mut().zip(color.iter()) {
            *d = (f32::from(*d) * (1.0 - alpha) + f32::from(*c) * alpha).round() as u8;
        }
    }

    /// Filled disc whose opacity falls off linearly towards the rim.
    pub fn soft_circle(&mut self, cx: f32, cy: f32, radius: f32, color: [u8; 3], alpha: f32) {
        if radius <= 0.0 {
            return;
        }
        let (x0, x1) = ((cx - radius).floor() as i64, (cx + radius).ceil() as i64);
        let (y0, y1) = ((cy - radius).floor() as i64, (cy + radius).ceil() as i64);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
                if d <= radius {
                    self.blend_pixel(x, y, color, alpha * (1.0 - d / radius));
                }
            }
        }
    }

    pub fn ring(
        &mut self,
        cx: f32,
        cy: f32,
        radius: f32,
        thickness: f32,
        color: [u8; 3],
        alpha: f32,
    ) {
        let outer = radius + thickness / 2.0;
        let (x0, x1) = ((cx - outer).floor() as i64, (cx + outer).ceil() as i64);
        let (y0, y1) = ((cy - outer).floor() as i64, (cy + outer).ceil() as i64);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
                if (d - radius).abs() <= thickness / 2.0 {
                    self.blend_pixel(x, y, color, alpha);
                }
            }
        }
    }

    pub fn line(&mut self, from: (f32, f32), to: (f32, f32), color: [u8; 3], alpha: f32) {
        let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let x = from.0 + (to.0 - from.0) * t;
            let y = from.1 + (to.1 - from.1) * t;
            self.blend_pixel(x.round() as i64, y.round() as i64, color, alpha);
        }
    }

    pub fn tint(&mut self, color: [u8; 3], strength: f32) {
        let strength = strength.clamp(0.0, 1.0);
        for Rgb(px) in self.image.pixels_mut() {
            for (d, c) in px.iter_mut().zip(color.iter()) {
                *d = (f32::from(*d) * (1.0 - strength) + f32::from(*c) * strength).round() as u8;
            }
        }
    }

    /// Alpha-composites `src` with its top-left corner at `(x, y)`; parts
    /// falling outside the surface are clipped.
    pub fn composite(&mut self, src: &RgbImage, alpha: &AlphaMask, x: i64, y: i64, opacity: f32) {
        if opacity <= 0.0 {
            return;
        }
        let width = src.width().min(alpha.width());
        let height = src.height().min(alpha.height());
        for sy in 0..height {
            for sx in 0..width {
                let a = alpha.get_pixel(sx, sy).0[0] * opacity;
                if a > 0.0 {
                    let Rgb(color) = *src.get_pixel(sx, sy);
                    self.blend_pixel(x + sx as i64, y + sy as i64, color, a);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn composite_clips_to_bounds() {
        let mut surface = Surface::blank(4, 4);
        let src = RgbImage::from_pixel(2, 2, Rgb([200, 100, 50]));
        let alpha = AlphaMask::from_pixel(2, 2, Luma([1.0]));
        surface.composite(&src, &alpha, 3, -1, 1.0);
        assert_eq!(surface.image().get_pixel(3, 0), &Rgb([200, 100, 50]));
        assert_eq!(surface.image().get_pixel(2, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn half_opacity_blends_evenly() {
        let mut surface = Surface::new(RgbImage::from_pixel(1, 1, Rgb([0, 0, 0])));
        surface.blend_pixel(0, 0, [200, 100, 50], 0.5);
        assert_eq!(surface.image().get_pixel(0, 0), &Rgb([100, 50, 25]));
    }
}
