use crate::error::EffectError;

use super::{Effect, EffectContext, Surface};

/// Full-frame colour wash. Lightning flickers and throws arcs from the palm.
pub struct TintEffect {
    color: [u8; 3],
    strength: f32,
    flicker: bool,
    started_at: Option<f64>,
}

impl TintEffect {
    pub fn new(color: [u8; 3], strength: f32) -> Self {
        Self {
            color,
            strength,
            flicker: false,
            started_at: None,
        }
    }

    pub fn lightning() -> Self {
        Self {
            flicker: true,
            ..Self::new([90, 160, 255], 0.35)
        }
    }

    pub fn water() -> Self {
        Self::new([30, 110, 220], 0.3)
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    fn strength_at(&self, now: f64) -> f32 {
        let Some(start) = self.started_at else {
            return 0.0;
        };
        let ramp = ((now - start) / 0.2).clamp(0.0, 1.0) as f32;
        let wobble = if self.flicker {
            0.75 + 0.25 * ((now * 37.0).sin() as f32).abs()
        } else {
            1.0
        };
        self.strength * ramp * wobble
    }
}

impl Effect for TintEffect {
    fn on_start(&mut self, ctx: &EffectContext<'_>) {
        self.started_at = Some(ctx.now);
    }

    fn on_update(&mut self, _ctx: &EffectContext<'_>, _dt: f64) -> Result<(), EffectError> {
        Ok(())
    }

    fn on_render(
        &mut self,
        ctx: &EffectContext<'_>,
        surface: &mut Surface,
    ) -> Result<(), EffectError> {
        if !self.is_running() {
            return Ok(());
        }
        surface.tint(self.color, self.strength_at(ctx.now));

        if self.flicker {
            if let Some(palm) = ctx.anchors.palm {
                let (cx, cy) = surface.to_pixels(palm);
                let reach = surface.width() as f32 * 0.12;
                for arm in 0..5 {
                    let angle = arm as f64 * 1.2566 + ctx.now * 9.0;
                    let mut from = (cx, cy);
                    for segment in 1..=4 {
                        let r = reach * segment as f32 / 4.0;
                        let jitter = ((ctx.now * 53.0 + segment as f64 * 7.0 + arm as f64).sin()
                            * 0.35) as f32;
                        let a = angle as f32 + jitter;
                        let to = (cx + r * a.cos(), cy + r * a.sin());
                        surface.line(from, to, [220, 240, 255], 0.9);
                        from = to;
                    }
                }
            }
        }
        Ok(())
    }

    fn on_end(&mut self, _ctx: &EffectContext<'_>) {
        self.started_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::Anchors;
    use image::{Rgb, RgbImage};

    #[test]
    fn tint_applies_only_while_running() {
        let mut tint = TintEffect::water();
        let anchors = Anchors::default();
        let mut surface = Surface::new(RgbImage::from_pixel(2, 2, Rgb([0, 0, 0])));
        tint.on_render(&EffectContext::new(1.0, &anchors), &mut surface)
            .unwrap();
        assert_eq!(surface.image().get_pixel(0, 0), &Rgb([0, 0, 0]));

        tint.on_start(&EffectContext::new(0.0, &anchors));
        tint.on_render(&EffectContext::new(1.0, &anchors), &mut surface)
            .unwrap();
        assert_ne!(surface.image().get_pixel(0, 0), &Rgb([0, 0, 0]));
    }
}
