use crate::error::EffectError;

use super::{Effect, EffectContext, Surface};

const BASE_RADIUS: f32 = 0.06;
const REFERENCE_SPAN: f32 = 0.18;

/// Spinning chakra orb held at the palm, sized by the tracked hand span.
#[derive(Default)]
pub struct RasenganEffect {
    started_at: Option<f64>,
    center: Option<[f32; 2]>,
    radius: f32,
}

impl RasenganEffect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }
}

impl Effect for RasenganEffect {
    fn on_start(&mut self, ctx: &EffectContext<'_>) {
        self.started_at = Some(ctx.now);
    }

    fn on_update(&mut self, ctx: &EffectContext<'_>, _dt: f64) -> Result<(), EffectError> {
        let Some(start) = self.started_at else {
            return Ok(());
        };
        self.center = ctx.anchors.palm.or(self.center);
        let grow = ((ctx.now - start) / 0.4).clamp(0.0, 1.0) as f32;
        let scale = ctx.anchors.hand_scale.unwrap_or(REFERENCE_SPAN) / REFERENCE_SPAN;
        self.radius = BASE_RADIUS * scale.clamp(0.65, 1.9) * grow;
        Ok(())
    }

    fn on_render(
        &mut self,
        ctx: &EffectContext<'_>,
        surface: &mut Surface,
    ) -> Result<(), EffectError> {
        let (Some(_), Some(center)) = (self.started_at, self.center) else {
            return Ok(());
        };
        let (cx, cy) = surface.to_pixels(center);
        let r = self.radius * surface.width().max(surface.height()) as f32;
        surface.soft_circle(cx, cy, r * 1.6, [120, 190, 255], 0.35);
        surface.soft_circle(cx, cy, r, [200, 235, 255], 0.9);
        for i in 0..6 {
            let angle = ctx.now as f32 * 12.0 + i as f32 * std::f32::consts::TAU / 6.0;
            let orbit = r * 0.75;
            surface.soft_circle(
                cx + orbit * angle.cos(),
                cy + orbit * angle.sin(),
                r * 0.25,
                [255, 255, 255],
                0.8,
            );
        }
        Ok(())
    }

    fn on_end(&mut self, _ctx: &EffectContext<'_>) {
        self.started_at = None;
        self.center = None;
        self.radius = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::Anchors;

    #[test]
    fn orb_scales_with_hand_size() {
        let small = Anchors {
            palm: Some([0.5, 0.5]),
            hand_scale: Some(0.1),
            ..Anchors::default()
        };
        let large = Anchors {
            hand_scale: Some(0.4),
            ..small.clone()
        };
        let mut effect = RasenganEffect::new();
        effect.on_start(&EffectContext::new(0.0, &small));
        effect.on_update(&EffectContext::new(1.0, &small), 1.0).unwrap();
        let small_radius = effect.radius();
        effect.on_update(&EffectContext::new(1.0, &large), 0.0).unwrap();
        assert!(effect.radius() > small_radius);
    }
}
