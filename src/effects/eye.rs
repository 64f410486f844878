use crate::error::EffectError;

use super::{Effect, EffectContext, Surface};

/// Red iris rings with three rotating tomoe over each tracked eye.
#[derive(Default)]
pub struct EyeEffect {
    started_at: Option<f64>,
}

impl EyeEffect {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Effect for EyeEffect {
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
        let Some(start) = self.started_at else {
            return Ok(());
        };
        let fade = ((ctx.now - start) / 0.3).clamp(0.0, 1.0) as f32;
        let r = surface.width() as f32 * 0.018;
        let spin = (ctx.now - start) as f32 * 4.0;
        for eye in [ctx.anchors.left_eye, ctx.anchors.right_eye]
            .into_iter()
            .flatten()
        {
            let (cx, cy) = surface.to_pixels(eye);
            surface.soft_circle(cx, cy, r, [200, 10, 20], 0.85 * fade);
            surface.ring(cx, cy, r * 0.6, 1.0, [20, 0, 0], 0.9 * fade);
            surface.soft_circle(cx, cy, r * 0.2, [10, 0, 0], fade);
            for i in 0..3 {
                let a = spin + i as f32 * std::f32::consts::TAU / 3.0;
                surface.soft_circle(
                    cx + r * 0.6 * a.cos(),
                    cy + r * 0.6 * a.sin(),
                    r * 0.18,
                    [10, 0, 0],
                    fade,
                );
            }
        }
        Ok(())
    }

    fn on_end(&mut self, _ctx: &EffectContext<'_>) {
        self.started_at = None;
    }
}
