pub mod eye;
pub mod fire;
pub mod ghost_clone;
pub mod orchestrator;
pub mod rasengan;
pub mod segmentation;
pub mod surface;
pub mod tint;

use image::RgbImage;

use crate::{common::SignToken, error::EffectError};

pub use eye::EyeEffect;
pub use fire::FireEffect;
pub use ghost_clone::GhostCloneEffect;
pub use orchestrator::EffectOrchestrator;
pub use rasengan::RasenganEffect;
pub use segmentation::{AlphaMask, ChromaKeySegmenter, Segmenter};
pub use surface::Surface;
pub use tint::TintEffect;

/// Tracked positions effects anchor to. Points are normalized `[x, y]`
/// in the displayed (mirrored) frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Anchors {
    pub mouth: Option<[f32; 2]>,
    pub left_eye: Option<[f32; 2]>,
    pub right_eye: Option<[f32; 2]>,
    pub palm: Option<[f32; 2]>,
    /// Normalized hand span, used to size hand-anchored effects.
    pub hand_scale: Option<f32>,
    /// Negative when the head turns left, positive when it turns right.
    pub head_yaw: f32,
}

/// Per-call view of the session handed to every effect.
#[derive(Debug, Clone, Copy)]
pub struct EffectContext<'a> {
    pub now: f64,
    pub jutsu: Option<&'a str>,
    pub frame: Option<&'a RgbImage>,
    pub anchors: &'a Anchors,
}

impl<'a> EffectContext<'a> {
    pub fn new(now: f64, anchors: &'a Anchors) -> Self {
        Self {
            now,
            jutsu: None,
            frame: None,
            anchors,
        }
    }

    pub fn with_jutsu(mut self, jutsu: &'a str) -> Self {
        self.jutsu = Some(jutsu);
        self
    }

    pub fn with_frame(mut self, frame: &'a RgbImage) -> Self {
        self.frame = Some(frame);
        self
    }
}

/// Lifecycle every visual effect implements. Lifecycle hooks default to no-ops.
pub trait Effect: Send {
    fn on_start(&mut self, _ctx: &EffectContext<'_>) {}

    fn on_update(&mut self, ctx: &EffectContext<'_>, dt: f64) -> Result<(), EffectError>;

    fn on_render(
        &mut self,
        ctx: &EffectContext<'_>,
        surface: &mut Surface,
    ) -> Result<(), EffectError>;

    fn on_end(&mut self, _ctx: &EffectContext<'_>) {}

    fn on_sign_detected(&mut self, _label: &SignToken, _ctx: &EffectContext<'_>) {}
}

/// The closed set of effect variants the orchestrator owns.
pub enum EffectInstance {
    Fire(FireEffect),
    Lightning(TintEffect),
    Rasengan(RasenganEffect),
    GhostClone(GhostCloneEffect),
    Eye(EyeEffect),
    Custom(Box<dyn Effect>),
}

impl EffectInstance {
    fn inner(&mut self) -> &mut dyn Effect {
        match self {
            EffectInstance::Fire(effect) => effect,
            EffectInstance::Lightning(effect) => effect,
            EffectInstance::Rasengan(effect) => effect,
            EffectInstance::GhostClone(effect) => effect,
            EffectInstance::Eye(effect) => effect,
            EffectInstance::Custom(effect) => effect.as_mut(),
        }
    }

    pub fn as_ghost_clone(&self) -> Option<&GhostCloneEffect> {
        match self {
            EffectInstance::GhostClone(effect) => Some(effect),
            _ => None,
        }
    }
}

impl Effect for EffectInstance {
    fn on_start(&mut self, ctx: &EffectContext<'_>) {
        self.inner().on_start(ctx)
    }

    fn on_update(&mut self, ctx: &EffectContext<'_>, dt: f64) -> Result<(), EffectError> {
        self.inner().on_update(ctx, dt)
    }

    fn on_render(
        &mut self,
        ctx: &EffectContext<'_>,
        surface: &mut Surface,
    ) -> Result<(), EffectError> {
        self.inner().on_render(ctx, surface)
    }

    fn on_end(&mut self, ctx: &EffectContext<'_>) {
        self.inner().on_end(ctx)
    }

    fn on_sign_detected(&mut self, label: &SignToken, ctx: &EffectContext<'_>) {
        self.inner().on_sign_detected(label, ctx)
    }
}

/// Cubic ease used by animated effects, `t` clamped to `[0, 1]`.
pub fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothstep_endpoints() {
        assert_eq!(smoothstep(-1.0), 0.0);
        assert_eq!(smoothstep(0.5), 0.5);
        assert_eq!(smoothstep(1.0), 1.0);
        assert_eq!(smoothstep(3.0), 1.0);
    }
}
