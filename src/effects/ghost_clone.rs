use image::{imageops, imageops::FilterType, Luma, RgbImage};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::{
    common::{sign::normalize_label, SignToken},
    config::GhostCloneConfig,
    error::{EffectError, SegmentationError},
};

use super::{
    segmentation::{AlphaMask, Segmenter},
    smoothstep, Effect, EffectContext, Surface,
};

/// Foreground cut-out taken from the latest frame.
struct CloneCrop {
    color: RgbImage,
    alpha: AlphaMask,
    x: u32,
    y: u32,
    frame_width: u32,
}

/// Spawns two copies of the segmented player that slide out sideways.
pub struct GhostCloneEffect {
    config: GhostCloneConfig,
    segmenter: Option<Box<dyn Segmenter>>,
    aliases: HashSet<String>,
    mask: Option<AlphaMask>,
    frames_seen: u64,
    last_burst: Option<f64>,
    burst_start: Option<f64>,
    progress: f64,
    animating: bool,
    visible: bool,
    crop: Option<CloneCrop>,
}

impl GhostCloneEffect {
    /// An unavailable segmenter leaves the effect permanently disabled.
    pub fn new(
        config: GhostCloneConfig,
        segmenter: Result<Box<dyn Segmenter>, SegmentationError>,
    ) -> Self {
        let segmenter = match segmenter {
            Ok(segmenter) => Some(segmenter),
            Err(e) => {
                warn!("Ghost clone effect disabled: {}", e);
                None
            }
        };
        let aliases = config.aliases.iter().map(|a| normalize_label(a)).collect();
        Self {
            config,
            segmenter,
            aliases,
            mask: None,
            frames_seen: 0,
            last_burst: None,
            burst_start: None,
            progress: 0.0,
            animating: false,
            visible: false,
            crop: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.segmenter.is_some()
    }

    pub fn burst_start(&self) -> Option<f64> {
        self.burst_start
    }

    /// Eased animation progress `p` in `[0, 1]`.
    pub fn burst_progress(&self) -> f64 {
        self.progress
    }

    pub fn is_animating(&self) -> bool {
        self.animating
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    fn matches_alias(&self, label: &SignToken) -> bool {
        let label = label.normalized();
        self.aliases.contains(&label)
            || (label.contains("shadow") && label.contains("clone"))
            || (label.contains("kage") && label.contains("bunshin"))
    }

    /// Starts a new burst unless one started within the cooldown.
    fn trigger_burst(&mut self, now: f64) -> bool {
        if !self.is_enabled() {
            return false;
        }
        if let Some(last) = self.last_burst {
            if now - last <= self.config.burst_cooldown_secs {
                return false;
            }
        }
        debug!("Ghost clone burst at {:.2}s", now);
        self.last_burst = Some(now);
        self.burst_start = Some(now);
        self.progress = 0.0;
        self.animating = true;
        self.visible = true;
        true
    }

    fn refresh_mask(&mut self, frame: &RgbImage) {
        let stale = match &self.mask {
            Some(mask) => mask.dimensions() != frame.dimensions(),
            None => true,
        };
        let every = u64::from(self.config.mask_every_n_frames.max(1));
        let due = stale || self.frames_seen % every == 0;
        self.frames_seen += 1;
        if !due {
            return;
        }
        let Some(segmenter) = self.segmenter.as_mut() else {
            return;
        };

        let (width, height) = frame.dimensions();
        let working_width = self.config.segment_width.max(1);
        let result = if width > working_width {
            let working_height = ((height as f64 * working_width as f64 / width as f64).round()
                as u32)
                .max(1);
            let small = imageops::resize(frame, working_width, working_height, FilterType::Triangle);
            segmenter.segment(&small)
        } else {
            segmenter.segment(frame)
        };

        match result {
            Ok(mut mask) => {
                if mask.dimensions() != frame.dimensions() {
                    mask = imageops::resize(&mask, width, height, FilterType::Triangle);
                }
                if self.config.edge_blur_sigma > 0.0 {
                    mask = imageops::blur(&mask, self.config.edge_blur_sigma);
                }
                self.mask = Some(mask);
            }
            Err(e) => warn!("Segmentation failed, reusing cached mask: {}", e),
        }
    }

    /// A cached mask from a different resolution is discarded and the frame
    /// is skipped.
    fn refresh_crop(&mut self, frame: &RgbImage) -> Result<(), EffectError> {
        let Some(mask) = &self.mask else {
            return Ok(());
        };
        if mask.dimensions() != frame.dimensions() {
            let (mw, mh) = mask.dimensions();
            self.mask = None;
            self.crop = None;
            return Err(EffectError::Failed(
                "ghost clone".to_string(),
                format!(
                    "cached {}x{} mask does not fit {}x{} frame",
                    mw,
                    mh,
                    frame.width(),
                    frame.height()
                ),
            ));
        }
        let threshold = self.config.alpha_threshold;
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, Luma([a])) in mask.enumerate_pixels() {
            if *a > threshold {
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }
        let Some((x0, y0, x1, y1)) = bounds else {
            self.crop = None;
            return Ok(());
        };

        let pad = self.config.bbox_pad;
        let x0 = x0.saturating_sub(pad);
        let y0 = y0.saturating_sub(pad);
        let x1 = (x1 + pad).min(frame.width() - 1);
        let y1 = (y1 + pad).min(frame.height() - 1);
        let (w, h) = (x1 - x0 + 1, y1 - y0 + 1);

        let color = imageops::crop_imm(frame, x0, y0, w, h).to_image();
        let alpha = AlphaMask::from_fn(w, h, |x, y| {
            let a = mask.get_pixel(x0 + x, y0 + y).0[0];
            Luma([if a > threshold { a } else { 0.0 }])
        });
        self.crop = Some(CloneCrop {
            color,
            alpha,
            x: x0,
            y: y0,
            frame_width: frame.width(),
        });
        Ok(())
    }
}

impl Effect for GhostCloneEffect {
    fn on_start(&mut self, ctx: &EffectContext<'_>) {
        self.trigger_burst(ctx.now);
    }

    fn on_update(&mut self, ctx: &EffectContext<'_>, _dt: f64) -> Result<(), EffectError> {
        if !self.is_enabled() || !self.visible {
            return Ok(());
        }
        if let Some(start) = self.burst_start {
            let duration = self.config.anim_duration_secs;
            let t = if duration > 0.0 {
                ((ctx.now - start) / duration).clamp(0.0, 1.0)
            } else {
                1.0
            };
            self.progress = smoothstep(t);
            if t >= 1.0 {
                self.animating = false;
            }
        }
        if let Some(frame) = ctx.frame {
            if frame.width() == 0 || frame.height() == 0 {
                return Err(EffectError::Failed(
                    "ghost clone".to_string(),
                    "empty frame".to_string(),
                ));
            }
            self.refresh_mask(frame);
            self.refresh_crop(frame)?;
        }
        Ok(())
    }

    fn on_render(
        &mut self,
        _ctx: &EffectContext<'_>,
        surface: &mut Surface,
    ) -> Result<(), EffectError> {
        if !self.visible {
            return Ok(());
        }
        let Some(crop) = &self.crop else {
            return Ok(());
        };
        let p = self.progress as f32;
        let dx = (p * self.config.offset_ratio * crop.frame_width as f32).round() as i64;
        let opacity = if self.config.fade_in {
            self.config.max_opacity * p
        } else {
            self.config.max_opacity
        };
        let (x, y) = (crop.x as i64, crop.y as i64);
        surface.composite(&crop.color, &crop.alpha, x - dx, y, opacity);
        surface.composite(&crop.color, &crop.alpha, x + dx, y, opacity);
        Ok(())
    }

    fn on_end(&mut self, _ctx: &EffectContext<'_>) {
        self.visible = false;
        self.animating = false;
        self.burst_start = None;
        self.progress = 0.0;
        self.crop = None;
        self.mask = None;
        self.frames_seen = 0;
    }

    fn on_sign_detected(&mut self, label: &SignToken, ctx: &EffectContext<'_>) {
        if self.matches_alias(label) {
            self.trigger_burst(ctx.now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{Anchors, ChromaKeySegmenter};
    use image::Rgb;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    const BACKDROP: [u8; 3] = [0, 255, 0];

    struct CountingSegmenter {
        inner: ChromaKeySegmenter,
        calls: Arc<AtomicUsize>,
    }

    impl Segmenter for CountingSegmenter {
        fn segment(&mut self, frame: &RgbImage) -> Result<AlphaMask, SegmentationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.segment(frame)
        }
    }

    /// Succeeds for the first `ok` calls, then reports failures.
    struct FailingAfter {
        inner: ChromaKeySegmenter,
        ok: usize,
    }

    impl Segmenter for FailingAfter {
        fn segment(&mut self, frame: &RgbImage) -> Result<AlphaMask, SegmentationError> {
            if self.ok == 0 {
                return Err(SegmentationError::Failed("model stalled".to_string()));
            }
            self.ok -= 1;
            self.inner.segment(frame)
        }
    }

    fn test_config() -> GhostCloneConfig {
        GhostCloneConfig {
            edge_blur_sigma: 0.0,
            bbox_pad: 0,
            ..GhostCloneConfig::default()
        }
    }

    fn effect() -> (GhostCloneEffect, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let segmenter = CountingSegmenter {
            inner: ChromaKeySegmenter::new(BACKDROP),
            calls: calls.clone(),
        };
        (GhostCloneEffect::new(test_config(), Ok(Box::new(segmenter))), calls)
    }

    fn player_frame() -> RgbImage {
        let mut frame = RgbImage::from_pixel(40, 20, Rgb(BACKDROP));
        for y in 5..15 {
            for x in 18..22 {
                frame.put_pixel(x, y, Rgb([200, 60, 60]));
            }
        }
        frame
    }

    #[test]
    fn burst_reaches_full_progress_and_stays_visible() {
        let (mut effect, _) = effect();
        let anchors = Anchors::default();
        effect.on_start(&EffectContext::new(0.0, &anchors));

        effect.on_update(&EffectContext::new(0.175, &anchors), 0.175).unwrap();
        assert!(effect.is_animating());
        assert!(effect.burst_progress() > 0.0 && effect.burst_progress() < 1.0);

        effect.on_update(&EffectContext::new(0.35, &anchors), 0.175).unwrap();
        assert_eq!(effect.burst_progress(), 1.0);
        assert!(!effect.is_animating());

        effect.on_update(&EffectContext::new(4.0, &anchors), 3.65).unwrap();
        assert_eq!(effect.burst_progress(), 1.0);
        assert!(effect.is_visible());
    }

    #[test]
    fn retrigger_within_cooldown_keeps_burst_start() {
        let (mut effect, _) = effect();
        let anchors = Anchors::default();
        let clone = SignToken::new("clone");
        effect.on_sign_detected(&clone, &EffectContext::new(0.0, &anchors));
        effect.on_sign_detected(&clone, &EffectContext::new(0.2, &anchors));
        effect.on_sign_detected(&clone, &EffectContext::new(0.35, &anchors));
        assert_eq!(effect.burst_start(), Some(0.0));

        effect.on_sign_detected(&clone, &EffectContext::new(0.5, &anchors));
        assert_eq!(effect.burst_start(), Some(0.5));
    }

    #[test]
    fn alias_matching_folds_separators() {
        let (mut effect, _) = effect();
        let anchors = Anchors::default();
        effect.on_sign_detected(&SignToken::new("tiger"), &EffectContext::new(0.0, &anchors));
        assert_eq!(effect.burst_start(), None);
        effect.on_sign_detected(
            &SignToken::new("Kage_Bunshin-no-Jutsu"),
            &EffectContext::new(1.0, &anchors),
        );
        assert_eq!(effect.burst_start(), Some(1.0));
    }

    #[test]
    fn mask_is_recomputed_every_other_frame() {
        let (mut effect, calls) = effect();
        let anchors = Anchors::default();
        let frame = player_frame();
        effect.on_start(&EffectContext::new(0.0, &anchors));
        for i in 0..6 {
            let ctx = EffectContext::new(i as f64 * 0.016, &anchors).with_frame(&frame);
            effect.on_update(&ctx, 0.016).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn render_places_copies_on_both_sides() {
        let (mut effect, _) = effect();
        let anchors = Anchors::default();
        let frame = player_frame();
        effect.on_start(&EffectContext::new(0.0, &anchors));
        let ctx = EffectContext::new(1.0, &anchors).with_frame(&frame);
        effect.on_update(&ctx, 1.0).unwrap();

        let mut surface = Surface::new(frame.clone());
        effect.on_render(&ctx, &mut surface).unwrap();
        // dx = round(1.0 * 0.28 * 40) = 11
        assert_ne!(surface.image().get_pixel(18 + 11, 10), &Rgb(BACKDROP));
        assert_ne!(surface.image().get_pixel(21 - 11, 10), &Rgb(BACKDROP));
        assert_eq!(surface.image().get_pixel(0, 10), &Rgb(BACKDROP));
    }

    #[test]
    fn resolution_change_with_failed_segmentation_skips_the_frame() {
        let segmenter = FailingAfter {
            inner: ChromaKeySegmenter::new(BACKDROP),
            ok: 1,
        };
        let mut effect = GhostCloneEffect::new(test_config(), Ok(Box::new(segmenter)));
        let anchors = Anchors::default();
        effect.on_start(&EffectContext::new(0.0, &anchors));

        let mut wide = RgbImage::from_pixel(40, 20, Rgb(BACKDROP));
        for y in 5..15 {
            for x in 30..35 {
                wide.put_pixel(x, y, Rgb([200, 60, 60]));
            }
        }
        effect
            .on_update(&EffectContext::new(0.1, &anchors).with_frame(&wide), 0.1)
            .unwrap();
        assert!(effect.crop.is_some());

        let small = RgbImage::from_pixel(20, 10, Rgb(BACKDROP));
        let result = effect.on_update(&EffectContext::new(0.2, &anchors).with_frame(&small), 0.1);
        assert!(matches!(result, Err(EffectError::Failed(..))));
        assert!(effect.mask.is_none());
        assert!(effect.crop.is_none());

        effect
            .on_update(&EffectContext::new(0.3, &anchors).with_frame(&small), 0.1)
            .unwrap();
        assert!(effect.is_visible());
    }

    #[test]
    fn unavailable_segmenter_disables_effect() {
        let mut effect = GhostCloneEffect::new(
            test_config(),
            Err(SegmentationError::Unavailable("no model".to_string())),
        );
        let anchors = Anchors::default();
        effect.on_start(&EffectContext::new(0.0, &anchors));
        assert!(!effect.is_enabled());
        assert_eq!(effect.burst_start(), None);
        assert!(!effect.is_visible());
    }

    #[test]
    fn end_clears_cached_state() {
        let (mut effect, _) = effect();
        let anchors = Anchors::default();
        let frame = player_frame();
        effect.on_start(&EffectContext::new(0.0, &anchors));
        effect
            .on_update(&EffectContext::new(0.5, &anchors).with_frame(&frame), 0.5)
            .unwrap();
        assert!(effect.crop.is_some());
        effect.on_end(&EffectContext::new(0.6, &anchors));
        assert!(effect.crop.is_none());
        assert!(effect.mask.is_none());
        assert!(!effect.is_visible());
    }
}
