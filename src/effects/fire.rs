use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::EffectError;

use super::{Effect, EffectContext, Surface};

const MAX_PARTICLES: usize = 600;
const SPAWN_PER_SECOND: f64 = 900.0;
const WIND_PER_YAW: f32 = 200.0;

#[derive(Debug, Clone)]
struct Particle {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    age: f32,
    life: f32,
    size: f32,
}

/// Particle fire breathed from the mouth, bent by head yaw.
pub struct FireEffect {
    rng: StdRng,
    particles: Vec<Particle>,
    spawn_debt: f64,
    emitting: bool,
    origin: (f32, f32),
}

impl FireEffect {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            particles: Vec::new(),
            spawn_debt: 0.0,
            emitting: false,
            origin: (0.5, 0.6),
        }
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    fn spawn(&mut self) {
        if self.particles.len() >= MAX_PARTICLES {
            return;
        }
        let angle: f32 = self.rng.random_range(-0.35..0.35);
        let speed: f32 = self.rng.random_range(0.35..0.7);
        self.particles.push(Particle {
            x: self.origin.0,
            y: self.origin.1,
            vx: angle * speed,
            vy: speed * 0.6,
            age: 0.0,
            life: self.rng.random_range(0.4..0.9),
            size: self.rng.random_range(0.015..0.04),
        });
    }
}

impl Default for FireEffect {
    fn default() -> Self {
        Self::new()
    }
}

/// White core through yellow and orange to dark red as `heat` drops.
fn heat_color(heat: f32) -> [u8; 3] {
    let h = heat.clamp(0.0, 1.0);
    if h > 0.75 {
        [255, 255, (200.0 + (h - 0.75) * 220.0).min(255.0) as u8]
    } else if h > 0.4 {
        [255, (120.0 + (h - 0.4) * 385.0) as u8, 40]
    } else {
        [(120.0 + h * 337.0) as u8, (h * 300.0) as u8, 10]
    }
}

impl Effect for FireEffect {
    fn on_start(&mut self, _ctx: &EffectContext<'_>) {
        self.emitting = true;
        self.spawn_debt = 0.0;
    }

    fn on_update(&mut self, ctx: &EffectContext<'_>, dt: f64) -> Result<(), EffectError> {
        if let Some(mouth) = ctx.anchors.mouth {
            self.origin = (mouth[0], mouth[1]);
        }
        let dt32 = dt as f32;
        // Normalized units; wind is scaled down from pixels at a 640px frame.
        let wind = -ctx.anchors.head_yaw * WIND_PER_YAW / 640.0;
        for particle in &mut self.particles {
            particle.vx += wind * dt32;
            particle.x += particle.vx * dt32;
            particle.y += particle.vy * dt32 * 0.2 - 0.25 * dt32;
            particle.age += dt32;
            particle.size *= 1.0 + 0.8 * dt32;
        }
        self.particles.retain(|p| p.age < p.life);

        if self.emitting {
            self.spawn_debt += SPAWN_PER_SECOND * dt;
            while self.spawn_debt >= 1.0 {
                self.spawn();
                self.spawn_debt -= 1.0;
            }
        }
        Ok(())
    }

    fn on_render(
        &mut self,
        _ctx: &EffectContext<'_>,
        surface: &mut Surface,
    ) -> Result<(), EffectError> {
        let scale = surface.width().max(surface.height()) as f32;
        for particle in &self.particles {
            let heat = 1.0 - particle.age / particle.life;
            let (x, y) = surface.to_pixels([particle.x, particle.y]);
            surface.soft_circle(x, y, particle.size * scale, heat_color(heat), 0.8 * heat);
        }
        Ok(())
    }

    fn on_end(&mut self, _ctx: &EffectContext<'_>) {
        self.emitting = false;
        self.particles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::Anchors;

    #[test]
    fn emits_only_between_start_and_end() {
        let mut fire = FireEffect::seeded(7);
        let anchors = Anchors {
            mouth: Some([0.5, 0.5]),
            ..Anchors::default()
        };
        let ctx = EffectContext::new(0.0, &anchors);
        fire.on_update(&ctx, 0.1).unwrap();
        assert_eq!(fire.particle_count(), 0);

        fire.on_start(&ctx);
        fire.on_update(&ctx, 0.05).unwrap();
        assert!(fire.particle_count() > 0);

        let mut surface = Surface::blank(64, 48);
        fire.on_render(&ctx, &mut surface).unwrap();
        assert!(surface.image().pixels().any(|p| p.0 != [0, 0, 0]));

        fire.on_end(&ctx);
        assert_eq!(fire.particle_count(), 0);
    }

    #[test]
    fn heat_map_cools_towards_red() {
        assert_eq!(heat_color(1.0)[1], 255);
        let cool = heat_color(0.1);
        assert!(cool[0] > cool[1]);
    }
}
