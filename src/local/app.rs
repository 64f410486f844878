use egui::{Key, TextureHandle, TextureOptions};
use tracing::info;

use crate::{
    challenge::ChallengeState,
    common::SignToken,
    detection::SignInjector,
    error::AppError,
    session::SessionEvent,
};

use super::game_loop::{LocalControls, LocalLoop, TickReport};

/// Keyboard shortcuts for injecting signs, in vocabulary order. `L` is left
/// out because it refreshes the leaderboard.
const SIGN_KEYS: [(Key, &str); 20] = [
    (Key::Num1, "1"),
    (Key::Num2, "2"),
    (Key::Num3, "3"),
    (Key::Num4, "4"),
    (Key::Num5, "5"),
    (Key::Num6, "6"),
    (Key::Num7, "7"),
    (Key::Num8, "8"),
    (Key::Num9, "9"),
    (Key::Num0, "0"),
    (Key::Q, "Q"),
    (Key::W, "W"),
    (Key::E, "E"),
    (Key::R, "R"),
    (Key::T, "T"),
    (Key::Y, "Y"),
    (Key::U, "U"),
    (Key::I, "I"),
    (Key::O, "O"),
    (Key::P, "P"),
];

fn key_label(index: usize) -> Option<&'static str> {
    SIGN_KEYS.get(index).map(|(_, label)| *label)
}

/// Window around [`LocalLoop`]: one tick per repaint.
pub struct LocalApp {
    game: LocalLoop,
    injector: Option<SignInjector>,
    vocabulary: Vec<SignToken>,
    texture: Option<TextureHandle>,
    last_report: TickReport,
    event_log: Vec<String>,
}

impl LocalApp {
    pub fn new(game: LocalLoop, injector: Option<SignInjector>, vocabulary: Vec<SignToken>) -> Self {
        Self {
            game,
            injector,
            vocabulary,
            texture: None,
            last_report: TickReport::default(),
            event_log: Vec::new(),
        }
    }

    pub fn run(self) -> Result<(), AppError> {
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size(egui::vec2(960.0, 720.0))
                .with_title("Jutsu Engine"),
            ..Default::default()
        };
        eframe::run_native(
            "Jutsu Engine",
            options,
            Box::new(move |_cc| Ok(Box::new(self))),
        )
        .map_err(|e| AppError::Ui(e.to_string()))
    }

    fn read_controls(&self, ctx: &egui::Context) -> (LocalControls, Option<SignToken>, bool) {
        ctx.input(|input| {
            let mut controls = LocalControls {
                start_or_restart: input.key_pressed(Key::Space),
                refresh_leaderboard: input.key_pressed(Key::L),
                leave_challenge: input.key_pressed(Key::Backspace),
                ..LocalControls::default()
            };
            if input.key_pressed(Key::ArrowLeft) {
                controls.switch_jutsu -= 1;
            }
            if input.key_pressed(Key::ArrowRight) {
                controls.switch_jutsu += 1;
            }
            let sign = SIGN_KEYS
                .iter()
                .position(|(key, _)| input.key_pressed(*key))
                .and_then(|i| self.vocabulary.get(i).cloned());
            (controls, sign, input.key_pressed(Key::Escape))
        })
    }

    fn draw_status(&self, ui: &mut egui::Ui) {
        let session = self.game.session();
        let progress = session.progress();
        let definition = session.definition();
        ui.heading(session.jutsu());
        if !definition.display_text.is_empty() && progress.active {
            ui.label(&definition.display_text);
        }
        ui.horizontal(|ui| {
            for (i, sign) in definition.sequence.iter().enumerate() {
                let text = sign.to_string();
                if progress.active || i < progress.current_step {
                    ui.strong(text);
                } else if i == progress.current_step {
                    ui.label(format!("[{}]", text));
                } else {
                    ui.weak(text);
                }
            }
        });
        if !session.detection_enabled() && session.player_level() < definition.min_level {
            ui.label(format!("Locked until level {}", definition.min_level));
        }

        let now = self.last_report.now;
        let challenge = session.challenge();
        match challenge.state() {
            ChallengeState::Waiting => {
                ui.label("Press Space to start a timed run");
            }
            ChallengeState::Countdown => {
                if let Some(left) = challenge.countdown_remaining(now) {
                    ui.heading(format!("{}", left));
                }
            }
            ChallengeState::Active => {
                if let Some(elapsed) = challenge.elapsed(now) {
                    ui.heading(format!("{:.2}s", elapsed));
                }
            }
            ChallengeState::Results => {
                if let Some(final_time) = challenge.final_time() {
                    ui.heading(format!("Finished in {:.2}s", final_time));
                }
                ui.label(challenge.rank().to_string());
                ui.label("Press Space to go again");
            }
        }
        if let Some(c) = &self.last_report.classification {
            ui.label(format!("Seeing {} ({:.0}%)", c.label, c.confidence * 100.0));
        }
    }

    /// Returns the sign whose palette button was clicked, if any.
    fn draw_sidebar(&self, ui: &mut egui::Ui) -> Option<SignToken> {
        ui.heading("Leaderboard");
        if self.game.leaderboard().is_empty() {
            ui.label("Press L to refresh");
        }
        for (i, entry) in self.game.leaderboard().iter().take(10).enumerate() {
            ui.label(format!("{}. {} {:.2}s", i + 1, entry.player, entry.time));
        }
        ui.separator();
        if let Some(profile) = self.game.profile() {
            ui.label(format!(
                "{} lv {} ({} xp)",
                profile.name, profile.level, profile.xp
            ));
        }
        ui.separator();
        ui.heading("Signs");
        let mut clicked = None;
        ui.horizontal_wrapped(|ui| {
            for (i, sign) in self.vocabulary.iter().enumerate() {
                let text = match key_label(i) {
                    Some(key) => format!("{}: {}", key, sign),
                    None => sign.to_string(),
                };
                if ui.button(text).clicked() {
                    clicked = Some(sign.clone());
                }
            }
        });
        ui.separator();
        egui::ScrollArea::vertical().show(ui, |ui| {
            for line in self.event_log.iter().rev().take(20) {
                ui.label(line);
            }
        });
        clicked
    }
}

impl eframe::App for LocalApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let (controls, sign, quit) = self.read_controls(ctx);
        if quit {
            self.game.stop();
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }
        if let (Some(sign), Some(injector)) = (sign, &self.injector) {
            injector.inject(sign);
        }

        self.last_report = self.game.tick(controls);
        for event in &self.last_report.events {
            if let SessionEvent::JutsuCompleted { jutsu, .. } = event {
                info!("{} performed", jutsu);
            }
            self.event_log.push(format!("{:?}", event));
        }
        if self.event_log.len() > 200 {
            self.event_log.drain(..100);
        }

        if let Some(image) = self.game.last_render() {
            let color_image = egui::ColorImage::from_rgb(
                [image.width() as usize, image.height() as usize],
                image.as_raw().as_slice(),
            );
            match &mut self.texture {
                Some(texture) => texture.set(color_image, TextureOptions::default()),
                None => {
                    self.texture =
                        Some(ctx.load_texture("camera", color_image, TextureOptions::default()))
                }
            }
        }

        let clicked = egui::SidePanel::right("sidebar")
            .resizable(true)
            .show(ctx, |ui| self.draw_sidebar(ui))
            .inner;
        if let (Some(sign), Some(injector)) = (clicked, &self.injector) {
            injector.inject(sign);
        }
        egui::TopBottomPanel::top("status").show(ctx, |ui| self.draw_status(ui));
        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(texture) = &self.texture {
                ui.image(texture);
            } else {
                ui.label("Waiting for camera...");
            }
        });

        ctx.request_repaint();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::JutsuCatalog;
    use std::collections::HashSet;

    #[test]
    fn every_official_sign_has_a_shortcut() {
        let vocabulary = JutsuCatalog::official().sign_vocabulary();
        assert_eq!(vocabulary.len(), 11);
        for i in 0..vocabulary.len() {
            assert!(key_label(i).is_some(), "no key for {}", vocabulary[i]);
        }
        assert_eq!(key_label(9), Some("0"));
        assert_eq!(key_label(10), Some("Q"));
    }

    #[test]
    fn sign_keys_are_distinct_and_skip_controls() {
        let keys: HashSet<Key> = SIGN_KEYS.iter().map(|(key, _)| *key).collect();
        assert_eq!(keys.len(), SIGN_KEYS.len());
        for control in [Key::L, Key::Space, Key::Backspace, Key::Escape] {
            assert!(!keys.contains(&control));
        }
    }
}
