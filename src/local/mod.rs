pub mod app;
pub mod game_loop;

pub use app::LocalApp;
pub use game_loop::{run_headless, LocalControls, LocalLoop, TickReport};
