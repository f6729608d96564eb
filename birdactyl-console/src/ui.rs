//! Terminal user interface

mod app;
mod event;
mod input;
mod render;
mod terminal;

pub use app::App;
pub use event::{AppEvent, EventHandler};
pub use input::{map_key, Edit, InputLine, KeyAction};
