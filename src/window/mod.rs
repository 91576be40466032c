//! The window, and things to handle the rendering loop and events.

mod main_loop;

pub use main_loop::MainLoop;
