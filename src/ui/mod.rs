//! User interface rendering.
//!
//! - **window**: content model of one scrolling text window
//! - **renderer**: crossterm renderer drawing the three session windows

pub mod renderer;
pub mod window;

pub use renderer::Renderer;
