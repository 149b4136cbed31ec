pub mod mapper;
pub mod surface;
pub mod window;

pub use window::{CanvasAction, CanvasWindow};

/// Logical resolution of the coloring page on both axes.
pub const CANVAS_SIZE: u32 = 500;

#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("PNG encode failed: {0}")]
    Encode(String),
    #[error("cannot allocate {0}x{1} pixmap")]
    Pixmap(u32, u32),
    #[error("canvas window: {0}")]
    Window(String),
}
