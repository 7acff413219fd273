pub mod render;

pub use render::{FrameStats, SkiaRenderer, load_font, render_text_pixmap};
