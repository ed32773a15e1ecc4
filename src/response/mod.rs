pub mod summary;

pub use summary::{render_json, render_text};
