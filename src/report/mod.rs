//! Report building and rendering.

pub mod generator;

pub use generator::{build_report, generate_json_report, render_text_report};
