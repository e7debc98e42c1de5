pub mod client;
pub mod models;

pub use client::{is_image_content_type, ApiError, HttpClient, Result};
pub use models::{ClientConfig, ImageBody, PageBody};
