pub mod browser;
pub mod clock;
pub mod config;
pub mod duration;
pub mod enroll;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod portal;
pub mod scrape;
pub mod sheets;
