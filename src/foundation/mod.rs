pub mod color;
pub mod error;
pub mod geometry;
