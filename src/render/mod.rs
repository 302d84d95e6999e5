pub mod backend;
pub mod renderer;
pub mod schedule;
pub mod software;
