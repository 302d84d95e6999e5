pub mod blend;
pub mod coords;
pub mod event;
pub mod mode;
pub mod node;
