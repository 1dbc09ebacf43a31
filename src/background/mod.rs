pub mod sweeper;
pub mod video;
