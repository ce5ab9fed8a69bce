pub mod language;
pub mod member;
pub mod task;
pub mod team;
pub mod video;
