//! Discord soundboard: plays pre-encoded voice clips on chat triggers,
//! one clip at a time per server.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod voice;
