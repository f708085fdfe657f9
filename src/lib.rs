//! mp3relay - video-to-MP3 relay over a key-rotating conversion API.
//!
//! This library crate exposes the relay's components for the binary and for
//! integration testing.

pub mod jobs;
pub mod relay;
pub mod server;
pub mod upstream;
pub mod video_id;
