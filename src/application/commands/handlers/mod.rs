//! Command Handlers 实现

mod stream_audio_handler;

pub use stream_audio_handler::*;
