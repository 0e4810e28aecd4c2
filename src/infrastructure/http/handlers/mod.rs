//! HTTP Handlers

mod generate;
mod ping;
mod status;
mod websocket;

pub use generate::*;
pub use ping::*;
pub use status::*;
pub use websocket::*;
