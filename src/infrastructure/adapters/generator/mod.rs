//! Generator Adapter - 生成模型实现

mod http_generator_client;
mod synthetic_generator;

pub use http_generator_client::{HttpMusicGenClient, HttpMusicGenClientConfig};
pub use synthetic_generator::{SyntheticGeneratorConfig, SyntheticMusicGenerator};
