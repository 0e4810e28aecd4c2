//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod generator;
pub mod storage;

pub use generator::*;
pub use storage::*;
