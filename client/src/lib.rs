pub mod error;
pub mod map;

pub use error::{TileError, TileResult};
pub use map::{MapConfig, MapSystem};
