pub mod config;
pub mod data;
pub mod error;
pub mod geomag;
pub mod math;
pub mod pipeline;
pub mod utils;

pub use config::*;
pub use data::*;
pub use error::*;
pub use geomag::*;
pub use math::*;
pub use pipeline::*;
pub use utils::*;
