pub use logger::*;
pub use plot::*;
pub use timer::*;

pub mod logger;
pub mod macros;
pub mod plot;
pub mod timer;
