pub mod gin;
pub mod iaga;
pub mod kindex;

pub use gin::*;
pub use iaga::*;
pub use kindex::*;
