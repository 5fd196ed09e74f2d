pub use bode::*;
pub use filter_bank::*;
pub use interpolate::*;
pub use statistics::*;
pub use sysid::*;
pub use transfer_function::*;
pub use wavelet::*;

pub mod bode;
pub mod filter_bank;
pub mod interpolate;
pub mod statistics;
pub mod sysid;
pub mod transfer_function;
pub mod wavelet;
