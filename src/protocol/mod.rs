pub mod codec;
pub mod error;
pub mod frame;
pub mod planner;
pub mod session;
pub mod transport;

pub use error::{DeviceFault, Error, ErrorKind, Result};
