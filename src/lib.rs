//! Siemens S7 over ISO-on-TCP: frame codecs, connection handshake, batched
//! reads and writes, and the acquisition cycle that feeds a value sink.

mod codec;
mod driver;
pub mod protocol;
mod sink;
pub mod supervisor;
mod types;

pub use codec::{S7Codec, S7Value};
pub use driver::{CyclePolicy, CycleStats, PollGroup, S7Driver};
pub use protocol::{DeviceFault, Error, ErrorKind, Result};
pub use sink::{CollectingSink, PointValue, ValueSink};
pub use types::{ConnectMode, RetryPolicy, S7ChannelConfig, TagDescriptor, TsapConfig};
