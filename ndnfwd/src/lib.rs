//! NDN forwarding data plane: PIT/CS combined table, name dispatch,
//! FIB and the per-worker forwarding pipeline.

pub mod alloc;
pub mod config;
pub mod face;
pub mod fib;
pub mod forwarder;
pub mod fwd;
pub mod input;
pub mod ndt;
pub mod pcct;
pub mod stats;
pub mod suppress;

pub use config::{Config, ConfigError};
pub use face::{Face, FaceId, FaceTable, MemoryFace};
pub use fib::{Fib, FibEntry, FibTable, Strategy};
pub use forwarder::{Forwarder, ForwarderError, ForwarderHandle};
pub use fwd::{Fwd, FwdPacket};
pub use input::Input;
pub use ndt::Ndt;
pub use pcct::{Handle, InsertResult, PccKey, Pcct, PcctError};
pub use stats::ForwarderSnapshot;
