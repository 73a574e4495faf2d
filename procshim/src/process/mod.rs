//! Supervised processes and the on-disk protocol they are reached through.

mod bridge;
mod dir;
mod exit;
pub(crate) mod fifo;
mod handle;
mod id;
mod signal;

pub use bridge::{BoxedReader, BoxedWriter, ProcessIo};
pub(crate) use bridge::{IoBridge, PeerPresence, Relays};
pub use dir::ProcessDir;
pub use handle::Process;
pub use id::ProcessId;
pub(crate) use signal::Signaller;
pub use signal::{PidFileResolver, PidResolver, Signal};
