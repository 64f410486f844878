//! Network front-end: every peer gets its own session and frame loop, and
//! receives one JSON record per processed frame over length-prefixed framing.

pub mod analysis;
pub mod backend;
pub mod codec;
pub mod connection;
pub mod fps;
pub mod protocol;
pub mod server;
pub mod supervisor;

pub use backend::{Backend, SyntheticBackend};
pub use codec::{FramedReader, FramedWriter, MessageReader, MessageWriter};
pub use connection::{Connection, ServerContext};
pub use protocol::{ControlMessage, FrameRecord, ServerMessage, SettingsPatch};
pub use server::{StreamingHub, StreamingServer};
pub use supervisor::SupervisorHandle;
