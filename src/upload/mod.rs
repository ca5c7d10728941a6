//! Upload Fanout: the nine-host dependency-aware upload stage plus
//! concrete reqwest-backed sinks.

mod fanout;
mod host;
mod sinks;

pub use fanout::{run_fanout, HostOutcome, HostSet};
pub use host::{HostKind, RemoteIngestHost, UploadHost};
pub use sinks::{GenericFormUploadHost, GenericFormRemoteHost, FilePressHost};
