//! Script Hosts
//!
//! Transports that stand in for a browser's script loading:
//! - `ScriptHost` - queued fetches completed in caller-chosen order
//! - `LocalTaskHost` - fetches completed by tokio local tasks (`async` feature)
//! - `GraphManifest` - TOML description of a script set for `ScriptHost`

#[cfg(feature = "async")]
mod local_task;
mod manifest;
mod script_host;

#[cfg(feature = "async")]
pub use local_task::LocalTaskHost;
pub use manifest::{EntryOutcome, FailMode, GraphManifest, ManifestError, ModuleSpec};
pub use script_host::{CompletionOrder, Script, ScriptHost, NOT_FOUND};
