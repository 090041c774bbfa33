//! Settings type definitions.
//!
//! Field names are camelCase on the wire. Every type has `#[serde(default)]`
//! so partial JSON fills the rest from [`Default`].

mod logging;
mod server;

pub use logging::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000, "timeoutMs": 3600000 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TetherSettings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}
