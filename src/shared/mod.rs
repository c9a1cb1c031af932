pub mod hashing;
pub mod ids;
pub mod logging;

use chrono::{SecondsFormat, Utc};

pub use hashing::sha256_hex;
pub use ids::{new_event_uid, ThreadId};
pub use logging::EngineLog;

pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
