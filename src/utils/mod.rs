pub use std::time::Duration;

mod datetime;

pub use datetime::*;

pub const fn seconds(secs: u64) -> Duration {
    Duration::from_secs(secs)
}
