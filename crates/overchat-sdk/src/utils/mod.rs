pub mod time;

pub use time::{bucket_of, now_millis};
