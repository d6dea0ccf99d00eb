pub mod body;
pub mod config;
pub mod duration;
pub mod error;
pub mod method;
pub mod request;
pub mod schedule;

pub use body::*;
pub use config::Settings;
pub use duration::{parse_duration, parse_jitter};
pub use error::*;
pub use method::HttpMethod;
pub use request::*;
pub use schedule::{ScheduleSpec, ScheduleStrategy};
