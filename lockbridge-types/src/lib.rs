//! Domain types shared by the lockbridge crates

pub mod device_info;
pub mod error;
pub mod net_status;
pub mod time;

pub use device_info::DeviceInfo;
pub use error::{Error, Result};
pub use net_status::NetStatus;
pub use time::{NetworkTime, TimeZoneCode};
