//! Core IMAP types.

mod capability;
mod response_code;

pub use capability::{Capability, Status};
pub use response_code::ResponseCode;
