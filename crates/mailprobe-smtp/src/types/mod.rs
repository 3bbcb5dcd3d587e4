//! Reply and capability types seen during a verification session.

mod extension;
mod reply;

pub use extension::{AuthMechanism, Extension};
pub use reply::{EnhancedStatus, Reply, ReplyCode};
