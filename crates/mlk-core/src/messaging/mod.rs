//! Messaging provider abstraction (user-account client behind a port).

pub mod port;
pub mod throttled;
pub mod types;
