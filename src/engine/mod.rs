//! Server-side comment engine. Every function here takes a pool or an open
//! transaction; none of them know about HTTP.

pub mod ledger;
pub mod moderation;
pub mod notify;
pub mod store;
pub mod target;
pub mod thread;

pub use target::{ContentType, TargetHandle, resolve};
