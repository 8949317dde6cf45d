//! Device pairing through single-use link tokens.

mod service;
mod sweep;

pub use service::{GeneratedLink, LinkError, LinkService};
pub use sweep::spawn_link_sweep_task;
