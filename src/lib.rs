//! Bounded, append-only command log.
//!
//! A fixed-capacity ring of newline-terminated entries, oldest-evicted on
//! overflow, exposed as a byte-offset/seekable device facade
//! ([`device::CommandDevice`]) and as a TCP service ([`server`]) where every
//! appended line is answered with a full dump of the log.

pub mod accumulator;
pub mod config;
pub mod device;
pub mod error;
pub mod registry;
pub mod ring;
pub mod server;
pub mod session;
pub mod store;
