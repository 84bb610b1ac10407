#![deny(missing_docs)]
//! Resync API contains the module traits of the bucket resync control loop
//! and the basic types required to define the api of those traits.
//!
//! The production implementations live in the resync_core crate.

/// Boxed future type.
pub type BoxFut<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub mod builder;
pub mod config;

mod error;
pub use error::*;

mod bucket;
pub use bucket::*;

mod peer;
pub use peer::*;

pub mod view;
pub use view::*;

pub mod local_store;
pub use local_store::*;

pub mod alarm;
pub use alarm::*;

pub mod stats;
pub use stats::*;

pub mod transport;
pub use transport::*;

pub mod resync;
pub use resync::*;
