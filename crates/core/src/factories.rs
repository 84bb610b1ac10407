//! Factories for generating instances of resync modules, and the
//! collaborators a resync module needs to run in one process.

pub mod core_resync;
pub use core_resync::CoreResyncFactory;

pub mod core_stats;
pub use core_stats::{CoreStats, CoreStatsFactory};

mod core_alarm;
pub use core_alarm::*;

mod mem_store;
pub use mem_store::*;

mod mem_view;
pub use mem_view::*;

mod file_view;
pub use file_view::*;

mod mem_transport;
pub use mem_transport::*;
