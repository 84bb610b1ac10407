#![deny(missing_docs)]
//! The bucket resync control loop: core modules and in-process
//! collaborators for testing.

use resync_api::{builder::Builder, config::Config};

/// Construct a production-ready default builder.
///
/// - `resync` - The default resync module is [factories::CoreResyncFactory].
/// - `stats` - The default statistics module is [factories::CoreStatsFactory].
pub fn default_builder() -> Builder {
    Builder {
        config: Config::default(),
        resync: factories::CoreResyncFactory::create(),
        stats: factories::CoreStatsFactory::create(),
    }
}

mod common;

pub mod factories;
