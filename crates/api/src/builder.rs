//! Builder-related types.

use crate::*;
use std::sync::Arc;

/// The general resync builder.
/// This contains both configuration and factory instances,
/// allowing construction of runtime module instances.
#[derive(Debug)]
pub struct Builder {
    /// The module configuration to be used when building modules.
    /// This can be loaded from disk or modified before freezing the builder.
    pub config: crate::config::Config,

    /// The [resync::ResyncFactory] to be used for creating
    /// [resync::Resync] instances.
    pub resync: resync::DynResyncFactory,

    /// The [stats::StatsFactory] to be used for creating
    /// [stats::ResyncStats] instances.
    pub stats: stats::DynStatsFactory,
}

impl Builder {
    /// Construct a default config given the configured module factories.
    /// Note, this should be called before freezing the Builder instance
    /// in an Arc<>.
    pub fn set_default_config(&mut self) -> ResyncResult<()> {
        let Self {
            config,
            resync,
            stats,
        } = self;

        resync.default_config(config)?;
        stats.default_config(config)?;

        Ok(())
    }

    /// Chaining form of [Builder::set_default_config].
    pub fn with_default_config(mut self) -> ResyncResult<Self> {
        self.set_default_config()?;
        Ok(self)
    }

    /// Ask every module factory to validate the current config.
    pub fn validate_config(&self) -> ResyncResult<()> {
        self.resync.validate_config(&self.config)?;
        self.stats.validate_config(&self.config)?;

        Ok(())
    }

    /// Validate the config and freeze this builder.
    pub fn build(self) -> ResyncResult<Arc<Self>> {
        self.validate_config()?;
        Ok(Arc::new(self))
    }
}
