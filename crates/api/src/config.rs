//! Types for use when configuring resync modules.

use crate::*;

/// helper transcode function
fn tc<S: serde::Serialize, D: serde::de::DeserializeOwned>(
    s: &S,
) -> ResyncResult<D> {
    serde_json::from_str(
        &serde_json::to_string(s)
            .map_err(|e| ResyncError::other_src("encode", e))?,
    )
    .map_err(|e| ResyncError::other_src("decode", e))
}

/// Denotes a type used to configure a specific resync module.
///
/// The types implementing this trait hold configuration that cannot be
/// changed at runtime, the likes of which might be found in a configuration
/// file. Deserialization should be tolerant to missing properties and fall
/// back to sane defaults, since the file is edited by humans.
pub trait ModConfig:
    'static
    + Sized
    + Default
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
{
}

/// Resync configuration: a map of module name to module configuration.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct Config(serde_json::Map<String, serde_json::Value>);

impl Config {
    /// Module factories call this from their `default_config` to add their
    /// default parameters under `module_name`.
    pub fn add_default_module_config<M: ModConfig>(
        &mut self,
        module_name: &str,
    ) -> ResyncResult<()> {
        if self.0.contains_key(module_name) {
            return Err(ResyncError::other(format!(
                "Refusing to overwrite conflicting module name: {module_name}"
            )));
        }
        self.0.insert(module_name.to_string(), tc(&M::default())?);
        Ok(())
    }

    /// Replace the configuration of `module_name` outright.
    pub fn set_module_config<M: ModConfig>(
        &mut self,
        module_name: &str,
        config: &M,
    ) -> ResyncResult<()> {
        self.0.insert(module_name.to_string(), tc(config)?);
        Ok(())
    }

    /// Extract the configuration of `module_name`. An unset module gets
    /// its default configuration.
    pub fn get_module_config<M: ModConfig>(
        &self,
        module_name: &str,
    ) -> ResyncResult<M> {
        self.0
            .get(module_name)
            .map(tc)
            .unwrap_or_else(|| Ok(M::default()))
    }
}
