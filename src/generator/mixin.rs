use log::debug;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{Mixin, MixinPriority};
use crate::utils::deep_assign;

/// Overlays the profile mixin on the generated document.
///
/// With [`MixinPriority::Mixin`] the override wins every conflict. With
/// [`MixinPriority::Gui`] the generated document is merged over a copy of
/// the override instead, so generated scalars and arrays win while override
/// keys missing from the generated side survive.
pub fn apply_mixin(config: Value, mixin: &Mixin) -> Result<Value> {
    if mixin.config.trim().is_empty() {
        return Ok(config);
    }
    // YAML is a superset of JSON, one parser covers both
    let overlay: Value =
        serde_yaml::from_str(&mixin.config).map_err(|e| Error::yaml("mixin", e))?;
    debug!("Applying mixin with {:?} priority", mixin.priority);

    match mixin.priority {
        MixinPriority::Mixin => {
            let mut config = config;
            deep_assign(&mut config, &overlay);
            Ok(config)
        }
        MixinPriority::Gui => {
            let mut base = overlay;
            deep_assign(&mut base, &config);
            Ok(base)
        }
    }
}
