use std::time::Duration;

use log::debug;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::Profile;
use crate::plugins::{Invocation, ScriptEngine, ScriptError};

/// Function the profile script must define
pub const SCRIPT_HANDLER: &str = "onGenerate";

/// Runs the profile script's `onGenerate(config)` and returns its result.
///
/// Blank script text leaves the document untouched. Anything other than an
/// object coming back is a "Wrong result".
pub async fn run_script<E: ScriptEngine>(
    engine: &E,
    profile: &Profile,
    config: Value,
    deadline: Duration,
) -> Result<Value> {
    if profile.script.code.trim().is_empty() {
        return Ok(config);
    }
    debug!("Running script of profile [{}]", profile.name);
    let invocation = Invocation {
        owner: &profile.id,
        name: &profile.name,
        code: &profile.script.code,
        handler: SCRIPT_HANDLER,
        plugin: None,
        args: vec![config],
    };
    let result = tokio::time::timeout(deadline, engine.invoke(invocation))
        .await
        .map_err(|_| ScriptError::Timeout(deadline))??;
    if !result.is_object() {
        return Err(Error::WrongResult);
    }
    Ok(result)
}
