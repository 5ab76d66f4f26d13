use thiserror::Error;

use crate::generator::resolve::UnresolvedReference;
use crate::plugins::engine::ScriptError;
use crate::vfs::VfsError;

/// Every failure that aborts a compilation or one of the plugin triggers.
///
/// There is no partial success: the caller must not start the kernel with
/// anything produced by a run that returned one of these.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to parse {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse {context}: {source}")]
    Yaml {
        context: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid number `{value}` in {context}")]
    InvalidNumber { context: String, value: String },

    #[error("Invalid {field} filter of [{owner}]: {source}")]
    Filter {
        owner: String,
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Unresolved(#[from] UnresolvedReference),

    #[error("Subscription {0} not found")]
    SubscriptionNotFound(String),

    #[error("{0}")]
    InvalidSubscription(String),

    /// A plugin handler failed, timed out or returned the wrong shape
    #[error("{plugin} : {reason}")]
    Plugin { plugin: String, reason: String },

    #[error("{0} Not Found")]
    PluginNotFound(String),

    #[error("{0} is Missing source code")]
    MissingCode(String),

    #[error("{0} is Disabled")]
    PluginDisabled(String),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Wrong result")]
    WrongResult,

    #[error(transparent)]
    Vfs(#[from] VfsError),
}

impl Error {
    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Error::Json {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn yaml(context: impl Into<String>, source: serde_yaml::Error) -> Self {
        Error::Yaml {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
