//! Error handling for plugin loading.
//!
//! Every load failure is cached in the registry and replayed to later callers,
//! so [`PluginError`] is `Clone` and carries only owned strings.

/// Errors produced while opening a plugin or looking up one of its symbols.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    /// The requested name could not be turned into a canonical identity.
    #[error("open({name:?}): realpath failed: {reason}")]
    PathResolution { name: String, reason: String },

    /// The native loader refused to map the artifact.
    #[error("open({name:?}): {reason}")]
    NativeMap { name: String, reason: String },

    /// The artifact's module table was malformed or already initialized.
    #[error("open({name:?}): {reason}")]
    ModuleInit { name: String, reason: String },

    /// A declared export could not be resolved while loading.
    #[error("open({name:?}): could not find symbol {symbol}: {detail}")]
    MissingExport {
        name: String,
        symbol: String,
        detail: String,
    },

    /// A lookup on a loaded plugin asked for an unknown name.
    #[error("symbol {symbol} not found in plugin {plugin}")]
    SymbolNotFound { plugin: String, symbol: String },

    /// The identity was attempted before and failed; the cached cause is kept verbatim.
    #[error("open({name:?}): {} (previous failure)", .cause.reason())]
    PreviousFailure {
        name: String,
        #[source]
        cause: Box<PluginError>,
    },
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, PluginError>;

impl PluginError {
    pub fn native_map(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NativeMap {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn module_init(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModuleInit {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// A symbol absent from an already loaded plugin.
    pub fn symbol_not_found(plugin: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self::SymbolNotFound {
            plugin: plugin.into(),
            symbol: symbol.into(),
        }
    }

    /// A declared export the native loader could not resolve during a load.
    pub fn missing_export(
        name: impl Into<String>,
        symbol: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::MissingExport {
            name: name.into(),
            symbol: symbol.into(),
            detail: detail.into(),
        }
    }

    /// Wrap a cached failure for replay to a later caller.
    pub fn previous_failure(name: impl Into<String>, cause: PluginError) -> Self {
        // Replays of replays keep the original cause.
        let cause = match cause {
            Self::PreviousFailure { cause, .. } => cause,
            other => Box::new(other),
        };
        Self::PreviousFailure {
            name: name.into(),
            cause,
        }
    }

    /// The failure text without the `open(...)` prefix.
    pub fn reason(&self) -> String {
        match self {
            Self::PathResolution { reason, .. } => format!("realpath failed: {reason}"),
            Self::NativeMap { reason, .. } | Self::ModuleInit { reason, .. } => reason.clone(),
            Self::MissingExport { symbol, detail, .. } => {
                format!("could not find symbol {symbol}: {detail}")
            }
            Self::SymbolNotFound { symbol, .. } => format!("could not find symbol {symbol}"),
            Self::PreviousFailure { cause, .. } => cause.reason(),
        }
    }

    pub fn is_previous_failure(&self) -> bool {
        matches!(self, Self::PreviousFailure { .. })
    }

    /// The error that originally failed the load, unwrapping a replay marker.
    pub fn root_cause(&self) -> &PluginError {
        match self {
            Self::PreviousFailure { cause, .. } => cause,
            other => other,
        }
    }
}
