//! Handle to a loaded plugin.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::native::MappedArtifact;
use crate::symbol::{Symbol, SymbolTable};

/// A successfully loaded plugin. Cheap to clone; all clones share one table.
#[derive(Clone)]
pub struct Plugin {
    inner: Arc<PluginInner>,
}

struct PluginInner {
    identity: String,
    module_path: String,
    symbols: SymbolTable,
    // Held so the mapping outlives every symbol handed out.
    _artifact: Arc<dyn MappedArtifact>,
}

impl Plugin {
    pub(crate) fn new(
        identity: String,
        module_path: String,
        symbols: SymbolTable,
        artifact: Arc<dyn MappedArtifact>,
    ) -> Self {
        Self {
            inner: Arc::new(PluginInner {
                identity,
                module_path,
                symbols,
                _artifact: artifact,
            }),
        }
    }

    /// Registry key this plugin was loaded under.
    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    /// Module identity reported by module-init.
    pub fn module_path(&self) -> &str {
        &self.inner.module_path
    }

    /// Look up an exported symbol. Never blocks and never calls into the OS.
    pub fn lookup(&self, name: &str) -> Result<&Symbol> {
        self.inner.symbols.get(name)
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.inner.symbols
    }

    /// Whether two handles refer to the same load.
    pub fn ptr_eq(&self, other: &Plugin) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("identity", &self.inner.identity)
            .field("module_path", &self.inner.module_path)
            .field("symbols", &self.inner.symbols.len())
            .finish()
    }
}
