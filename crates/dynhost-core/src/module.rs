//! Module-init: reading an artifact's module identity and export table.
//!
//! Artifacts built for dynhost export a [`ModuleDescriptor`] under
//! [`DESCRIPTOR_SYMBOL`]. Use [`export_module!`](crate::export_module) to emit it.

use std::collections::{BTreeMap, HashSet};

use parking_lot::Mutex;

use crate::native::MappedArtifact;
use crate::symbol::SymbolKind;

/// Current module descriptor ABI version.
pub const MODULE_ABI_VERSION: u32 = 1;

/// Export name of the module descriptor.
pub const DESCRIPTOR_SYMBOL: &str = "dynhost_module_descriptor";

/// Module identity and declared exports reported by module-init.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDeclaration {
    /// Prefix of every export name, e.g. `sample` for `sample.Version`.
    pub module_path: String,
    pub symbols: BTreeMap<String, SymbolKind>,
}

impl ModuleDeclaration {
    pub fn new(module_path: impl Into<String>) -> Self {
        Self {
            module_path: module_path.into(),
            symbols: BTreeMap::new(),
        }
    }

    pub fn with_symbol(mut self, name: impl Into<String>, kind: SymbolKind) -> Self {
        self.symbols.insert(name.into(), kind);
        self
    }

    /// Full export name of `symbol` inside this module.
    pub fn qualified(&self, symbol: &str) -> String {
        format!("{}.{}", self.module_path, symbol)
    }
}

/// Extracts a freshly mapped artifact's module declaration.
///
/// Implementations may call back into the loader to open other artifacts.
pub trait ModuleInit: Send + Sync {
    /// Returns the declaration, or a description of why the module table is
    /// unusable.
    fn module_init(&self, artifact: &dyn MappedArtifact) -> Result<ModuleDeclaration, String>;
}

/// Module descriptor exported by an artifact.
#[repr(C)]
pub struct ModuleDescriptor {
    pub abi_version: u32,
    pub module_path: *const u8,
    pub module_path_len: usize,
    pub symbols: *const SymbolEntry,
    pub symbols_len: usize,
}

/// One declared export inside a [`ModuleDescriptor`].
#[repr(C)]
pub struct SymbolEntry {
    pub name: *const u8,
    pub name_len: usize,
    /// [`SymbolKind`] tag: 0 for data, 1 for callable.
    pub kind: u32,
}

// Descriptors point only at `'static` data inside the artifact.
unsafe impl Sync for ModuleDescriptor {}
unsafe impl Sync for SymbolEntry {}

impl ModuleDescriptor {
    /// Decode into owned form.
    ///
    /// # Safety
    /// Every pointer/length pair must describe readable memory.
    pub unsafe fn parse(&self) -> Result<ModuleDeclaration, String> {
        if self.abi_version != MODULE_ABI_VERSION {
            return Err(format!(
                "module descriptor ABI mismatch: expected {}, found {}",
                MODULE_ABI_VERSION, self.abi_version
            ));
        }

        let module_path = read_str(self.module_path, self.module_path_len)
            .map_err(|e| format!("invalid module path: {e}"))?;
        if module_path.is_empty() {
            return Err("module descriptor has an empty module path".to_string());
        }

        let mut declaration = ModuleDeclaration::new(module_path);
        if self.symbols_len == 0 {
            return Ok(declaration);
        }
        if self.symbols.is_null() {
            return Err("module descriptor symbol table is null".to_string());
        }

        let entries = std::slice::from_raw_parts(self.symbols, self.symbols_len);
        for (index, entry) in entries.iter().enumerate() {
            let name = read_str(entry.name, entry.name_len)
                .map_err(|e| format!("invalid name for symbol #{index}: {e}"))?;
            if name.is_empty() {
                return Err(format!("symbol #{index} has an empty name"));
            }
            let kind = SymbolKind::from_tag(entry.kind)
                .ok_or_else(|| format!("symbol {name} has unknown kind tag {}", entry.kind))?;
            if declaration.symbols.insert(name.clone(), kind).is_some() {
                return Err(format!("symbol {name} declared twice"));
            }
        }

        Ok(declaration)
    }
}

unsafe fn read_str(ptr: *const u8, len: usize) -> Result<String, String> {
    if len == 0 {
        return Ok(String::new());
    }
    if ptr.is_null() {
        return Err("null pointer".to_string());
    }
    let bytes = std::slice::from_raw_parts(ptr, len);
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| e.to_string())
}

/// [`ModuleInit`] reading the exported [`ModuleDescriptor`].
///
/// Remembers every module path it has accepted and refuses a second artifact
/// claiming the same one.
#[derive(Debug, Default)]
pub struct DescriptorModuleInit {
    initialized: Mutex<HashSet<String>>,
}

impl DescriptorModuleInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self, module_path: &str) -> bool {
        self.initialized.lock().contains(module_path)
    }
}

impl ModuleInit for DescriptorModuleInit {
    fn module_init(&self, artifact: &dyn MappedArtifact) -> Result<ModuleDeclaration, String> {
        let address = artifact
            .resolve_export(DESCRIPTOR_SYMBOL)
            .map_err(|e| format!("not a dynhost module: {e}"))?;

        // SAFETY: the export named DESCRIPTOR_SYMBOL is a ModuleDescriptor by contract.
        let declaration = unsafe {
            let descriptor = &*address.as_ptr().cast::<ModuleDescriptor>();
            descriptor.parse()?
        };

        if !self
            .initialized
            .lock()
            .insert(declaration.module_path.clone())
        {
            return Err(format!(
                "module {:?} already initialized",
                declaration.module_path
            ));
        }

        tracing::debug!(
            "Module {} declares {} symbol(s)",
            declaration.module_path,
            declaration.symbols.len()
        );
        Ok(declaration)
    }
}

/// Export a [`ModuleDescriptor`] from an artifact crate.
///
/// ```ignore
/// dynhost_core::export_module! {
///     path: "sample",
///     symbols: ["Version" => Data, "Run" => Callable],
/// }
///
/// #[export_name = "sample.Version"]
/// pub static VERSION: u32 = 3;
///
/// #[export_name = "sample.Run"]
/// pub extern "C" fn run() {}
/// ```
#[macro_export]
macro_rules! export_module {
    (
        path: $path:literal,
        symbols: [ $( $name:literal => $kind:ident ),* $(,)? ] $(,)?
    ) => {
        #[allow(non_upper_case_globals)]
        #[no_mangle]
        pub static dynhost_module_descriptor: $crate::module::ModuleDescriptor = {
            const ENTRIES: &[$crate::module::SymbolEntry] = &[
                $(
                    $crate::module::SymbolEntry {
                        name: $name.as_ptr(),
                        name_len: $name.len(),
                        kind: $crate::symbol::SymbolKind::$kind as u32,
                    },
                )*
            ];
            $crate::module::ModuleDescriptor {
                abi_version: $crate::module::MODULE_ABI_VERSION,
                module_path: $path.as_ptr(),
                module_path_len: $path.len(),
                symbols: ENTRIES.as_ptr(),
                symbols_len: ENTRIES.len(),
            }
        };
    };
}
