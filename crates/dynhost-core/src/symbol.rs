//! Resolved plugin symbols.
//!
//! A callable export is stored behind one extra level of indirection: the
//! symbol holds the address of a cell, and the cell holds the code address.
//! Data exports hold the data address directly.

use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};

use crate::error::{PluginError, Result};

/// A non-null address inside a mapped artifact.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawAddress(NonNull<c_void>);

// Addresses of mapped exports stay valid for the process lifetime (artifacts
// are never unloaded), so sharing them across threads is sound.
unsafe impl Send for RawAddress {}
unsafe impl Sync for RawAddress {}

impl RawAddress {
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn from_ref<T>(value: &T) -> Self {
        Self(NonNull::from(value).cast())
    }

    pub fn from_usize(addr: usize) -> Option<Self> {
        Self::new(addr as *mut c_void)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    pub fn as_usize(self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl fmt::Debug for RawAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.as_usize())
    }
}

/// Declared kind of an exported symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum SymbolKind {
    Data = 0,
    Callable = 1,
}

impl SymbolKind {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Data),
            1 => Some(Self::Callable),
            _ => None,
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => f.write_str("data"),
            Self::Callable => f.write_str("callable"),
        }
    }
}

/// A resolved export.
#[derive(Debug)]
pub enum Symbol {
    /// Address of the exported value.
    Data(RawAddress),
    /// Cell holding the code address. The box gives the cell a stable address.
    Callable(Box<RawAddress>),
}

impl Symbol {
    /// Wrap a resolved address according to its declared kind.
    pub fn resolved(kind: SymbolKind, address: RawAddress) -> Self {
        match kind {
            SymbolKind::Data => Self::Data(address),
            SymbolKind::Callable => Self::Callable(Box::new(address)),
        }
    }

    pub fn kind(&self) -> SymbolKind {
        match self {
            Self::Data(_) => SymbolKind::Data,
            Self::Callable(_) => SymbolKind::Callable,
        }
    }

    /// The stored value: the data address, or the address of the code cell.
    pub fn value_ptr(&self) -> *const c_void {
        match self {
            Self::Data(addr) => addr.as_ptr(),
            Self::Callable(cell) => (&**cell as *const RawAddress).cast(),
        }
    }

    /// The exported address with the callable indirection removed.
    pub fn target(&self) -> RawAddress {
        match self {
            Self::Data(addr) => *addr,
            Self::Callable(cell) => **cell,
        }
    }

    /// View a data symbol as `&T`.
    ///
    /// # Safety
    /// The export must really be a `T` that lives for the process lifetime.
    pub unsafe fn as_data<T>(&self) -> Option<&T> {
        match self {
            Self::Data(addr) => Some(&*addr.as_ptr().cast::<T>()),
            Self::Callable(_) => None,
        }
    }

    /// Reinterpret a callable symbol as the function pointer type `F`.
    ///
    /// Returns `None` for data symbols and when `F` is not pointer-sized.
    ///
    /// # Safety
    /// `F` must be a function pointer type matching the export's real signature.
    pub unsafe fn as_fn<F: Copy>(&self) -> Option<F> {
        if std::mem::size_of::<F>() != std::mem::size_of::<*const c_void>() {
            return None;
        }
        match self {
            Self::Callable(cell) => {
                let code = cell.as_ptr();
                Some(std::mem::transmute_copy::<*mut c_void, F>(&code))
            }
            Self::Data(_) => None,
        }
    }
}

/// Immutable name → symbol map of a loaded plugin.
#[derive(Debug, Default)]
pub struct SymbolTable {
    plugin: String,
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new(plugin: impl Into<String>, symbols: HashMap<String, Symbol>) -> Self {
        Self {
            plugin: plugin.into(),
            symbols,
        }
    }

    pub fn get(&self, name: &str) -> Result<&Symbol> {
        self.symbols
            .get(name)
            .ok_or_else(|| PluginError::symbol_not_found(&self.plugin, name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Symbol)> {
        self.symbols.iter().map(|(name, sym)| (name.as_str(), sym))
    }
}
