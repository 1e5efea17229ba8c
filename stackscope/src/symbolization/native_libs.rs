//! Native code: runtime stubs and shared libraries
//!
//! A [`NativeCodeCache`] maps addresses to symbol names. Runtime helper
//! stubs are added one by one as the runtime generates them; a shared
//! library's cache is loaded once from its ELF symbol tables and is
//! read-only afterwards. [`NativeLibraries`] is the append-only set of
//! loaded libraries; it outlives profiling sessions.

use anyhow::{Context, Result};
use object::{Object, ObjectKind, ObjectSymbol, SymbolKind};
use rustc_demangle::try_demangle;
use stackscope_common::MAX_NATIVE_LIBS;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, TryLockError};

use super::code_cache::{CodeBlob, CodeCache};

/// Named address-to-symbol cache for native code
pub struct NativeCodeCache {
    name: Arc<str>,
    cache: CodeCache<Arc<str>>,
}

impl NativeCodeCache {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self { name: Arc::from(name), cache: CodeCache::new() }
    }

    /// Build from `(address, size, symbol)` triples
    pub fn from_symbols<'a>(
        name: &str,
        symbols: impl IntoIterator<Item = (u64, u64, &'a str)>,
    ) -> Self {
        let mut blobs: Vec<CodeBlob<Arc<str>>> = symbols
            .into_iter()
            .filter(|(_, size, _)| *size > 0)
            .map(|(start, size, symbol)| CodeBlob {
                start,
                end: start.saturating_add(size),
                symbol: Arc::from(symbol),
            })
            .collect();
        blobs.sort_by_key(|b| b.start);
        Self { name: Arc::from(name), cache: CodeCache::from_blobs(blobs) }
    }

    /// Load the function symbols of an ELF object mapped at `load_bias`
    ///
    /// Reads both the static and the dynamic symbol table; Rust symbols are
    /// demangled, other names are kept as they are. Symbols of non-PIE
    /// executables are already absolute and ignore `load_bias`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn from_elf<P: AsRef<Path>>(path: P, load_bias: u64) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .with_context(|| format!("Failed to read shared library {}", path.display()))?;
        let file = object::File::parse(&*data)
            .with_context(|| format!("Failed to parse object file {}", path.display()))?;
        let bias = if file.kind() == ObjectKind::Executable { 0 } else { load_bias };

        let names: Vec<(u64, u64, String)> = file
            .symbols()
            .chain(file.dynamic_symbols())
            .filter(|sym| sym.kind() == SymbolKind::Text && sym.is_definition() && sym.size() > 0)
            .filter_map(|sym| {
                let raw = sym.name().ok()?;
                let name = match try_demangle(raw) {
                    Ok(demangled) => format!("{demangled:#}"),
                    Err(_) => raw.to_string(),
                };
                Some((bias.wrapping_add(sym.address()), sym.size(), name))
            })
            .collect();

        log::info!("Loaded {} symbols from {}", names.len(), path.display());
        Ok(Self::from_symbols(
            &path.to_string_lossy(),
            names.iter().map(|(addr, size, name)| (*addr, *size, name.as_str())),
        ))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&self, start: u64, length: u64, symbol: &str) {
        self.cache.add(start, length, Arc::from(symbol));
    }

    /// Symbol containing `addr`; non-blocking
    pub fn lookup(&self, addr: u64) -> Option<Arc<str>> {
        self.cache.lookup(addr)
    }

    /// Fast range check against the library's overall bounds
    pub fn contains(&self, addr: u64) -> bool {
        self.cache.in_bounds(addr)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Append-only set of loaded native libraries
#[derive(Default)]
pub struct NativeLibraries {
    libs: RwLock<Vec<Arc<NativeCodeCache>>>,
}

impl NativeLibraries {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a library; returns false when the library limit is reached
    pub fn add(&self, lib: NativeCodeCache) -> bool {
        let mut libs = self.libs.write().unwrap_or_else(PoisonError::into_inner);
        if libs.len() >= MAX_NATIVE_LIBS {
            log::warn!("Native library limit reached, ignoring {}", lib.name());
            return false;
        }
        libs.push(Arc::new(lib));
        true
    }

    /// Whether a library with this name has been loaded
    pub fn contains_name(&self, name: &str) -> bool {
        self.libs.read().unwrap_or_else(PoisonError::into_inner).iter().any(|l| l.name() == name)
    }

    /// Resolve `addr` across all libraries; non-blocking
    pub fn lookup(&self, addr: u64) -> Option<Arc<str>> {
        let libs = match self.libs.try_read() {
            Ok(libs) => libs,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        libs.iter().filter(|lib| lib.contains(addr)).find_map(|lib| lib.lookup(addr))
    }

    /// Whether `addr` falls inside any library's bounds; non-blocking
    pub fn contains(&self, addr: u64) -> bool {
        match self.libs.try_read() {
            Ok(libs) => libs.iter().any(|lib| lib.contains(addr)),
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner().iter().any(|lib| lib.contains(addr))
            }
            Err(TryLockError::WouldBlock) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.libs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_symbols_sorts_and_skips_empty() {
        let lib = NativeCodeCache::from_symbols(
            "libtest.so",
            [(0x2000, 0x40, "second"), (0x1000, 0x40, "first"), (0x3000, 0, "marker")],
        );
        assert_eq!(lib.len(), 2);
        assert_eq!(lib.lookup(0x1010).as_deref(), Some("first"));
        assert_eq!(lib.lookup(0x2030).as_deref(), Some("second"));
        assert_eq!(lib.lookup(0x3000), None);
    }

    #[test]
    fn test_libraries_resolve_across_caches() {
        let libs = NativeLibraries::new();
        libs.add(NativeCodeCache::from_symbols("liba.so", [(0x1000, 0x100, "a_fn")]));
        libs.add(NativeCodeCache::from_symbols("libb.so", [(0x9000, 0x100, "b_fn")]));

        assert_eq!(libs.lookup(0x9010).as_deref(), Some("b_fn"));
        assert!(libs.contains(0x1050));
        assert!(!libs.contains(0x5000));
        assert!(libs.contains_name("liba.so"));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_from_elf_reads_system_binary() {
        // Stripped binaries still carry a dynamic symbol table
        let Ok(lib) = NativeCodeCache::from_elf("/bin/ls", 0) else {
            return;
        };
        assert_eq!(lib.name(), "/bin/ls");
    }

    #[test]
    fn test_from_elf_missing_file() {
        assert!(NativeCodeCache::from_elf("/nonexistent/libnothing.so", 0).is_err());
    }
}
