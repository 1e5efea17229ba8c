//! # Symbol Resolution
//!
//! Frames captured on the sampling path carry raw identities: method ids
//! for managed frames and program counters for native ones. This module
//! turns them into names.
//!
//! ## Caches
//!
//! ```text
//! ┌──────────────────────┐  add/remove on every code generation / unload
//! │ CodeCache<MethodId>  │◀─────────────────────────────────────────────
//! │ (compiled methods)   │
//! └──────────────────────┘
//! ┌──────────────────────┐  add per generated helper stub
//! │ NativeCodeCache      │◀─────────────────────────────────────────────
//! │ "[stubs]"            │
//! └──────────────────────┘
//! ┌──────────────────────┐  loaded once per shared library from its ELF
//! │ NativeLibraries      │  symbol tables, read-only afterwards
//! │ [NativeCodeCache; N] │◀─────────────────────────────────────────────
//! └──────────────────────┘
//! ```
//!
//! All caches keep regions sorted by address and answer lookups with a
//! binary search. Lookups are usable from the sampling path: they never
//! block, and report "unknown" while a mutation is in flight.
//!
//! ## Address Translation
//!
//! Shared libraries are found through `/proc/self/maps`. ELF symbol
//! addresses are file-relative, so each library is loaded with the load
//! bias of its executable mapping:
//!
//! ```text
//! Runtime Address = Load Bias + Symbol Address
//! Load Bias       = Mapping Start - Mapping File Offset
//! ```

pub mod code_cache;
pub mod memory_maps;
pub mod names;
pub mod native_libs;

pub use code_cache::{CodeBlob, CodeCache};
pub use memory_maps::{current_process_mappings, parse_executable_mappings, MappedObject, MemoryRange};
pub use names::NameRegistry;
pub use native_libs::{NativeCodeCache, NativeLibraries};
