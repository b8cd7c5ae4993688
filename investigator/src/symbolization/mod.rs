//! # Address Resolution for Native Frames
//!
//! The live backend unwinds threads into raw code addresses such as
//! `0x7f1a2b0a4c10`. This module turns them into something a person can read.
//!
//! ## Address Translation Flow
//!
//! ```text
//! 1. Parse /proc/<pid>/maps
//!    7f1a2b000000-7f1a2b400000 r-xp 00100000 ... /usr/share/dotnet/.../libcoreclr.so
//!
//! 2. Find the mapping that contains the address
//!    0x7f1a2b0a4c10 is inside libcoreclr.so
//!
//! 3. Convert to a file offset
//!    file_offset = addr - mapping.start + mapping.offset = 0x1a4c10
//!
//! 4. Convert the file offset to the module's virtual address using its
//!    loadable segments, then look up the nearest preceding symbol
//!    0x1a4c10 → ThreadNative::Sleep+0x2a
//! ```
//!
//! Modules are opened through `/proc/<pid>/root` so targets running in a
//! different mount namespace (containers) resolve against their own files.
//!
//! ## Module Structure
//!
//! - **`memory_maps`**: `/proc/<pid>/maps` parsing, mapping lookup
//! - **`symbolizer`**: ELF/PE symbol tables via `object`, cached per module
//!
//! ## Limitations
//!
//! - Symbol tables only: no DWARF line information
//! - C++ names from the runtime are shown mangled
//! - JIT-compiled managed code lives in anonymous mappings and shows as
//!   `<anonymous>+0x...`

pub mod memory_maps;
pub mod symbolizer;

pub use memory_maps::{find_mapping, parse_memory_maps, read_memory_maps, MemoryMapping, MemoryRange};
pub use symbolizer::{ModuleSymbols, Symbolizer};
