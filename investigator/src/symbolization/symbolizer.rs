use anyhow::{Context, Result};
use log::debug;
use object::{Object, ObjectSegment, ObjectSymbol, SymbolKind};
use rustc_demangle::try_demangle;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::memory_maps::MemoryMapping;

/// Symbolizer for turning code addresses in a target into display strings
///
/// Module symbol tables are loaded on first use and cached, so walking many
/// threads through the same libraries parses each library once.
pub struct Symbolizer {
    /// Prefix for opening module files, e.g. `/proc/<pid>/root`
    root: PathBuf,
    modules: RefCell<HashMap<PathBuf, Option<Rc<ModuleSymbols>>>>,
}

impl Symbolizer {
    /// Create a symbolizer that opens module paths under `root`
    #[must_use]
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into(), modules: RefCell::new(HashMap::new()) }
    }

    /// Describe an address inside `mapping`
    ///
    /// Produces `module!symbol+0xoff` when the module's symbol table covers
    /// the address, otherwise `module+0xoff` with the file offset.
    #[must_use]
    pub fn describe(&self, addr: u64, mapping: &MemoryMapping) -> String {
        let module = mapping.module_name();
        let file_offset = addr - mapping.range.start + mapping.offset;

        let symbols = mapping
            .path
            .as_deref()
            .filter(|_| mapping.is_file_backed())
            .and_then(|path| self.module(path));

        match symbols.as_deref().and_then(|symbols| symbols.lookup(file_offset)) {
            Some((name, offset)) => format!("{module}!{name}+0x{offset:x}"),
            None => format!("{module}+0x{file_offset:x}"),
        }
    }

    fn module(&self, path: &Path) -> Option<Rc<ModuleSymbols>> {
        if let Some(cached) = self.modules.borrow().get(path) {
            return cached.clone();
        }

        let on_disk = self.root.join(path.strip_prefix("/").unwrap_or(path));
        let loaded = match ModuleSymbols::load(&on_disk) {
            Ok(symbols) => Some(Rc::new(symbols)),
            Err(e) => {
                debug!("No symbols for {}: {e:#}", path.display());
                None
            }
        };

        self.modules.borrow_mut().insert(path.to_path_buf(), loaded.clone());
        loaded
    }
}

/// Loadable segments and function symbols of one module
#[derive(Debug, Default)]
pub struct ModuleSymbols {
    /// (file offset, file size, virtual address)
    segments: Vec<(u64, u64, u64)>,
    /// (virtual address, size, name), sorted by address
    symbols: Vec<(u64, u64, String)>,
}

impl ModuleSymbols {
    /// Parse a module's segments and symbol tables
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not an object file
    pub fn load(path: &Path) -> Result<Self> {
        let data =
            fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let obj = object::File::parse(&*data).context("Failed to parse object file")?;

        let segments = obj
            .segments()
            .map(|seg| {
                let (offset, size) = seg.file_range();
                (offset, size, seg.address())
            })
            .collect();

        let mut symbols: Vec<(u64, u64, String)> = obj
            .symbols()
            .chain(obj.dynamic_symbols())
            .filter(|sym| sym.kind() == SymbolKind::Text && sym.address() != 0)
            .filter_map(|sym| {
                let name = sym.name().ok().filter(|n| !n.is_empty())?;
                Some((sym.address(), sym.size(), demangle_symbol(name)))
            })
            .collect();
        symbols.sort_by_key(|&(addr, _, _)| addr);
        symbols.dedup_by_key(|(addr, _, _)| *addr);

        Ok(Self { segments, symbols })
    }

    /// Find the symbol covering a file offset, with the offset into it
    #[must_use]
    pub fn lookup(&self, file_offset: u64) -> Option<(&str, u64)> {
        let vaddr = self.segments.iter().find_map(|&(offset, size, vaddr)| {
            (file_offset >= offset && file_offset < offset + size)
                .then(|| vaddr + (file_offset - offset))
        })?;

        let idx = self.symbols.partition_point(|&(addr, _, _)| addr <= vaddr).checked_sub(1)?;
        let (addr, size, ref name) = self.symbols[idx];
        if size != 0 && vaddr >= addr + size {
            return None;
        }
        Some((name.as_str(), vaddr - addr))
    }
}

/// Demangle a Rust symbol name; other names are returned unchanged
#[must_use]
pub fn demangle_symbol(symbol: &str) -> String {
    match try_demangle(symbol) {
        Ok(demangled) => format!("{demangled:#}"),
        Err(_) => symbol.to_string(),
    }
}
