use investigator::domain::Pid;
use investigator::symbolization::{find_mapping, read_memory_maps, ModuleSymbols, Symbolizer};
use std::path::Path;

#[inline(never)]
fn marker_function_for_symbolization() -> u32 {
    std::hint::black_box(42)
}

#[cfg(target_os = "linux")]
#[test]
fn test_symbolizer_describes_own_code() {
    let addr = marker_function_for_symbolization as fn() -> u32 as usize as u64;
    let mappings = read_memory_maps(Pid(std::process::id())).expect("Failed to read own maps");

    let mapping = find_mapping(&mappings, addr).expect("marker function should be mapped");
    assert!(mapping.is_executable());
    assert!(mapping.is_file_backed());

    let symbolizer = Symbolizer::new("/");
    let described = symbolizer.describe(addr, mapping);
    println!("Resolved 0x{addr:x} to {described}");

    assert!(described.starts_with(&mapping.module_name()));
    assert!(
        described.contains("marker_function_for_symbolization+0x0"),
        "unexpected description: {described}"
    );
}

#[test]
fn test_module_symbols_of_test_binary() {
    let exe = std::env::current_exe().unwrap();
    let symbols = ModuleSymbols::load(&exe);
    assert!(symbols.is_ok(), "Failed to load symbols: {:?}", symbols.err());
}

#[test]
fn test_module_symbols_rejects_non_object_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-an-object.so");
    std::fs::write(&path, b"plain text").unwrap();

    assert!(ModuleSymbols::load(&path).is_err());
    assert!(ModuleSymbols::load(Path::new("/nonexistent/libfoo.so")).is_err());
}
