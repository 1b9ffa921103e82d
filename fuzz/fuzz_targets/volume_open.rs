#![no_main]

use std::io::Cursor;

use libfuzzer_sys::fuzz_target;

use archav_storage::{Reader, SchemeRegistry, StringCodec, Volume};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic the volume parser:
    // - Invalid magic bytes
    // - Truncated headers and metadata
    // - Bad metadata checksums or malformed JSON
    // - Mangled page envelopes and bodies
    let registry = SchemeRegistry::new();
    if let Ok(volume) = Volume::open(&registry, Cursor::new(data.to_vec())) {
        // If the header parsed, a tolerant scan must still terminate
        // without panicking, whatever the page region contains.
        let mut reader = Reader::new(volume, StringCodec).with_tolerant(true);
        for record in reader.all() {
            let _ = record;
        }
    }
});
