#![no_main]

use std::io::Cursor;

use libfuzzer_sys::fuzz_target;

use archav_storage::{SchemeRegistry, Volume};

fuzz_target!(|data: &[u8]| {
    // Page-granularity walking and boundary probing over arbitrary
    // medium bytes: every page that validates must enumerate its frames
    // without panicking, and the probe must terminate.
    let registry = SchemeRegistry::new();
    if let Ok(mut volume) = Volume::open(&registry, Cursor::new(data.to_vec())) {
        let _ = volume.probe_page(0);

        for item in volume.pages(None, true) {
            let Ok((_, page)) = item else { break };
            if let Ok(entries) = page.entries() {
                for entry in entries {
                    let _ = (entry.address, entry.status);
                }
            }
        }
    }
});
