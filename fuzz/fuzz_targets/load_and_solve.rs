#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sketchsolve::{Config, PrimitiveRecord};

fuzz_target!(|setup: Setup| {
    // Malformed sketches must be rejected, never panic.
    let Ok(mut sketch) = sketchsolve::load(&setup.records) else {
        return;
    };
    let config = setup
        .config
        .with_max_iterations(setup.config.max_iterations.min(50))
        .with_max_line_search_halvings(setup.config.max_line_search_halvings.min(16));
    let _ = sketch.solve(&config);
    let _ = sketch.read_back();
});

#[derive(Debug, Arbitrary)]
struct Setup {
    records: Vec<PrimitiveRecord>,
    config: Config,
}
