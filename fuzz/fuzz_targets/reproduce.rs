use log::info;

#[path = "script.rs"]
mod script;

fn main() {
    env_logger::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: reproduce <artifact-file>");
        std::process::exit(1);
    });

    let data = std::fs::read(&path).unwrap_or_else(|e| {
        eprintln!("Failed to read {path}: {e}");
        std::process::exit(1);
    });

    let Some((count, steps)) = script::decode(&data) else {
        eprintln!("Artifact is empty");
        std::process::exit(1);
    };

    eprintln!(
        "=== Input: {} ({} bytes): {} slides, {} steps ===",
        path,
        data.len(),
        count,
        steps.len()
    );
    for (i, step) in steps.iter().enumerate() {
        info!("step {i}: +{:?} {:?}", step.advance, step.event);
    }

    let c = script::replay(count, &steps, &data);
    let state = c.state();
    eprintln!(
        "=== Done: slide {}/{}, zoom {:.2}, mode {}, music {} ===",
        state.current + 1,
        state.slide_count(),
        state.zoom,
        state.mode,
        state.music_playing
    );
}
