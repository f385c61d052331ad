use super::{describe, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use crate::state::StateFile;
use helmwright_core::Engine;
use std::path::Path;

pub fn run(engine: &Engine, state_path: &Path) -> Result<u8, String> {
    let mut state = StateFile::load(state_path)?;
    if state.id.is_empty() {
        return Err(format!("no created resource in {}", state_path.display()));
    }
    let id = state.id.clone();

    let pb = spinner("destroying release set...");
    let result = engine.delete(state.kind, &mut state);
    state.save()?;
    match result {
        Ok(()) => spin_ok(&pb, "release set destroyed"),
        Err(e) => {
            spin_fail(&pb, "destroy failed");
            return Err(describe(&e));
        }
    }
    println!("destroyed {id}");
    Ok(EXIT_SUCCESS)
}
