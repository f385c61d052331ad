use super::{describe, EXIT_SUCCESS};
use crate::state::StateFile;
use helmwright_core::Engine;
use std::path::Path;

pub fn run(engine: &Engine, state_path: &Path) -> Result<u8, String> {
    let mut state = StateFile::load(state_path)?;
    if state.is_empty() {
        return Err(format!("no resource in {}", state_path.display()));
    }
    let result = engine.read(state.kind, &mut state);
    state.save()?;
    result.map_err(|e| describe(&e))?;
    println!("refreshed {}", state.id);
    Ok(EXIT_SUCCESS)
}
