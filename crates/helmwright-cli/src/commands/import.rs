use super::{describe, EXIT_SUCCESS};
use crate::state::StateFile;
use helmwright_core::{Engine, ResourceKind};
use std::path::Path;

pub fn run(engine: &Engine, state_path: &Path, manifest: &Path) -> Result<u8, String> {
    let mut state = StateFile::load(state_path)?;
    if !state.id.is_empty() {
        return Err(format!(
            "{} already tracks resource {}",
            state_path.display(),
            state.id
        ));
    }
    state.kind = ResourceKind::ReleaseSet;
    engine.import(&mut state, manifest).map_err(|e| describe(&e))?;
    state.save()?;
    println!("imported {} as {}", manifest.display(), state.id);
    Ok(EXIT_SUCCESS)
}
