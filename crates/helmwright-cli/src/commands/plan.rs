use super::{colorize_diff, describe, EXIT_SUCCESS};
use crate::state::{ResourceFile, StateFile};
use helmwright_core::{DiffOptions, Engine};
use std::path::Path;

pub fn run(engine: &Engine, state_path: &Path, resource: &Path, opts: &DiffOptions) -> Result<u8, String> {
    let resource = ResourceFile::load(resource)?;
    let mut state = StateFile::load(state_path)?;
    state.adopt(resource);

    let result = engine.plan_diff(state.kind, &mut state, opts);
    state.save()?;
    let diff = result.map_err(|e| describe(&e))?;

    if diff.is_empty() {
        println!("No changes.");
    } else {
        println!("{}", colorize_diff(&diff));
    }
    Ok(EXIT_SUCCESS)
}
