use super::{colorize_diff, describe, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use crate::state::{ResourceFile, StateFile};
use helmwright_core::{DiffOptions, Engine};
use helmwright_schema::{keys, FieldsExt};
use std::path::Path;

pub fn run(engine: &Engine, state_path: &Path, resource: &Path) -> Result<u8, String> {
    let resource = ResourceFile::load(resource)?;
    let mut state = StateFile::load(state_path)?;
    state.adopt(resource);

    let planned = engine.plan_diff(state.kind, &mut state, &DiffOptions::default());
    let diff = match planned {
        Ok(diff) => diff,
        Err(e) => {
            state.save()?;
            return Err(describe(&e));
        }
    };
    let creating = state.id.is_empty();
    if !creating && diff.is_empty() {
        state.save()?;
        println!("No changes.");
        return Ok(EXIT_SUCCESS);
    }
    if !diff.is_empty() {
        println!("{}", colorize_diff(&diff));
    }

    let pb = spinner(if creating { "creating release set..." } else { "updating release set..." });
    let result = if creating {
        engine.create(state.kind, &mut state)
    } else {
        engine.update(state.kind, &mut state)
    };
    state.save()?;
    match result {
        Ok(()) => spin_ok(&pb, if creating { "release set created" } else { "release set updated" }),
        Err(e) => {
            spin_fail(&pb, "apply failed");
            return Err(describe(&e));
        }
    }

    let output = state.get_str(keys::APPLY_OUTPUT).ok().flatten().unwrap_or_default();
    if !output.is_empty() {
        print!("{output}");
    }
    println!("id: {}", state.id);
    Ok(EXIT_SUCCESS)
}
