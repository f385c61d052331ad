use super::{json_pretty, EXIT_SUCCESS};
use crate::state::StateFile;
use serde_json::Value;
use std::path::Path;

pub fn run(state_path: &Path, json: bool) -> Result<u8, String> {
    let state = StateFile::load(state_path)?;
    if json {
        println!("{}", json_pretty(&state)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("id:    {}", if state.id.is_empty() { "(none)" } else { state.id.as_str() });
    println!("kind:  {}", json_pretty(&state.kind)?.trim_matches('"'));
    for (key, value) in &state.attributes {
        match value {
            Value::String(s) if s.contains('\n') => {
                println!("{key}:");
                for line in s.lines() {
                    println!("    {line}");
                }
            }
            Value::String(s) => println!("{key}: {s}"),
            other => println!("{key}: {other}"),
        }
    }
    Ok(EXIT_SUCCESS)
}
