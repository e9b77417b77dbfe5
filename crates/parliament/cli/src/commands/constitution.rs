use parliament_constitution::Constitution;

use crate::error::CliResult;

/// Always JSON: the document is meant to be edited and fed back in.
pub fn execute(constitution: &Constitution) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(constitution)?);
    Ok(())
}
