//! Settings from a `.env` file, for flags that are not passed on the command
//! line. Every flag of the binary reads a `ZK_PIG_*` variable.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

/// Loads the variables of the env file `name`, looked up in the working
/// directory and its ancestors, into the process environment. Variables
/// already set are kept.
///
/// Returns where the file was found, or `None` if there is none.
pub fn load_env_file(name: impl AsRef<Path>) -> anyhow::Result<Option<PathBuf>> {
    let name = name.as_ref();
    match dotenvy::from_filename(name) {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e).with_context(|| format!("loading {}", name.display())),
    }
}
