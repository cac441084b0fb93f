use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CONSILIENCE_DIR: &str = ".consilience";
pub const CONFIG_FILE: &str = ".consilience/config.yaml";
pub const LANES_DB_FILE: &str = ".consilience/lanes.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn lanes_db_path(root: &Path) -> PathBuf {
    root.join(LANES_DB_FILE)
}
