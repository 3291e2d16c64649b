//! Central path resolution for MatchPulse data files.
//!
//! Resolved once at startup from: CLI `--data-dir` > `MATCHPULSE_DATA_DIR` env > `~/.matchpulse`.
//! All callsites use these helpers instead of constructing paths from `HOME`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

static DATA_DIR: RwLock<Option<PathBuf>> = RwLock::new(None);

const DIR_NAME: &str = ".matchpulse";

/// Initialize the global data directory. Returns the resolved path.
///
/// Priority: `explicit` arg > `MATCHPULSE_DATA_DIR` env > `~/.matchpulse` default.
pub fn init_data_dir(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = resolve_data_dir(explicit, std::env::var("MATCHPULSE_DATA_DIR").ok())?;
    let mut guard = DATA_DIR.write().unwrap_or_else(|e| e.into_inner());
    *guard = Some(dir.clone());
    Ok(dir)
}

fn resolve_data_dir(explicit: Option<&Path>, env_val: Option<String>) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    if let Some(v) = env_val.filter(|v| !v.trim().is_empty()) {
        return Ok(PathBuf::from(v));
    }
    dirs::home_dir()
        .map(|home| home.join(DIR_NAME))
        .ok_or_else(|| anyhow::anyhow!("HOME directory not found; pass --data-dir"))
}

/// Current data directory. Before `init_data_dir` this falls back to the
/// relative `.matchpulse`.
pub fn data_dir() -> PathBuf {
    DATA_DIR
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
        .unwrap_or_else(|| PathBuf::from(DIR_NAME))
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

pub fn token_file_path() -> PathBuf {
    data_dir().join("auth-token")
}

/// Create all required subdirectories under the data dir.
pub fn ensure_dirs() -> io::Result<()> {
    let base = data_dir();
    std::fs::create_dir_all(&base)?;
    std::fs::create_dir_all(base.join("logs"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins_over_env() {
        let dir = resolve_data_dir(Some(Path::new("/srv/pulse")), Some("/env/pulse".into())).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/pulse"));
    }

    #[test]
    fn env_dir_used_when_no_flag() {
        let dir = resolve_data_dir(None, Some("/env/pulse".into())).unwrap();
        assert_eq!(dir, PathBuf::from("/env/pulse"));
    }

    #[test]
    fn blank_env_falls_back_to_home() {
        let dir = resolve_data_dir(None, Some("  ".into()));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(dir.unwrap(), home.join(".matchpulse"));
        }
    }
}
