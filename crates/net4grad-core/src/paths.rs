//! Where the client keeps `config.json` and `session.json`.

use std::env;
use std::path::PathBuf;

/// Value of `key`, treating an empty variable as unset.
fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

/// Home directory from `HOME`, falling back to `USERPROFILE` on Windows.
pub fn home_dir() -> Result<PathBuf, String> {
    non_empty_var("HOME")
        .or_else(|| non_empty_var("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or_else(|| "Home directory not set".to_string())
}

/// Resolution order: `NET4GRAD_CONFIG_DIR`, `$XDG_CONFIG_HOME/net4grad`,
/// then `~/.config/net4grad`.
pub fn config_dir() -> Result<PathBuf, String> {
    if let Some(dir) = non_empty_var("NET4GRAD_CONFIG_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg) = non_empty_var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("net4grad"));
    }
    Ok(home_dir()?.join(".config").join("net4grad"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const HOME: usize = 0;
    const PROFILE: usize = 1;
    const XDG: usize = 2;
    const OVERRIDE: usize = 3;
    const KEYS: [&str; 4] = ["HOME", "USERPROFILE", "XDG_CONFIG_HOME", "NET4GRAD_CONFIG_DIR"];

    /// Run `f` with only the listed variables set, restoring them afterwards.
    fn scoped_env<F: FnOnce()>(set: &[(usize, &str)], f: F) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let saved: Vec<_> = KEYS.iter().map(|k| env::var_os(k)).collect();

        for key in KEYS {
            env::remove_var(key);
        }
        for (index, value) in set {
            env::set_var(KEYS[*index], value);
        }

        f();

        for (key, value) in KEYS.iter().zip(saved) {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }

    #[test]
    fn home_wins_over_userprofile() {
        scoped_env(&[(HOME, "/h"), (PROFILE, "/p")], || {
            assert_eq!(home_dir().unwrap(), PathBuf::from("/h"));
        });
    }

    #[test]
    fn empty_home_falls_through() {
        scoped_env(&[(HOME, ""), (PROFILE, "/p")], || {
            assert_eq!(home_dir().unwrap(), PathBuf::from("/p"));
        });
    }

    #[test]
    fn override_beats_xdg() {
        scoped_env(&[(HOME, "/h"), (XDG, "/x"), (OVERRIDE, "/n4g")], || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/n4g"));
        });
    }

    #[test]
    fn xdg_then_dot_config() {
        scoped_env(&[(HOME, "/h"), (XDG, "/x")], || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/x/net4grad"));
        });
        scoped_env(&[(HOME, "/h")], || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/h/.config/net4grad"));
        });
    }

    #[test]
    fn no_home_is_an_error() {
        scoped_env(&[], || assert!(config_dir().is_err()));
    }
}
