use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "DELAYCAM_CONFIG_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "Delaycam";
const APPLICATION: &str = "delaycam";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        if let Some(config_dir) = env_override(ENV_CONFIG_DIR) {
            return Ok(Self { config_dir });
        }
        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;
        Ok(Self {
            config_dir: project_dirs.config_dir().to_path_buf(),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.toml")
    }
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.as_os_str().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::sync::{Mutex, OnceLock};
    use tempfile::TempDir;

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    struct EnvGuard {
        key: &'static str,
        previous: Option<OsString>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &Path) -> Self {
            let previous = env::var_os(key);
            env::set_var(key, value);
            Self { key, previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match self.previous.take() {
                Some(value) => env::set_var(self.key, value),
                None => env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn env_override_wins() {
        let _lock = env_lock().lock().unwrap();
        let dir = TempDir::new().unwrap();
        let _guard = EnvGuard::set(ENV_CONFIG_DIR, dir.path());

        let paths = AppPaths::discover().unwrap();
        assert_eq!(paths.config_dir(), dir.path());
        assert_eq!(paths.settings_file(), dir.path().join("settings.toml"));
    }

    #[test]
    fn empty_override_is_ignored() {
        let _lock = env_lock().lock().unwrap();
        let previous = env::var_os(ENV_CONFIG_DIR);
        env::set_var(ENV_CONFIG_DIR, "");
        assert_eq!(env_override(ENV_CONFIG_DIR), None);
        match previous {
            Some(value) => env::set_var(ENV_CONFIG_DIR, value),
            None => env::remove_var(ENV_CONFIG_DIR),
        }
    }
}
