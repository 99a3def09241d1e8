use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub workspace_dir: PathBuf,
    // Directory scanned for `<file_prefix>*.txt` sources
    pub database_dir: PathBuf,
    pub file_prefix: String,
    pub publish_endpoint: String,
    pub subscribe_endpoint: String,
    pub topic_filter: String,
    pub poll_interval_secs: f64,
    pub connect_grace_secs: f64,
    // Per-peer queue bounds on the transport.
    pub send_hwm: usize,
    pub recv_hwm: usize,
    pub recv_idle_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let base_dir = dirs::home_dir()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let workspace_dir = base_dir.join(".roster");

        Self {
            workspace_dir,
            database_dir: PathBuf::from("../database"),
            file_prefix: "student_file_".to_string(),
            publish_endpoint: "tcp://*:5556".to_string(),
            subscribe_endpoint: "tcp://localhost:5556".to_string(),
            topic_filter: String::new(),
            poll_interval_secs: 2.0,
            connect_grace_secs: 5.0,
            send_hwm: 1000,
            recv_hwm: 1000,
            recv_idle_ms: 10,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let workspace_dir = Self::default().workspace_dir;
        let config_path = workspace_dir.join("config.toml");

        let mut builder = Config::builder()
            .set_default("workspace_dir", workspace_dir.to_string_lossy().as_ref())?
            .set_default("database_dir", "../database")?
            .set_default("file_prefix", "student_file_")?
            .set_default("publish_endpoint", "tcp://*:5556")?
            .set_default("subscribe_endpoint", "tcp://localhost:5556")?
            .set_default("topic_filter", "")?
            .set_default("poll_interval_secs", 2.0)?
            .set_default("connect_grace_secs", 5.0)?
            .set_default("send_hwm", 1000)?
            .set_default("recv_hwm", 1000)?
            .set_default("recv_idle_ms", 10)?;

        if config_path.exists() {
            builder = builder.add_source(File::from(config_path));
        }

        builder = builder.add_source(Environment::with_prefix("ROSTER"));

        let config = builder.build()?;
        let app_config: AppConfig = config.try_deserialize()?;
        Ok(app_config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs.max(0.0))
    }

    pub fn connect_grace(&self) -> Duration {
        Duration::from_secs_f64(self.connect_grace_secs.max(0.0))
    }

    pub fn recv_idle(&self) -> Duration {
        Duration::from_millis(self.recv_idle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        fs,
        sync::{Mutex, OnceLock},
    };

    fn set_env(key: &str, val: impl AsRef<std::ffi::OsStr>) {
        unsafe { std::env::set_var(key, val) };
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let guard = LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned");
        let result = f();
        drop(guard);
        result
    }

    #[test]
    fn default_values_match_expected_profile() {
        with_env_lock(|| {
            let cfg = AppConfig::default();
            assert!(cfg.workspace_dir.ends_with(".roster"));
            assert_eq!(cfg.file_prefix, "student_file_");
            assert_eq!(cfg.publish_endpoint, "tcp://*:5556");
            assert_eq!(cfg.subscribe_endpoint, "tcp://localhost:5556");
            assert!(cfg.topic_filter.is_empty());
            assert_eq!(cfg.poll_interval(), Duration::from_secs(2));
            assert_eq!(cfg.connect_grace(), Duration::from_secs(5));
            assert_eq!(cfg.send_hwm, 1000);
            assert_eq!(cfg.recv_hwm, 1000);
            assert_eq!(cfg.recv_idle(), Duration::from_millis(10));
        });
    }

    #[test]
    fn load_merges_config_file_and_environment_overrides() {
        with_env_lock(|| {
            use tempfile::tempdir;

            let saved_home = std::env::var_os("HOME");
            let dir = tempdir().expect("tempdir");
            set_env("HOME", dir.path());

            let workspace_dir = dir.path().join(".roster");
            fs::create_dir_all(&workspace_dir).expect("create workspace");
            let config_contents =
                format!("workspace_dir = \"{}\"\n", workspace_dir.to_string_lossy())
                    + "database_dir = \"/srv/roster\"\n"
                    + "publish_endpoint = \"tcp://*:7000\"\n"
                    + "poll_interval_secs = 0.5\n"
                    + "send_hwm = 10\n";
            fs::write(workspace_dir.join("config.toml"), config_contents).expect("write config");

            // Environment vars override the file.
            set_env("ROSTER_SEND_HWM", "20");
            set_env("ROSTER_FILE_PREFIX", "group_");

            let cfg = AppConfig::load().expect("load config");

            assert_eq!(cfg.workspace_dir, workspace_dir);
            assert_eq!(cfg.database_dir, PathBuf::from("/srv/roster"));
            assert_eq!(cfg.publish_endpoint, "tcp://*:7000");
            assert_eq!(cfg.poll_interval(), Duration::from_millis(500));
            assert_eq!(cfg.send_hwm, 20, "env override should win");
            assert_eq!(cfg.file_prefix, "group_");
            assert_eq!(cfg.recv_hwm, 1000);

            remove_env("ROSTER_SEND_HWM");
            remove_env("ROSTER_FILE_PREFIX");

            match saved_home {
                Some(val) => set_env("HOME", val),
                None => remove_env("HOME"),
            }
        });
    }
}
