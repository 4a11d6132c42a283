const CONFIG_DIR: &str = ".fleetcast";
const CONFIG_FILE: &str = "config.env";

pub fn load_env() {
    // Load .env from current directory first (highest priority)
    let _ = dotenv::dotenv();

    // Load ~/.fleetcast/config.env as defaults (won't overwrite existing)
    if let Ok(home) = std::env::var("HOME") {
        let config_path = format!("{}/{}/{}", home, CONFIG_DIR, CONFIG_FILE);
        let _ = dotenv::from_filename(config_path);
    }
}

pub fn load_env_from_paths(local_env: &std::path::Path, default_config: &std::path::Path) {
    let _ = dotenv::from_filename(local_env);
    let _ = dotenv::from_filename(default_config);
}

pub fn config_dir() -> String {
    if let Ok(home) = std::env::var("HOME") {
        format!("{}/{}", home, CONFIG_DIR)
    } else {
        CONFIG_DIR.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn local_env_takes_priority_over_default_config() {
        let temp_dir = std::env::temp_dir().join(format!("fleetcast_env_test_{}", std::process::id()));
        std::fs::create_dir_all(&temp_dir).unwrap();

        let local_env_path = temp_dir.join(".env");
        let default_config_path = temp_dir.join("config.env");

        let mut local_env = std::fs::File::create(&local_env_path).unwrap();
        writeln!(local_env, "FLEETCAST_PRIORITY_VAR=from_local_env").unwrap();
        writeln!(local_env, "FLEETCAST_LOCAL_ONLY=local_value").unwrap();

        let mut default_config = std::fs::File::create(&default_config_path).unwrap();
        writeln!(default_config, "FLEETCAST_PRIORITY_VAR=from_default_config").unwrap();
        writeln!(default_config, "FLEETCAST_DEFAULT_ONLY=default_value").unwrap();

        load_env_from_paths(&local_env_path, &default_config_path);

        assert_eq!(
            std::env::var("FLEETCAST_PRIORITY_VAR").unwrap(),
            "from_local_env",
            "local .env should take priority over default config"
        );
        assert_eq!(std::env::var("FLEETCAST_LOCAL_ONLY").unwrap(), "local_value");
        assert_eq!(std::env::var("FLEETCAST_DEFAULT_ONLY").unwrap(), "default_value");

        let _ = std::fs::remove_dir_all(&temp_dir);
    }
}
