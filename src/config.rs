use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Caseframe";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory
/// ~/Caseframe/ on all platforms (user-visible)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Caseframe")
}

/// Default location of the SQLite database
pub fn database_path() -> PathBuf {
    app_data_dir().join("caseframe.db")
}

/// Tracing filter applied when RUST_LOG is unset
pub fn default_log_filter() -> String {
    format!("{}=info", env!("CARGO_PKG_NAME"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("Caseframe"));
    }

    #[test]
    fn database_path_under_app_data() {
        let db = database_path();
        assert!(db.starts_with(app_data_dir()));
        assert!(db.ends_with("caseframe.db"));
    }

    #[test]
    fn default_filter_names_the_crate() {
        assert_eq!(default_log_filter(), "caseframe=info");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.4.0");
    }
}
