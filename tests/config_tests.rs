use std::fs;
use unitefs::{load_config, load_config_from, UniteError};

#[test]
fn test_load_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
fuse_ttl_secs = 5

[mount]
fs_name = "library"
auto_unmount = false

[build]
exclude = ["*.bak"]
"#,
    )
    .unwrap();

    let config = load_config_from(&path).expect("Failed to load config");
    assert_eq!(config.get_fuse_ttl_secs(), 5);
    assert_eq!(config.mount.get_fs_name(), "library");
    assert!(!config.mount.get_auto_unmount());
    assert!(!config.mount.get_allow_other());

    let options = config.build.to_build_options(&[".git".to_string()]).unwrap();
    assert!(options.is_excluded(std::path::Path::new("notes.bak")));
    assert!(options.is_excluded(std::path::Path::new(".git")));
    assert!(!options.is_excluded(std::path::Path::new("notes.txt")));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[mount]\nfs_name = \"\"\n").unwrap();

    assert!(matches!(load_config_from(&path), Err(UniteError::Config(_))));
}

#[test]
fn test_missing_config_uses_defaults_without_creating_it() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("unitefs");
    std::env::set_var("UNITEFS_CONFIG_DIR", &config_dir);

    let config = load_config().expect("Failed to load default config");
    assert_eq!(config.get_fuse_ttl_secs(), 1);
    assert_eq!(config.mount.get_fs_name(), "unitefs");
    assert!(config.mount.get_auto_unmount());
    assert!(config.build.get_follow_symlinks());
    assert!(!config_dir.join("config.toml").exists());
}
