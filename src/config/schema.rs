use crate::error::{Result, UniteError};
use crate::union::BuildOptions;
use serde::{Deserialize, Serialize};

const MAX_FUSE_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MountConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_unmount: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_other: Option<bool>,
}

impl MountConfig {
    pub fn get_fs_name(&self) -> String {
        self.fs_name.clone().unwrap_or_else(super::default_fs_name)
    }

    pub fn get_auto_unmount(&self) -> bool {
        self.auto_unmount
            .unwrap_or_else(super::default_auto_unmount)
    }

    pub fn get_allow_other(&self) -> bool {
        self.allow_other.unwrap_or_else(super::default_allow_other)
    }
}

/// How source directories are walked when building the union.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BuildConfig {
    /// Glob patterns, relative to each source root, left out of the union.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_symlinks: Option<bool>,
}

impl BuildConfig {
    pub fn get_exclude(&self) -> Vec<String> {
        self.exclude.clone().unwrap_or_else(super::default_exclude)
    }

    pub fn get_follow_symlinks(&self) -> bool {
        self.follow_symlinks
            .unwrap_or_else(super::default_follow_symlinks)
    }

    /// Compile into builder options, adding `extra_exclude` to the configured
    /// patterns.
    pub fn to_build_options(&self, extra_exclude: &[String]) -> Result<BuildOptions> {
        let mut exclude = self.get_exclude();
        exclude.extend(extra_exclude.iter().cloned());
        BuildOptions::new(&exclude, self.get_follow_symlinks())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuse_ttl_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default)]
    pub mount: MountConfig,
    #[serde(default)]
    pub build: BuildConfig,
}

impl Config {
    pub fn get_fuse_ttl_secs(&self) -> u64 {
        self.fuse_ttl_secs
            .unwrap_or_else(super::default_fuse_ttl_secs)
    }

    pub fn get_log_level(&self) -> String {
        self.log_level.clone().unwrap_or_else(super::default_log_level)
    }
}

pub fn validate_config(config: &Config) -> Result<()> {
    let ttl = config.get_fuse_ttl_secs();
    if ttl > MAX_FUSE_TTL_SECS {
        return Err(UniteError::Config(format!(
            "fuse_ttl_secs ({}) exceeds the maximum of {} seconds",
            ttl, MAX_FUSE_TTL_SECS
        )));
    }

    let fs_name = config.mount.get_fs_name();
    if fs_name.is_empty() {
        return Err(UniteError::Config("mount.fs_name cannot be empty".to_string()));
    }
    if fs_name.contains(',') {
        return Err(UniteError::Config(format!(
            "mount.fs_name '{}' cannot contain ','",
            fs_name
        )));
    }

    // Surface bad globs at load time rather than at mount time
    config.build.to_build_options(&[])?;

    Ok(())
}
