pub mod paths;
pub mod persistence;
pub mod schema;

pub use paths::*;
pub use persistence::*;
pub use schema::*;

fn default_fs_name() -> String {
    "unitefs".to_string()
}

fn default_auto_unmount() -> bool {
    true
}

fn default_allow_other() -> bool {
    false
}

fn default_exclude() -> Vec<String> {
    vec![]
}

fn default_follow_symlinks() -> bool {
    true
}

fn default_fuse_ttl_secs() -> u64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}
