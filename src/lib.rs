pub mod config;
pub mod error;
pub mod union;

pub use config::expand_tilde;
pub use config::get_config_path;
pub use config::load_config;
pub use config::load_config_from;
pub use config::BuildConfig;
pub use config::Config;
pub use config::MountConfig;

pub use error::{Result, UniteError};

pub use union::display::format_tree;
pub use union::{
    mount_union, BuildOptions, DirEntry, HandleTable, InodeAllocator, Node, SubtreeBuilder,
    Tree, UnionService, UnionTree, UniteFs, ROOT_INODE,
};
