use fuser::{BackgroundSession, MountOption};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::MountConfig;
use crate::error::{Result, UniteError};
use crate::union::service::UnionService;
use crate::union::UniteFs;

const MOUNT_TIMEOUT: Duration = Duration::from_millis(2000);
const MOUNT_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Mount options for a read-only union mount.
pub fn mount_options(mount: &MountConfig) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::FSName(mount.get_fs_name()),
        MountOption::Subtype("unitefs".to_string()),
        MountOption::RO,
        MountOption::DefaultPermissions,
    ];
    if mount.get_auto_unmount() {
        options.push(MountOption::AutoUnmount);
    }
    if mount.get_allow_other() {
        options.push(MountOption::AllowOther);
    }
    options
}

/// Mount the union at `mount_point` and serve it from a background thread.
///
/// The filesystem stays mounted until the returned session is dropped.
///
/// # Arguments
/// * `service` - The union to serve; it can still gain subtrees while mounted
/// * `mount_point` - Directory to mount on, created if missing
/// * `mount` - Mount options from the configuration
/// * `ttl_secs` - Cache TTL in seconds for FUSE attributes and entries
pub fn mount_union(
    service: Arc<UnionService>,
    mount_point: &Path,
    mount: &MountConfig,
    ttl_secs: u64,
) -> Result<BackgroundSession> {
    fs::create_dir_all(mount_point).map_err(|e| {
        UniteError::Config(format!(
            "Failed to create mount directory {}: {}",
            mount_point.display(),
            e
        ))
    })?;

    let fs = UniteFs::new(service, ttl_secs);
    let options = mount_options(mount);

    tracing::info!("Mounting union filesystem at {}", mount_point.display());

    let session = fuser::spawn_mount2(fs, mount_point, &options).map_err(|e| {
        tracing::error!("FUSE mount error: {}", e);
        UniteError::Fuse(format!("FUSE mount failed: {}", e))
    })?;

    // The kernel may take a moment before the mount point answers requests.
    let start = Instant::now();
    loop {
        if mount_point.is_dir() && fs::read_dir(mount_point).is_ok() {
            tracing::debug!("FUSE mount verified accessible");
            break;
        }

        if start.elapsed() >= MOUNT_TIMEOUT {
            return Err(UniteError::Fuse(
                "FUSE mount timed out - mount point not accessible after 2 seconds".to_string(),
            ));
        }

        std::thread::sleep(MOUNT_CHECK_INTERVAL);
    }

    Ok(session)
}
