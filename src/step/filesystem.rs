//! Install tree creation and ownership.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use crate::context::{Identity, InstallationContext};
use crate::error::{ProvisionError, Result};

/// Create the install tree and hand it to the operator.
///
/// Creates the install root, `src/`, `logs/`, the unit staging directory
/// and the share mount point, then chowns the install root recursively.
/// The mount point is chowned too unless a share is already mounted on it.
/// Existing directories are fine.
pub fn provision_dirs(ctx: &InstallationContext) -> Result<()> {
    let dirs = [
        &ctx.root,
        &ctx.src_dir,
        &ctx.log_dir,
        &ctx.unit_staging_dir,
        &ctx.mount_point,
    ];
    for dir in dirs {
        fs::create_dir_all(dir).map_err(|e| ProvisionError::io(dir, e))?;
    }

    let owned = chown_tree(&ctx.root, &ctx.identity)?;
    println!(
        "  {} owned by {} ({} entries)",
        ctx.root.display(),
        ctx.identity.name,
        owned
    );

    if is_mounted(&ctx.mount_point)? {
        println!(
            "  [SKIP] {} already has a filesystem mounted",
            ctx.mount_point.display()
        );
    } else {
        chown_tree(&ctx.mount_point, &ctx.identity)?;
        println!("  {} owned by {}", ctx.mount_point.display(), ctx.identity.name);
    }
    Ok(())
}

/// Give a single file to the operator.
pub fn set_owner(path: &Path, identity: &Identity) -> Result<()> {
    std::os::unix::fs::lchown(path, Some(identity.uid), Some(identity.gid))
        .map_err(|e| ProvisionError::io(path, e))
}

/// Recursively chown `root` without following symlinks.
///
/// Stays on the filesystem `root` itself lives on, so a mount below it is
/// left alone. Returns the number of entries chowned.
pub fn chown_tree(root: &Path, identity: &Identity) -> Result<usize> {
    let device = tree_device(root)?;
    walk(root, device, identity).map_err(|e| ProvisionError::io(root, e))
}

/// Device the walk stays on: the one `root` lives on, even if `root` is
/// itself a mount point.
fn tree_device(root: &Path) -> Result<u64> {
    fs::symlink_metadata(root)
        .map(|m| m.dev())
        .map_err(|e| ProvisionError::io(root, e))
}

/// Whether `path` sits on a different filesystem than its parent.
fn is_mounted(path: &Path) -> Result<bool> {
    let Some(parent) = path.parent() else {
        return Ok(false);
    };
    let dev = |p: &Path| {
        fs::symlink_metadata(p)
            .map(|m| m.dev())
            .map_err(|e| ProvisionError::io(p, e))
    };
    Ok(dev(path)? != dev(parent)?)
}

fn walk(path: &Path, device: u64, identity: &Identity) -> io::Result<usize> {
    let meta = fs::symlink_metadata(path)?;
    if meta.dev() != device {
        tracing::info!(path = %path.display(), "skipping foreign filesystem");
        return Ok(0);
    }

    std::os::unix::fs::lchown(path, Some(identity.uid), Some(identity.gid))?;
    let mut count = 1;

    if meta.is_dir() {
        for entry in fs::read_dir(path)? {
            count += walk(&entry?.path(), device, identity)?;
        }
    }

    Ok(count)
}
