//! Read, compute, apply-if-different for system files.
//!
//! Every file-mutating step goes through [`apply`]: it reads the current
//! contents, asks the step what change it wants, and touches the file only
//! when that change is not a no-op.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use crate::error::{ProvisionError, Result};

/// Desired change to a file, computed from its current contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Leave the file alone.
    Keep,
    /// Add text to the end; existing bytes are never rewritten.
    Append(String),
    /// Replace the whole file.
    Replace(String),
}

/// What [`apply`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Created,
    Updated,
}

impl Outcome {
    pub fn changed(self) -> bool {
        self != Outcome::Unchanged
    }
}

/// Reconcile `path` against the change `desired` computes.
///
/// `desired` receives `None` when the file does not exist. A `Replace`
/// whose content equals what is already on disk is treated as `Keep`.
/// When `mode` is given it is applied on the open handle after every write.
///
/// A symlink at `path` is never followed. It reads as absent, a `Replace`
/// swaps the link itself for a regular file, and an `Append` is refused.
pub fn apply<F>(path: &Path, mode: Option<u32>, desired: F) -> Result<Outcome>
where
    F: FnOnce(Option<&str>) -> Result<Change>,
{
    let existing = match fs::symlink_metadata(path) {
        Ok(meta) => Some(meta),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(ProvisionError::io(path, e)),
    };
    let link = existing.as_ref().is_some_and(|m| m.file_type().is_symlink());

    let current = match &existing {
        Some(_) if !link => Some(read_regular(path).map_err(|e| ProvisionError::io(path, e))?),
        _ => None,
    };

    let change = desired(current.as_deref())?;
    let written = if existing.is_some() {
        Outcome::Updated
    } else {
        Outcome::Created
    };

    let outcome = match change {
        Change::Keep => Outcome::Unchanged,
        Change::Replace(content) if current.as_deref() == Some(content.as_str()) => {
            Outcome::Unchanged
        }
        Change::Replace(content) => {
            ensure_parent(path)?;
            let mode = mode.or_else(|| {
                existing
                    .as_ref()
                    .filter(|_| !link)
                    .map(|m| m.permissions().mode() & 0o7777)
            });
            replace_file(path, content.as_bytes(), mode)
                .map_err(|e| ProvisionError::io(path, e))?;
            if link {
                tracing::warn!(path = %path.display(), "replaced symlink with a regular file");
            }
            written
        }
        Change::Append(text) if text.is_empty() => Outcome::Unchanged,
        Change::Append(_) if link => {
            return Err(ProvisionError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "refusing to append through a symlink"),
            ));
        }
        Change::Append(text) => {
            ensure_parent(path)?;
            append_file(path, text.as_bytes(), mode).map_err(|e| ProvisionError::io(path, e))?;
            written
        }
    };

    if let (Outcome::Unchanged, Some(mode), Some(_)) = (outcome, mode, &current) {
        open_nofollow(path, fs::OpenOptions::new().read(true))
            .and_then(|file| file.set_permissions(fs::Permissions::from_mode(mode)))
            .map_err(|e| ProvisionError::io(path, e))?;
    }

    tracing::debug!(path = %path.display(), ?outcome, "reconciled");
    Ok(outcome)
}

fn open_nofollow(path: &Path, opts: &mut fs::OpenOptions) -> io::Result<File> {
    opts.custom_flags(nix::libc::O_NOFOLLOW).open(path)
}

fn read_regular(path: &Path) -> io::Result<String> {
    let mut content = String::new();
    open_nofollow(path, fs::OpenOptions::new().read(true))?.read_to_string(&mut content)?;
    Ok(content)
}

/// Write `content` to a sibling temp file and rename it over `path`.
fn replace_file(path: &Path, content: &[u8], mode: Option<u32>) -> io::Result<()> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no file name"))?;
    let mut tmp_name = OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    match fs::remove_file(&tmp) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }

    // O_EXCL refuses a link planted at the temp name between remove and open.
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode.unwrap_or(0o644))
        .open(&tmp)?;
    file.write_all(content)?;
    if let Some(mode) = mode {
        file.set_permissions(fs::Permissions::from_mode(mode))?;
    }
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)
}

fn append_file(path: &Path, text: &[u8], mode: Option<u32>) -> io::Result<()> {
    let mut file = open_nofollow(path, fs::OpenOptions::new().create(true).append(true))?;
    file.write_all(text)?;
    if let Some(mode) = mode {
        file.set_permissions(fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ProvisionError::io(parent, e))?;
    }
    Ok(())
}
