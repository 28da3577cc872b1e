//! Host side file moves used by export, init and update

use std::path::{Path, PathBuf};

use stacked_errors::StackableErr;
use tokio::fs;
use tracing::{debug, info};

use crate::{ErisError, Result};

fn fs_err<T>(res: std::io::Result<T>, ctx: impl FnOnce() -> String) -> Result<T> {
    res.stack_err_with(ctx).map_err(ErisError::FilesystemFailure)
}

/// Copies a file, symlink, or directory tree from `src` to `dest`. Existing
/// files at the destination are overwritten and existing directories merged.
pub async fn copy_recursive(src: &Path, dest: &Path) -> Result<()> {
    let mut stack: Vec<(PathBuf, PathBuf)> = vec![(src.to_owned(), dest.to_owned())];
    while let Some((src, dest)) = stack.pop() {
        let meta = fs_err(fs::symlink_metadata(&src).await, || {
            format!("copy_recursive -> metadata of {src:?}")
        })?;
        if meta.is_dir() {
            fs_err(fs::create_dir_all(&dest).await, || {
                format!("copy_recursive -> creating {dest:?}")
            })?;
            let mut entries = fs_err(fs::read_dir(&src).await, || {
                format!("copy_recursive -> reading {src:?}")
            })?;
            while let Some(entry) = fs_err(entries.next_entry().await, || {
                format!("copy_recursive -> reading {src:?}")
            })? {
                stack.push((entry.path(), dest.join(entry.file_name())));
            }
        } else if meta.file_type().is_symlink() {
            let target = fs_err(fs::read_link(&src).await, || {
                format!("copy_recursive -> reading link {src:?}")
            })?;
            let _ = fs::remove_file(&dest).await;
            fs_err(fs::symlink(&target, &dest).await, || {
                format!("copy_recursive -> linking {dest:?}")
            })?;
        } else {
            fs_err(fs::copy(&src, &dest).await, || {
                format!("copy_recursive -> copying {src:?} to {dest:?}")
            })?;
        }
    }
    Ok(())
}

/// Removes a file or a directory tree
pub async fn remove_all(path: &Path) -> Result<()> {
    let meta = fs_err(fs::symlink_metadata(path).await, || {
        format!("remove_all -> metadata of {path:?}")
    })?;
    if meta.is_dir() {
        fs_err(fs::remove_dir_all(path).await, || {
            format!("remove_all(path: {path:?})")
        })
    } else {
        fs_err(fs::remove_file(path).await, || {
            format!("remove_all(path: {path:?})")
        })
    }
}

/// The immediate children of `dir`, sorted
pub async fn children(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs_err(fs::read_dir(dir).await, || format!("children(dir: {dir:?})"))?;
    let mut out = vec![];
    while let Some(entry) = fs_err(entries.next_entry().await, || {
        format!("children(dir: {dir:?})")
    })? {
        out.push(entry.path());
    }
    out.sort();
    Ok(out)
}

/// Moves every entry of `src` into `dest` and then removes `src`. This copies
/// and deletes instead of renaming, which also works across mounts. `dest`
/// must exist. Returns the number of moved entries, zero is not an error.
#[tracing::instrument]
pub async fn move_out_of_dir_and_rm_dir(src: &Path, dest: &Path) -> Result<usize> {
    let to_move = children(src).await?;
    if to_move.is_empty() {
        debug!("no files to move");
    }
    for f in &to_move {
        // `children` only returns paths with a file name
        let name = f.file_name().unwrap_or_default();
        copy_recursive(f, &dest.join(name)).await?;
    }
    info!(dir = ?src, "removing directory");
    fs_err(fs::remove_dir_all(src).await, || {
        format!("move_out_of_dir_and_rm_dir -> removing {src:?}")
    })?;
    Ok(to_move.len())
}

/// Moves `old` to `new`: a rename if `new` does not exist, otherwise the
/// contents of `old` are merged into `new`. Returns `false` if there was no
/// `old`.
pub async fn migrate_dir(old: &Path, new: &Path) -> Result<bool> {
    if fs::symlink_metadata(old).await.is_err() {
        return Ok(false)
    }
    info!(from = ?old, to = ?new, "migrating deprecated directory");
    if fs::symlink_metadata(new).await.is_err() {
        if fs::rename(old, new).await.is_ok() {
            return Ok(true)
        }
        fs_err(fs::create_dir_all(new).await, || {
            format!("migrate_dir -> creating {new:?}")
        })?;
    }
    move_out_of_dir_and_rm_dir(old, new).await?;
    Ok(true)
}
