//! Packaging of the build context and its upload to object storage.

use std::{fs, path::Path};

use log::{debug, info};

use crate::{aws::AwsCli, buildspec::SourceLocator, process, temp_path, Result};

/// Returns a fresh object key under the project's prefix. Every deployment uploads to its own key so a running
/// execution never sees its source replaced.
pub fn object_key(project: &str) -> String {
    format!("sources/{project}/{}.zip", temp_path::random_token(16))
}

/// Zips the contents of `dir` into a temporary file and returns its path. Requires the `zip` command.
pub fn package(dir: &Path) -> Result<std::path::PathBuf> {
    if !dir.is_dir() {
        return Err(format!("build context {} is not a directory", dir.display()).into());
    }
    let archive = temp_path::tmp_path(".zip");
    debug!("packaging {} into {}", dir.display(), archive.display());
    process::command!("zip", "-r", "-q", "-X", &archive, ".")
        .current_dir(dir)
        .output()?;
    Ok(archive)
}

/// Packages `dir`, hands the archive to `f` and removes the archive afterwards, whether `f` succeeded or not.
fn with_package<T>(dir: &Path, f: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
    let archive = package(dir)?;
    let result = f(&archive);
    if let Err(error) = fs::remove_file(&archive) {
        debug!("failed to remove {}: {error}", archive.display());
    }
    result
}

/// Packages `dir` and uploads it to `target`.
pub fn upload(aws: &AwsCli, dir: &Path, target: &SourceLocator) -> Result<()> {
    with_package(dir, |archive| {
        info!("uploading build context to s3://{target}...");
        aws.upload(archive, target)
    })
}
