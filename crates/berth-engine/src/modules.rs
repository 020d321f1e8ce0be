//! Addon module directories: ZIP upload, listing and removal

use berth_core::{Error, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// List non-hidden subdirectories of `dir`, sorted by name
pub async fn list(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(Error::validation(format!(
            "Directory not found: {}",
            dir.display()
        )));
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut modules = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        if entry.file_type().await?.is_dir() {
            modules.push(name);
        }
    }
    modules.sort();
    Ok(modules)
}

/// Extract an uploaded ZIP archive into `dir`, creating it if needed.
///
/// The archive is staged in a temporary file that is removed whether or not
/// extraction succeeds. Returns the top-level names that were extracted.
pub async fn install_archive(dir: &Path, filename: &str, data: Vec<u8>) -> Result<Vec<String>> {
    if !filename.to_lowercase().ends_with(".zip") {
        return Err(Error::validation(format!(
            "Only ZIP archives are accepted, got {}",
            filename
        )));
    }

    tokio::fs::create_dir_all(dir).await?;
    let staging = std::env::temp_dir().join(format!("berth-upload-{}.zip", uuid::Uuid::new_v4()));
    tokio::fs::write(&staging, &data).await?;
    debug!("Staged {} ({} bytes) at {}", filename, data.len(), staging.display());

    let target = dir.to_path_buf();
    let archive = staging.clone();
    let result = tokio::task::spawn_blocking(move || extract(&archive, &target))
        .await
        .map_err(|e| Error::validation(format!("Extraction task failed: {}", e)));

    if let Err(e) = tokio::fs::remove_file(&staging).await {
        warn!("Failed to remove staged upload {}: {}", staging.display(), e);
    }

    let extracted = result??;
    info!("Extracted {} into {}", filename, dir.display());
    Ok(extracted)
}

fn extract(archive_path: &Path, target: &Path) -> Result<Vec<String>> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| Error::validation(format!("Invalid ZIP archive: {}", e)))?;

    // Validate every entry before writing anything
    let mut entries: Vec<PathBuf> = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| Error::validation(format!("Invalid ZIP archive: {}", e)))?;
        let path = entry.enclosed_name().map(Path::to_path_buf).ok_or_else(|| {
            Error::validation(format!(
                "Archive entry escapes target directory: {}",
                entry.name()
            ))
        })?;
        entries.push(path);
    }

    let mut top_level = Vec::new();
    for (i, relative) in entries.iter().enumerate() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::validation(format!("Invalid ZIP archive: {}", e)))?;
        let out_path = target.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&out_path)?;
            io::copy(&mut entry, &mut out)?;
        }

        if let Some(first) = relative.components().next() {
            let name = first.as_os_str().to_string_lossy().to_string();
            if !top_level.contains(&name) {
                top_level.push(name);
            }
        }
    }
    Ok(top_level)
}

/// Remove a single file or directory directly inside `dir`
pub async fn remove(dir: &Path, name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(Error::validation(format!("Invalid module name: {}", name)));
    }

    let path = dir.join(name);
    let metadata = match tokio::fs::symlink_metadata(&path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::validation(format!(
                "Module {} not found in {}",
                name,
                dir.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    if metadata.is_dir() {
        tokio::fs::remove_dir_all(&path).await?;
    } else {
        tokio::fs::remove_file(&path).await?;
    }
    info!("Removed module {} from {}", name, dir.display());
    Ok(())
}

#[cfg(test)]
pub(crate) fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::FileOptions;

    let cursor = std::io::Cursor::new(Vec::new());
    let mut zip = zip::ZipWriter::new(cursor);
    for (name, content) in entries {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}
