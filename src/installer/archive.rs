//! Digest checks and zip extraction for downloaded mods

use crate::error::InstallerError;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::Path;

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Check `bytes` against the expected digest. An empty expectation passes.
pub fn verify_sha256(name: &str, bytes: &[u8], expected: &str) -> Result<(), InstallerError> {
    if expected.is_empty() {
        tracing::warn!("No digest published for {}, skipping verification", name);
        return Ok(());
    }

    let actual = sha256_hex(bytes);
    if actual != expected.to_lowercase() {
        return Err(InstallerError::HashMismatch {
            name: name.to_string(),
            expected: expected.to_lowercase(),
            actual,
        });
    }
    Ok(())
}

/// Extract an in-memory ZIP archive into `dest`, returning the number of files written
pub fn extract_zip(bytes: &[u8], dest: &Path) -> Result<usize> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).context("Failed to read ZIP archive")?;
    std::fs::create_dir_all(dest)?;

    let mut written = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let relative = sanitize_path(entry.name());
        if relative.is_empty() {
            continue;
        }
        let outpath = dest.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = std::fs::File::create(&outpath)
                .with_context(|| format!("Failed to create {}", outpath.display()))?;
            std::io::copy(&mut entry, &mut outfile)?;
            written += 1;
        }
    }

    Ok(written)
}

/// Make an archive entry name safe to join onto the destination
fn sanitize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect::<Vec<_>>()
        .join("/")
}
