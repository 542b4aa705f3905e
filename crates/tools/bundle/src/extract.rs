//! Bundle archive extraction.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use codeql_init_core::{Error, Result};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tar::Archive;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Whether `path` names a gzipped tarball.
#[must_use]
pub fn is_tar_gz(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(".tar.gz") || name.ends_with(".tgz"))
}

/// Extract a `.tar.gz` archive into `dest`.
///
/// Unpacks into a sibling temp directory first, so a failure partway
/// through leaves nothing at `dest`.
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let temp_dir = dest.with_file_name(format!(
        ".{}.extracting",
        dest.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("bundle")
    ));
    if temp_dir.exists() {
        std::fs::remove_dir_all(&temp_dir)?;
    }
    std::fs::create_dir_all(&temp_dir)?;

    let unpacked = File::open(archive).map_err(Error::from).and_then(|file| {
        Archive::new(GzDecoder::new(BufReader::new(file)))
            .unpack(&temp_dir)
            .map_err(|e| {
                Error::infrastructure(format!(
                    "Failed to extract {}: {e}",
                    archive.display()
                ))
            })
    });
    if let Err(e) = unpacked {
        let _ = std::fs::remove_dir_all(&temp_dir);
        return Err(e);
    }

    if dest.exists() {
        std::fs::remove_dir_all(dest)?;
    }
    std::fs::rename(&temp_dir, dest)?;
    debug!(archive = %archive.display(), dest = %dest.display(), "Extracted bundle");
    Ok(())
}

/// Compute SHA256 hash of a file.
pub async fn compute_file_sha256(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    fn write_archive(path: &Path) {
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let contents = b"#!/bin/sh\necho codeql\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, "codeql/codeql", &contents[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_is_tar_gz() {
        assert!(is_tar_gz(Path::new("/tmp/codeql-bundle.tar.gz")));
        assert!(is_tar_gz(Path::new("bundle.tgz")));
        assert!(!is_tar_gz(Path::new("bundle.zip")));
        assert!(!is_tar_gz(Path::new("/")));
    }

    #[test]
    fn test_extract_tar_gz() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("codeql-bundle.tar.gz");
        write_archive(&archive);

        let dest = temp.path().join("out");
        extract_tar_gz(&archive, &dest).unwrap();
        assert!(dest.join("codeql").join("codeql").is_file());
        assert!(!temp.path().join(".out.extracting").exists());
    }

    #[test]
    fn test_extract_corrupt_archive_leaves_nothing() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.tar.gz");
        std::fs::write(&archive, b"not an archive").unwrap();

        let dest = temp.path().join("out");
        assert!(extract_tar_gz(&archive, &dest).is_err());
        assert!(!dest.exists());
        assert!(!temp.path().join(".out.extracting").exists());
    }

    #[tokio::test]
    async fn test_compute_file_sha256() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(
            compute_file_sha256(&path).await.unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
