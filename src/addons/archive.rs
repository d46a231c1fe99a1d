//! Zip extraction into an add-on directory.

use super::types::AddonError;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Extracts `archive` into `dest`, overwriting existing files.
///
/// The parent of `dest` (the add-on root) must already exist; `dest` itself
/// is created. Cancellation is checked between entries. Blocking; run it on
/// a blocking worker.
pub fn unpack(archive: &Path, dest: &Path, cancel: &CancellationToken) -> Result<usize, AddonError> {
    let root = dest.parent().unwrap_or(dest);
    if !root.is_dir() {
        return Err(AddonError::RootUnavailable(root.to_path_buf()));
    }

    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;

    fs::create_dir_all(dest)?;

    let mut written = 0;
    for i in 0..zip.len() {
        if cancel.is_cancelled() {
            return Err(AddonError::Cancelled);
        }

        let mut entry = zip.by_index(i)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| AddonError::UnsafeEntry(entry.name().to_string()))?;
        let outpath = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&outpath)?;
        io::copy(&mut entry, &mut outfile)?;
        written += 1;
    }

    debug!("[ADDON-ARCHIVE] Extracted {} file(s) into {}", written, dest.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(data).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_unpack_tree() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("a.zip");
        write_zip(
            &archive,
            &[("textures/", b""), ("textures/moon.jpg", b"jpg"), ("moon.ssc", b"Moon {}")],
        );

        let dest = tmp.path().join("moon");
        let count = unpack(&archive, &dest, &CancellationToken::new()).unwrap();

        assert_eq!(count, 2);
        assert_eq!(fs::read(dest.join("textures/moon.jpg")).unwrap(), b"jpg");
        assert_eq!(fs::read_to_string(dest.join("moon.ssc")).unwrap(), "Moon {}");
    }

    #[test]
    fn test_unpack_overwrites() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("a.zip");
        write_zip(&archive, &[("data.txt", b"new")]);

        let dest = tmp.path().join("item");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("data.txt"), "old old old").unwrap();
        fs::write(dest.join("extra.txt"), "kept").unwrap();

        unpack(&archive, &dest, &CancellationToken::new()).unwrap();
        assert_eq!(fs::read_to_string(dest.join("data.txt")).unwrap(), "new");
        assert!(dest.join("extra.txt").exists());
    }

    #[test]
    fn test_corrupt_archive() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("bad.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let result = unpack(&archive, &tmp.path().join("x"), &CancellationToken::new());
        assert!(matches!(result, Err(AddonError::Archive(_))));
    }

    #[test]
    fn test_missing_root() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("a.zip");
        write_zip(&archive, &[("f", b"1")]);

        let dest = tmp.path().join("no-root").join("x");
        let result = unpack(&archive, &dest, &CancellationToken::new());
        assert!(matches!(result, Err(AddonError::RootUnavailable(_))));
        assert!(!dest.exists());
    }

    #[test]
    fn test_cancelled_before_first_entry() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("a.zip");
        write_zip(&archive, &[("f", b"1")]);

        let token = CancellationToken::new();
        token.cancel();
        let result = unpack(&archive, &tmp.path().join("x"), &token);
        assert!(matches!(result, Err(AddonError::Cancelled)));
    }
}
