//! File fingerprints: modification time plus a full-content BLAKE3 digest.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub mtime: f64,
    pub hash: String,
}

/// Seconds since the unix epoch, as stored in the ledger.
pub fn epoch_secs(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

pub fn modified(path: &Path) -> Result<f64, FingerprintError> {
    let meta = fs::metadata(path).map_err(|e| io_err(path, e))?;
    let mtime = meta.modified().map_err(|e| io_err(path, e))?;
    Ok(epoch_secs(mtime))
}

pub fn fingerprint(path: &Path) -> Result<Fingerprint, FingerprintError> {
    let mtime = modified(path)?;
    let hash = full_hash(path).map_err(|e| io_err(path, e))?;
    Ok(Fingerprint { mtime, hash })
}

fn full_hash(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

fn io_err(path: &Path, source: std::io::Error) -> FingerprintError {
    FingerprintError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_gives_identical_hash() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a.txt");
        let b = temp.path().join("b - Copy.txt");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();

        let fa = fingerprint(&a).unwrap();
        let fb = fingerprint(&b).unwrap();
        assert_eq!(fa.hash, fb.hash);
        assert_eq!(fa.hash.len(), 64);
        assert_eq!(fa.hash, blake3::hash(b"same bytes").to_hex().to_string());
    }

    #[test]
    fn different_content_gives_different_hash() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a.txt");
        fs::write(&a, b"one").unwrap();
        let first = fingerprint(&a).unwrap();
        fs::write(&a, b"two").unwrap();
        assert_ne!(first.hash, fingerprint(&a).unwrap().hash);
    }

    #[test]
    fn mtime_matches_metadata() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a.pdf");
        fs::write(&a, b"%PDF").unwrap();
        let expected = epoch_secs(fs::metadata(&a).unwrap().modified().unwrap());
        assert_eq!(fingerprint(&a).unwrap().mtime, expected);
        assert!(expected > 0.0);
    }

    #[test]
    fn vanished_file_is_an_io_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = fingerprint(&temp.path().join("gone.txt")).unwrap_err();
        let FingerprintError::Io { path, .. } = err;
        assert!(path.ends_with("gone.txt"));
    }
}
