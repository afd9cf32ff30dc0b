//! On-disk trust-on-first-use database
//!
//! Each pinned host gets one file in the certificate directory, named after
//! the lowercase hex djb2 hash of the host name:
//!
//! ```text
//! 2000000000
//! MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA...
//! ```
//!
//! The first line is the certificate expiration as UNIX seconds, the second
//! the base64 encoded public key. Lookups always compare the stored key
//! byte for byte, so two hosts sharing a hash show up as a key mismatch.

use super::{Result, TlsError};
use openssl::base64;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of looking a host's key up in the trust database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No usable record for the host
    Unknown,
    /// The stored key equals the presented one
    Matches,
    /// A different key is stored for the host
    Mismatch,
}

/// Store/verify interface of the pinning database
pub trait TrustDb {
    /// Pin `key` for `host`, replacing any previous record
    fn store(&self, host: &str, key: &[u8], expiration: i64) -> Result<()>;

    /// Compare `key` with the record for `host`
    fn verify(&self, host: &str, key: &[u8]) -> Result<Verdict>;
}

/// One pinned key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustRecord {
    pub expiration: i64,
    pub key: Vec<u8>,
}

impl TrustRecord {
    /// Parse the two-line file format; `None` if malformed
    pub fn parse(contents: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(contents).ok()?;
        let mut lines = text.lines();

        let expiration = lines.next()?.trim().parse().ok()?;
        let key = base64::decode_block(lines.next()?.trim()).ok()?;
        if key.is_empty() {
            return None;
        }

        Some(TrustRecord { expiration, key })
    }

    /// Render the two-line file format
    pub fn render(&self) -> String {
        format!("{}\n{}\n", self.expiration, base64::encode_block(&self.key))
    }
}

/// 32-bit djb2 string hash
pub fn djb2(s: &str) -> u32 {
    s.bytes()
        .fold(5381u32, |h, c| h.wrapping_mul(33).wrapping_add(u32::from(c)))
}

/// Trust database kept as one file per host in a directory
#[derive(Debug, Clone)]
pub struct FileTrustStore {
    dir: PathBuf,
}

impl FileTrustStore {
    /// Open the store in `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| TlsError::TrustStore {
            path: dir.clone(),
            source,
        })?;
        Ok(FileTrustStore { dir })
    }

    /// Open `$HOME/.local/share/<product>/certs`
    pub fn from_env(product: &str) -> Result<Self> {
        let home = std::env::var_os("HOME")
            .filter(|home| !home.is_empty())
            .ok_or(TlsError::NoTrustStore)?;

        Self::open(
            PathBuf::from(home)
                .join(".local")
                .join("share")
                .join(product)
                .join("certs"),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the record for `host`
    pub fn record_path(&self, host: &str) -> PathBuf {
        self.dir.join(format!("{:x}", djb2(host)))
    }

    /// Read the record for `host`
    ///
    /// Missing and unreadable records yield `None`; malformed ones are
    /// deleted first.
    pub fn load(&self, host: &str) -> Option<TrustRecord> {
        let path = self.record_path(host);

        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(host, path = %path.display(), "no pinned key");
                return None;
            }
            Err(e) => {
                warn!(host, path = %path.display(), error = %e, "unreadable trust record");
                return None;
            }
        };

        let record = TrustRecord::parse(&contents);
        if record.is_none() {
            warn!(host, path = %path.display(), "malformed trust record, removing");
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove trust record");
            }
        }
        record
    }
}

impl TrustDb for FileTrustStore {
    fn store(&self, host: &str, key: &[u8], expiration: i64) -> Result<()> {
        let path = self.record_path(host);
        let record = TrustRecord {
            expiration,
            key: key.to_vec(),
        };

        // Directory may have been removed since `open`
        fs::create_dir_all(&self.dir).map_err(|source| TlsError::TrustStore {
            path: self.dir.clone(),
            source,
        })?;
        fs::write(&path, record.render()).map_err(|source| TlsError::TrustStore {
            path: path.clone(),
            source,
        })?;

        debug!(host, path = %path.display(), expiration, "pinned key stored");
        Ok(())
    }

    fn verify(&self, host: &str, key: &[u8]) -> Result<Verdict> {
        Ok(match self.load(host) {
            None => Verdict::Unknown,
            Some(record) if record.key == key => Verdict::Matches,
            Some(_) => Verdict::Mismatch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::ffi::OsString;
    use tempfile::TempDir;

    // HOME is process wide
    static HOME_LOCK: Mutex<()> = parking_lot::const_mutex(());

    fn with_home<T>(home: Option<&Path>, f: impl FnOnce() -> T) -> T {
        let _guard = HOME_LOCK.lock();
        let saved: Option<OsString> = std::env::var_os("HOME");
        match home {
            Some(dir) => std::env::set_var("HOME", dir),
            None => std::env::remove_var("HOME"),
        }
        let result = f();
        match saved {
            Some(value) => std::env::set_var("HOME", value),
            None => std::env::remove_var("HOME"),
        }
        result
    }

    fn store() -> (TempDir, FileTrustStore) {
        let dir = TempDir::new().unwrap();
        let store = FileTrustStore::open(dir.path().join("certs")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_djb2() {
        assert_eq!(djb2(""), 5381);
        assert_eq!(djb2("a"), 0x2b606);
        assert_eq!(djb2("ab"), 0x597728);
        // Wraps rather than overflowing
        assert_eq!(djb2("terminal-server-farm.example.com"), {
            "terminal-server-farm.example.com"
                .bytes()
                .fold(5381u64, |h, c| (h * 33 + c as u64) & 0xffff_ffff) as u32
        });
    }

    #[test]
    fn test_record_path_is_lowercase_hex() {
        let (_dir, store) = store();
        assert_eq!(store.record_path("a").file_name().unwrap(), "2b606");
    }

    #[test]
    fn test_store_then_verify() {
        let (_dir, store) = store();

        assert_eq!(store.verify("farm", b"key-one").unwrap(), Verdict::Unknown);

        store.store("farm", b"key-one", 2_000_000_000).unwrap();
        assert_eq!(store.verify("farm", b"key-one").unwrap(), Verdict::Matches);
        assert_eq!(store.verify("farm", b"key-two").unwrap(), Verdict::Mismatch);
        assert_eq!(store.verify("farm", b"key-on").unwrap(), Verdict::Mismatch);
        assert_eq!(store.verify("other", b"key-one").unwrap(), Verdict::Unknown);
    }

    #[test]
    fn test_file_format() {
        let (_dir, store) = store();
        store.store("farm", b"\x01\x02\x03", 1700000000).unwrap();

        let contents = fs::read_to_string(store.record_path("farm")).unwrap();
        assert_eq!(contents, "1700000000\nAQID\n");
        assert_eq!(
            store.load("farm"),
            Some(TrustRecord {
                expiration: 1700000000,
                key: vec![1, 2, 3],
            })
        );
    }

    #[test]
    fn test_store_overwrites() {
        let (_dir, store) = store();
        store.store("farm", b"old", 1).unwrap();
        store.store("farm", b"new", 2).unwrap();

        assert_eq!(store.verify("farm", b"new").unwrap(), Verdict::Matches);
        assert_eq!(store.load("farm").unwrap().expiration, 2);
    }

    #[test]
    fn test_malformed_records_deleted() {
        let (_dir, store) = store();
        let path = store.record_path("farm");

        for contents in [
            &b"only one line\n"[..],
            b"not-a-number\nAQID\n",
            b"1700000000\n!!!not base64!!!\n",
            b"1700000000\n\n",
            b"\xff\xfe\n\xff\n",
        ] {
            fs::write(&path, contents).unwrap();
            assert_eq!(store.verify("farm", b"\x01\x02\x03").unwrap(), Verdict::Unknown);
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_open_creates_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b").join("certs");
        let store = FileTrustStore::open(&nested).unwrap();
        assert!(store.dir().is_dir());
    }

    #[test]
    fn test_open_fails_on_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("certs");
        fs::write(&file, b"").unwrap();

        let err = FileTrustStore::open(&file).unwrap_err();
        assert!(matches!(err, TlsError::TrustStore { .. }));
        assert!(err.requires_exit());
    }

    #[test]
    fn test_store_failure_is_fatal() {
        let (dir, store) = store();
        // Directory replaced by a file after opening
        fs::remove_dir_all(store.dir()).unwrap();
        fs::write(dir.path().join("certs"), b"").unwrap();

        let err = store.store("farm", b"key", 1).unwrap_err();
        assert!(matches!(err, TlsError::TrustStore { .. }));
    }

    #[test]
    fn test_store_recreates_removed_directory() {
        let (_dir, store) = store();
        fs::remove_dir_all(store.dir()).unwrap();

        store.store("farm", b"key", 1).unwrap();
        assert!(store.dir().is_dir());
        assert_eq!(store.verify("farm", b"key").unwrap(), Verdict::Matches);
    }

    #[test]
    fn test_from_env_uses_home() {
        let home = TempDir::new().unwrap();
        let store = with_home(Some(home.path()), || FileTrustStore::from_env("rdesk")).unwrap();

        let expected = home.path().join(".local/share/rdesk/certs");
        assert_eq!(store.dir(), expected.as_path());
        assert!(expected.is_dir());
    }

    #[test]
    fn test_from_env_without_home() {
        let err = with_home(None, || FileTrustStore::from_env("rdesk")).unwrap_err();
        assert!(matches!(err, TlsError::NoTrustStore));
        assert!(err.requires_exit());

        let err = with_home(Some(Path::new("")), || FileTrustStore::from_env("rdesk")).unwrap_err();
        assert!(matches!(err, TlsError::NoTrustStore));
    }
}
