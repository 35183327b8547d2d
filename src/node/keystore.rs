//! Persisted secrets and settings
//!
//! The keystore predates the node: it is read before construction to pick
//! the network, chain backend and seed. Records live in a single versioned
//! JSON document written atomically with owner-only permissions.

use super::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Current on-disk keystore schema
pub const KEYSTORE_VERSION: u32 = 1;

/// Keystore file name inside the application data directory
pub const KEYSTORE_FILE: &str = "keystore.json";

/// The seed backup record
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupInfo {
    pub mnemonic: String,
}

impl BackupInfo {
    pub fn new(mnemonic: impl Into<String>) -> Self {
        Self {
            mnemonic: mnemonic.into(),
        }
    }
}

// Never print the seed phrase in logs or panics
impl std::fmt::Debug for BackupInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupInfo")
            .field("mnemonic", &"<redacted>")
            .finish()
    }
}

/// Storage for the network choice, chain backend URL and seed backup
pub trait KeyStore: Send + Sync {
    fn get_network(&self) -> Result<Option<String>, StorageError>;
    fn save_network(&self, network: &str) -> Result<(), StorageError>;

    fn get_esplora_url(&self) -> Result<Option<String>, StorageError>;
    fn save_esplora_url(&self, url: &str) -> Result<(), StorageError>;

    /// Fails with `StorageError::NotFound` when no backup exists
    fn get_backup_info(&self) -> Result<BackupInfo, StorageError>;
    fn save_backup_info(&self, backup: &BackupInfo) -> Result<(), StorageError>;
    fn delete_backup_info(&self) -> Result<(), StorageError>;

    /// Remove every record
    fn delete_all(&self) -> Result<(), StorageError>;
}

/// Keystore document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct KeyRecords {
    #[serde(default)]
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    esplora_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backup_info: Option<BackupInfo>,
}

impl KeyRecords {
    fn backup_info(&self) -> Result<BackupInfo, StorageError> {
        self.backup_info
            .clone()
            .ok_or(StorageError::NotFound("backup info"))
    }
}

/// Keystore persisted as a JSON file
#[derive(Debug)]
pub struct FileKeyStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl FileKeyStore {
    /// Open (or lazily create) the keystore at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Keystore in the default application data directory
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(KEYSTORE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load(&self) -> Result<KeyRecords, StorageError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(KeyRecords::default())
            }
            Err(e) => return Err(e.into()),
        };

        let records: KeyRecords = serde_json::from_str(&contents)?;
        if records.version > KEYSTORE_VERSION {
            return Err(StorageError::UnsupportedVersion(records.version));
        }
        Ok(records)
    }

    fn store(&self, records: &KeyRecords) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut records = records.clone();
        records.version = KEYSTORE_VERSION;
        let contents = serde_json::to_string_pretty(&records)?;

        // Write to a sibling file and rename so a crash never leaves a torn keystore
        let tmp = self.tmp_path();
        let written =
            write_private(&tmp, contents.as_bytes()).and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    fn update<F>(&self, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut KeyRecords),
    {
        let _guard = self.guard();
        let mut records = self.load()?;
        f(&mut records);
        self.store(&records)
    }
}

/// Create (or truncate) `path` readable by the owner only, then write it
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    // The creation mode does not apply to a file left over from a crash
    restrict_permissions(&file)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}

impl KeyStore for FileKeyStore {
    fn get_network(&self) -> Result<Option<String>, StorageError> {
        let _guard = self.guard();
        Ok(self.load()?.network)
    }

    fn save_network(&self, network: &str) -> Result<(), StorageError> {
        self.update(|r| r.network = Some(network.to_string()))?;
        log::info!("Network {} saved to keystore", network);
        Ok(())
    }

    fn get_esplora_url(&self) -> Result<Option<String>, StorageError> {
        let _guard = self.guard();
        Ok(self.load()?.esplora_url)
    }

    fn save_esplora_url(&self, url: &str) -> Result<(), StorageError> {
        self.update(|r| r.esplora_url = Some(url.to_string()))?;
        log::info!("Esplora URL {} saved to keystore", url);
        Ok(())
    }

    fn get_backup_info(&self) -> Result<BackupInfo, StorageError> {
        let _guard = self.guard();
        self.load()?.backup_info()
    }

    fn save_backup_info(&self, backup: &BackupInfo) -> Result<(), StorageError> {
        self.update(|r| r.backup_info = Some(backup.clone()))?;
        log::info!("Backup info saved to {}", self.path.display());
        Ok(())
    }

    fn delete_backup_info(&self) -> Result<(), StorageError> {
        self.update(|r| r.backup_info = None)?;
        log::warn!("Backup info deleted from {}", self.path.display());
        Ok(())
    }

    fn delete_all(&self) -> Result<(), StorageError> {
        let _guard = self.guard();
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::warn!("Keystore {} deleted", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Volatile keystore, for tests and ephemeral nodes
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    records: Mutex<KeyRecords>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, KeyRecords> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyStore for MemoryKeyStore {
    fn get_network(&self) -> Result<Option<String>, StorageError> {
        Ok(self.records().network.clone())
    }

    fn save_network(&self, network: &str) -> Result<(), StorageError> {
        self.records().network = Some(network.to_string());
        Ok(())
    }

    fn get_esplora_url(&self) -> Result<Option<String>, StorageError> {
        Ok(self.records().esplora_url.clone())
    }

    fn save_esplora_url(&self, url: &str) -> Result<(), StorageError> {
        self.records().esplora_url = Some(url.to_string());
        Ok(())
    }

    fn get_backup_info(&self) -> Result<BackupInfo, StorageError> {
        self.records().backup_info()
    }

    fn save_backup_info(&self, backup: &BackupInfo) -> Result<(), StorageError> {
        self.records().backup_info = Some(backup.clone());
        Ok(())
    }

    fn delete_backup_info(&self) -> Result<(), StorageError> {
        self.records().backup_info = None;
        Ok(())
    }

    fn delete_all(&self) -> Result<(), StorageError> {
        *self.records() = KeyRecords::default();
        Ok(())
    }
}
