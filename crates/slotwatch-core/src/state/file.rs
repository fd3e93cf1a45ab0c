// # File State Store
//
// Keeps the watch-list, monitor switch and display preferences in one JSON
// document so they survive daemon restarts.
//
// ## Durability
//
// - Every mutation rewrites the document through a `.tmp` sibling and a rename
// - The previous document is copied to `.bak` before each rename
// - A main file that fails to parse is replaced by the `.bak` copy on open
// - With neither usable, the store opens empty
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "values": {
//     "monitor": 1,
//     "interval": 5,
//     "storeRecords": [
//       { "locationId": "123", "selected": true, "distanceHint": 1.2, "displayInfo": { ... } }
//     ]
//   }
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error, info, trace, warn};

use crate::Error;
use crate::traits::state_store::StateStore;

/// Document version written to disk
const FORMAT_VERSION: &str = "1.0";

type Values = BTreeMap<String, Value>;

/// JSON file backed state store
///
/// Every mutation is written through to disk before the call returns.
///
/// # Example
///
/// ```rust,no_run
/// use slotwatch_core::state::FileStateStore;
/// use slotwatch_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/slotwatch/state.json").await?;
///
///     store.save("interval", serde_json::json!(10)).await?;
///     assert_eq!(store.load("interval").await?, Some(serde_json::json!(10)));
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    state: RwLock<Document>,
}

#[derive(Debug)]
struct Document {
    values: Values,
    dirty: bool,
}

#[derive(Serialize, Deserialize)]
struct OnDisk {
    version: String,
    values: Values,
}

/// Why a document could not be opened
enum OpenError {
    /// The file exists but reading it failed
    Io(Error),
    /// The file was read but is not a state document
    Malformed(Error),
}

/// Persistence error for an I/O failure on `path`
fn io_error(action: &str, path: &Path, e: std::io::Error) -> Error {
    Error::persistence(format!("Failed to {} {}: {}", action, path.display(), e))
}

impl FileStateStore {
    /// Open the store at `path`, creating parent directories as needed
    ///
    /// A missing file opens an empty store. A malformed file is replaced by
    /// its backup when one parses.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error("create state directory", parent, e))?;
            }
        }

        let values = Self::open(&path).await?;

        Ok(Self {
            path,
            state: RwLock::new(Document {
                values,
                dirty: false,
            }),
        })
    }

    async fn open(path: &Path) -> Result<Values, Error> {
        let malformed = match Self::read(path).await {
            Ok(values) => {
                debug!("Opened state file with {} key(s)", values.len());
                return Ok(values);
            }
            Err(OpenError::Io(e)) => return Err(e),
            Err(OpenError::Malformed(e)) => e,
        };

        warn!("{}; trying backup", malformed);

        let backup = Self::backup_path(path);
        if !backup.exists() {
            warn!("No backup at {}, starting empty", backup.display());
            return Ok(Values::new());
        }

        match Self::read(&backup).await {
            Ok(values) => {
                info!("Recovered {} key(s) from {}", values.len(), backup.display());
                if let Err(e) = fs::copy(&backup, path).await {
                    error!("{}", io_error("restore backup over", path, e));
                }
                Ok(values)
            }
            Err(OpenError::Io(e) | OpenError::Malformed(e)) => {
                error!("Backup unusable too ({}), starting empty", e);
                Ok(Values::new())
            }
        }
    }

    async fn read(path: &Path) -> Result<Values, OpenError> {
        if !path.exists() {
            debug!("No state file at {}", path.display());
            return Ok(Values::new());
        }

        let text = fs::read_to_string(path)
            .await
            .map_err(|e| OpenError::Io(io_error("read state file", path, e)))?;

        let document: OnDisk = serde_json::from_str(&text).map_err(|e| {
            OpenError::Malformed(Error::persistence(format!(
                "State file {} is malformed: {}",
                path.display(),
                e
            )))
        })?;

        if document.version != FORMAT_VERSION {
            warn!(
                "State file version {} differs from {}, reading anyway",
                document.version, FORMAT_VERSION
            );
        }

        Ok(document.values)
    }

    /// Rewrite the document: temp file, backup of the old one, rename
    async fn persist(&self) -> Result<(), Error> {
        let mut document = self.state.write().await;

        let text = serde_json::to_string_pretty(&OnDisk {
            version: FORMAT_VERSION.to_string(),
            values: document.values.clone(),
        })?;

        let temp = self.path.with_extension("tmp");
        fs::write(&temp, text)
            .await
            .map_err(|e| io_error("write", &temp, e))?;

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                warn!("Failed to refresh backup: {}", e);
            }
        }

        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| io_error("replace state file with", &temp, e))?;

        document.dirty = false;
        trace!("State written to {}", self.path.display());
        Ok(())
    }

    fn backup_path(path: &Path) -> PathBuf {
        path.with_extension("bak")
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, Error> {
        Ok(self.state.read().await.values.get(key).cloned())
    }

    async fn save(&self, key: &str, value: Value) -> Result<(), Error> {
        {
            let mut document = self.state.write().await;
            document.values.insert(key.to_string(), value);
            document.dirty = true;
        }
        self.persist().await
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        {
            let mut document = self.state.write().await;
            if document.values.remove(key).is_none() {
                return Ok(());
            }
            document.dirty = true;
        }
        self.persist().await
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.state.read().await.values.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        if self.state.read().await.dirty {
            self.persist().await
        } else {
            Ok(())
        }
    }
}
