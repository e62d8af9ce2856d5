//! A policy store backed by a flat directory of XML files.

use std::{
    fs,
    path::{Path, PathBuf},
};

use fnv::FnvHashMap;
use parking_lot::{Mutex, RwLock};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use xacml_common::{context::RequestContext, policy::SchemaValidator};

use crate::{
    error::{self, Error},
    index::PolicyIndex,
};

use super::{file_name, prepare, PolicyStore};

#[derive(Clone, Debug)]
struct StoredPolicy {
    path: PathBuf,
    bytes: Vec<u8>,
}

/// Policies stored as `*.xml` files in one directory.
///
/// The directory is scanned once when the store is opened; afterwards the in-memory cache is
/// authoritative. Deleted policies are moved to a recycle directory rather than removed.
pub struct FilePolicyStore {
    directory: PathBuf,
    recycle_directory: PathBuf,
    validator: Option<SchemaValidator>,
    policies: RwLock<FnvHashMap<String, StoredPolicy>>,
    last_update: RwLock<OffsetDateTime>,

    /// Serializes mutations
    write_lock: Mutex<()>,
}

impl FilePolicyStore {
    /// Open the store in `directory`, creating the directory if needed.
    ///
    /// Files that fail validation are skipped. Two files declaring the same policy id are an
    /// error.
    pub fn open(
        directory: impl Into<PathBuf>,
        recycle_directory: impl Into<PathBuf>,
        validator: Option<SchemaValidator>,
    ) -> Result<Self, Error> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(error::store)?;

        let mut paths: Vec<PathBuf> = fs::read_dir(&directory)
            .map_err(error::store)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "xml"))
            .collect();
        paths.sort();

        let mut policies = FnvHashMap::default();

        for path in paths {
            let bytes = fs::read(&path).map_err(error::store)?;
            let document = match prepare(validator.as_ref(), &bytes) {
                Ok(document) => document,
                Err(err) => {
                    warn!(?path, %err, "skipping invalid policy file");
                    continue;
                }
            };

            if policies.contains_key(&document.id) {
                return Err(Error::Duplicate(document.id));
            }

            debug!(?path, policy_id = %document.id, "loaded policy");
            policies.insert(document.id, StoredPolicy { path, bytes });
        }

        info!(?directory, count = policies.len(), "opened file policy store");

        Ok(Self {
            directory,
            recycle_directory: recycle_directory.into(),
            validator,
            policies: RwLock::new(policies),
            last_update: RwLock::new(OffsetDateTime::now_utc()),
            write_lock: Mutex::new(()),
        })
    }

    /// The directory policies are stored in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The directory deleted policies are moved to.
    pub fn recycle_directory(&self) -> &Path {
        &self.recycle_directory
    }

    fn touch(&self) {
        *self.last_update.write() = OffsetDateTime::now_utc();
    }

    /// Write `bytes` to `path` through a temporary file in the same directory.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), Error> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("policy.xml");
        let tmp = self.directory.join(format!(".{file_name}.tmp"));

        fs::write(&tmp, bytes).map_err(error::store)?;
        if let Err(err) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(error::store(err));
        }
        Ok(())
    }
}

impl PolicyStore for FilePolicyStore {
    fn add_policy(&self, document: &[u8], name: Option<&str>) -> Result<String, Error> {
        let _guard = self.write_lock.lock();
        let parsed = prepare(self.validator.as_ref(), document)?;

        if self.policies.read().contains_key(&parsed.id) {
            return Err(Error::Duplicate(parsed.id));
        }

        let path = self.directory.join(file_name(&parsed.id, name));
        if path.exists() {
            return Err(Error::Store(anyhow::anyhow!(
                "policy file {} already exists",
                path.display()
            )));
        }

        self.write_atomic(&path, document)?;

        info!(policy_id = %parsed.id, ?path, "added policy");
        self.policies.write().insert(
            parsed.id.clone(),
            StoredPolicy {
                path,
                bytes: document.to_vec(),
            },
        );
        self.touch();

        Ok(parsed.id)
    }

    fn delete_policy(&self, id: &str) -> Result<bool, Error> {
        let _guard = self.write_lock.lock();

        let Some(stored) = self.policies.read().get(id).cloned() else {
            return Ok(false);
        };

        fs::create_dir_all(&self.recycle_directory).map_err(error::store)?;

        let file_name = stored
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("policy.xml");
        let timestamp = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let mut recycled = self
            .recycle_directory
            .join(format!("{file_name}.{timestamp}"));
        let mut n = 1;
        while recycled.exists() {
            recycled = self
                .recycle_directory
                .join(format!("{file_name}.{timestamp}-{n}"));
            n += 1;
        }

        fs::rename(&stored.path, &recycled).map_err(error::store)?;

        info!(policy_id = id, ?recycled, "deleted policy");
        self.policies.write().remove(id);
        self.touch();

        Ok(true)
    }

    fn update_policy(&self, id: &str, document: &[u8]) -> Result<bool, Error> {
        let _guard = self.write_lock.lock();
        let parsed = prepare(self.validator.as_ref(), document)?;

        if parsed.id != id {
            return Err(Error::IdMismatch {
                expected: id.to_string(),
                actual: parsed.id,
            });
        }

        let Some(path) = self.policies.read().get(id).map(|stored| stored.path.clone()) else {
            return Ok(false);
        };

        self.write_atomic(&path, document)?;

        info!(policy_id = id, ?path, "updated policy");
        self.policies.write().insert(
            parsed.id,
            StoredPolicy {
                path,
                bytes: document.to_vec(),
            },
        );
        self.touch();

        Ok(true)
    }

    fn get_policy(&self, id: &str) -> Result<Vec<u8>, Error> {
        self.policies
            .read()
            .get(id)
            .map(|stored| stored.bytes.clone())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn list_policies(&self) -> Result<Vec<String>, Error> {
        let mut ids: Vec<String> = self.policies.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn contains(&self, id: &str) -> Result<bool, Error> {
        Ok(self.policies.read().contains_key(id))
    }

    fn last_update(&self) -> OffsetDateTime {
        *self.last_update.read()
    }
}

/// The file store cannot narrow candidates; every policy is returned.
impl PolicyIndex for FilePolicyStore {
    fn candidates(&self, _request: &RequestContext) -> Result<FnvHashMap<String, Vec<u8>>, Error> {
        let policies = self.policies.read();
        debug!(count = policies.len(), "returning all policies as candidates");

        Ok(policies
            .iter()
            .map(|(id, stored)| (id.clone(), stored.bytes.clone()))
            .collect())
    }
}
