//! A policy store backed by an indexed document container.
//!
//! The container's state is an immutable [Container] snapshot. Readers load the current
//! snapshot without locking. Writers work on a private copy inside a [Transaction], and a
//! successful commit persists the copy before publishing it as the new snapshot.
//!
//! On disk, the manifest names the document file of every policy. A commit writes each new
//! document version to a file no committed manifest refers to, then replaces the manifest.
//! That rename is the commit point: files superseded by it are removed afterwards, and files
//! of a commit that fails before it are removed instead.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use arc_swap::ArcSwap;
use fnv::FnvHashMap;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, info, warn};
use xacml_common::{
    context::RequestContext,
    index_map::IndexMap,
    policy::{PolicyDocument, PolicyMetadata, SchemaValidator},
};

use crate::{
    error::{self, Error},
    index::{query::INDEX_NAMESPACE, IndexRecord, PlanCache, PolicyIndex, Projection},
};

use super::{file_name, prepare, PolicyStore};

const MANIFEST: &str = "manifest.json";

#[derive(Debug)]
struct Entry {
    file: String,
    bytes: Vec<u8>,
    metadata: PolicyMetadata,
    record: IndexRecord,
}

/// One consistent state of the container.
#[derive(Clone, Debug)]
pub struct Container {
    documents: FnvHashMap<String, Arc<Entry>>,
    last_update: OffsetDateTime,
}

impl Container {
    fn empty() -> Self {
        Self {
            documents: Default::default(),
            last_update: OffsetDateTime::now_utc(),
        }
    }

    /// Number of stored policies.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the container holds no policies.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The serialized policy `id`.
    pub fn get(&self, id: &str) -> Option<&[u8]> {
        self.documents.get(id).map(|entry| entry.bytes.as_slice())
    }

    /// The wildcard metadata of policy `id`.
    pub fn metadata(&self, id: &str) -> Option<PolicyMetadata> {
        self.documents.get(id).map(|entry| entry.metadata)
    }

    /// When this state was committed.
    pub fn last_update(&self) -> OffsetDateTime {
        self.last_update
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(rename = "last-update")]
    last_update: String,

    #[serde(default)]
    policies: Vec<ManifestEntry>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestEntry {
    id: String,
    file: String,
    metadata: PolicyMetadata,
}

/// Policies in an indexed container directory.
pub struct IndexedPolicyStore {
    path: PathBuf,
    index_map: Arc<IndexMap>,
    validator: Option<SchemaValidator>,
    container: ArcSwap<Container>,
    plans: PlanCache,
    writer: Mutex<()>,
}

impl IndexedPolicyStore {
    /// Open the container at `path`, creating an empty one if it does not exist.
    pub fn open(
        path: impl Into<PathBuf>,
        index_map: Arc<IndexMap>,
        validator: Option<SchemaValidator>,
    ) -> Result<Self, Error> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(error::store)?;

        let container = load_container(&path, &index_map)?;
        info!(?path, count = container.len(), "opened indexed policy store");

        Ok(Self {
            path,
            index_map,
            validator,
            container: ArcSwap::new(Arc::new(container)),
            plans: PlanCache::default(),
            writer: Mutex::new(()),
        })
    }

    /// The container directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The attributes this store indexes.
    pub fn index_map(&self) -> &IndexMap {
        &self.index_map
    }

    /// The compiled query plans.
    pub fn plan_cache(&self) -> &PlanCache {
        &self.plans
    }

    /// The current container state.
    pub fn snapshot(&self) -> Arc<Container> {
        self.container.load_full()
    }

    /// Begin a transaction. Blocks while another transaction is open.
    pub fn begin(&self) -> Transaction<'_> {
        let guard = self.writer.lock();
        let base = self.container.load_full();
        let working = Container::clone(&base);

        Transaction {
            store: self,
            _guard: guard,
            base,
            working,
            written: BTreeSet::new(),
            removed: BTreeSet::new(),
            finished: false,
        }
    }

    fn remove_files<'f>(&self, files: impl IntoIterator<Item = &'f str>) {
        for file in files {
            if let Err(err) = fs::remove_file(self.path.join(file)) {
                warn!(file, %err, "could not remove policy file");
            }
        }
    }

    fn write_atomic(&self, file: &str, bytes: &[u8]) -> Result<(), Error> {
        let target = self.path.join(file);
        let tmp = self.path.join(format!(".{file}.tmp"));

        fs::write(&tmp, bytes).map_err(error::transaction)?;
        if let Err(err) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(error::transaction(err));
        }
        Ok(())
    }
}

fn load_container(path: &Path, index_map: &IndexMap) -> Result<Container, Error> {
    let manifest_path = path.join(MANIFEST);
    if !manifest_path.exists() {
        return Ok(Container::empty());
    }

    let manifest: Manifest =
        serde_json::from_slice(&fs::read(&manifest_path).map_err(error::store)?)
            .map_err(error::store)?;

    let mut documents = FnvHashMap::default();

    for entry in manifest.policies {
        let bytes = fs::read(path.join(&entry.file)).map_err(error::store)?;
        let document = PolicyDocument::parse(&bytes)?;

        if document.id != entry.id {
            return Err(Error::Store(anyhow::anyhow!(
                "{} declares policy {} but the manifest lists {}",
                entry.file,
                document.id,
                entry.id
            )));
        }
        if document.metadata() != entry.metadata {
            warn!(policy_id = %entry.id, "stored metadata is stale, using document");
        }

        let record = IndexRecord::build(&document, index_map);
        documents.insert(
            entry.id,
            Arc::new(Entry {
                file: entry.file,
                bytes,
                metadata: document.metadata(),
                record,
            }),
        );
    }

    let last_update = OffsetDateTime::parse(&manifest.last_update, &Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc());

    Ok(Container {
        documents,
        last_update,
    })
}

fn manifest(container: &Container) -> Result<Vec<u8>, Error> {
    let mut policies: Vec<ManifestEntry> = container
        .documents
        .iter()
        .map(|(id, entry)| ManifestEntry {
            id: id.clone(),
            file: entry.file.clone(),
            metadata: entry.metadata,
        })
        .collect();
    policies.sort_by(|a, b| a.id.cmp(&b.id));

    let manifest = Manifest {
        last_update: container
            .last_update
            .format(&Rfc3339)
            .map_err(error::transaction)?,
        policies,
    };
    serde_json::to_vec_pretty(&manifest).map_err(error::transaction)
}

/// A unit of work on an [IndexedPolicyStore].
///
/// Changes are visible through the transaction only. [Transaction::commit] persists and
/// publishes them; dropping the transaction without committing discards them.
pub struct Transaction<'s> {
    store: &'s IndexedPolicyStore,
    _guard: MutexGuard<'s, ()>,
    base: Arc<Container>,
    working: Container,
    written: BTreeSet<String>,
    removed: BTreeSet<String>,
    finished: bool,
}

impl Transaction<'_> {
    /// Add a policy, returning its id.
    pub fn add_policy(&mut self, document: &[u8], name: Option<&str>) -> Result<String, Error> {
        let parsed = prepare(self.store.validator.as_ref(), document)?;

        if self.working.documents.contains_key(&parsed.id) {
            return Err(Error::Duplicate(parsed.id));
        }

        let file = self.unique_file_name(file_name(&parsed.id, name));
        let id = parsed.id.clone();
        self.insert(parsed, file, document);
        Ok(id)
    }

    /// Delete a policy. Returns `false` when it did not exist.
    pub fn delete_policy(&mut self, id: &str) -> bool {
        match self.working.documents.remove(id) {
            Some(entry) => {
                self.written.remove(id);
                self.removed.insert(id.to_string());
                true
            }
            None => false,
        }
    }

    /// Replace a policy. Returns `false` when it did not exist.
    pub fn update_policy(&mut self, id: &str, document: &[u8]) -> Result<bool, Error> {
        let parsed = prepare(self.store.validator.as_ref(), document)?;

        if parsed.id != id {
            return Err(Error::IdMismatch {
                expected: id.to_string(),
                actual: parsed.id,
            });
        }

        let Some(existing) = self.working.documents.remove(id) else {
            return Ok(false);
        };

        let file = self.unique_file_name(existing.file.clone());
        self.insert(parsed, file, document);
        Ok(true)
    }

    /// The policy `id` as seen by this transaction.
    pub fn get_policy(&self, id: &str) -> Option<&[u8]> {
        self.working.get(id)
    }

    /// Persist and publish the changes.
    ///
    /// On failure nothing is published, and the container on disk still holds the state the
    /// transaction started from.
    pub fn commit(mut self) -> Result<(), Error> {
        if self.written.is_empty() && self.removed.is_empty() {
            self.finished = true;
            return Ok(());
        }

        let mut working = std::mem::replace(&mut self.working, Container::empty());
        working.last_update = OffsetDateTime::now_utc();

        let mut new_files: Vec<&str> = Vec::with_capacity(self.written.len());
        let persisted = self
            .written
            .iter()
            .filter_map(|id| working.documents.get(id))
            .try_for_each(|entry| {
                self.store.write_atomic(&entry.file, &entry.bytes)?;
                new_files.push(entry.file.as_str());
                Ok::<_, Error>(())
            })
            .and_then(|()| self.store.write_atomic(MANIFEST, &manifest(&working)?));

        if let Err(err) = persisted {
            warn!(%err, "policy transaction failed, removing its files");
            self.store.remove_files(new_files);
            return Err(err);
        }

        let live_files: BTreeSet<&str> = working
            .documents
            .values()
            .map(|entry| entry.file.as_str())
            .collect();
        self.store.remove_files(
            self.base
                .documents
                .values()
                .map(|entry| entry.file.as_str())
                .filter(|file| !live_files.contains(file)),
        );

        info!(
            written = self.written.len(),
            removed = self.removed.len(),
            "committed policy transaction"
        );

        self.store.container.store(Arc::new(working));
        self.finished = true;
        Ok(())
    }

    /// Discard the changes.
    pub fn abort(self) {}

    fn insert(&mut self, document: PolicyDocument, file: String, bytes: &[u8]) {
        let record = IndexRecord::build(&document, &self.store.index_map);
        self.written.insert(document.id.clone());
        self.working.documents.insert(
            document.id.clone(),
            Arc::new(Entry {
                file,
                bytes: bytes.to_vec(),
                metadata: document.metadata(),
                record,
            }),
        );
    }

    /// A file name for a new document version: free in this transaction, in the committed
    /// state and on disk. Taken names get a `~<n>` generation suffix, which sanitized names
    /// never contain.
    fn unique_file_name(&self, file: String) -> String {
        let taken = |candidate: &str| {
            [&self.working, self.base.as_ref()].iter().any(|container| {
                container
                    .documents
                    .values()
                    .any(|entry| entry.file == candidate)
            }) || self.store.path.join(candidate).exists()
        };

        let stem = file.strip_suffix(".xml").unwrap_or(&file);
        let stem = stem
            .rsplit_once('~')
            .filter(|(_, n)| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            .map_or(stem, |(stem, _)| stem);

        let mut candidate = format!("{stem}.xml");
        let mut n = 1;
        while taken(&candidate) {
            candidate = format!("{stem}~{n}.xml");
            n += 1;
        }
        candidate
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("policy transaction rolled back");
        }
    }
}

impl PolicyStore for IndexedPolicyStore {
    fn add_policy(&self, document: &[u8], name: Option<&str>) -> Result<String, Error> {
        let mut tx = self.begin();
        let id = tx.add_policy(document, name)?;
        tx.commit()?;

        info!(policy_id = %id, "added policy");
        Ok(id)
    }

    fn delete_policy(&self, id: &str) -> Result<bool, Error> {
        let mut tx = self.begin();
        if !tx.delete_policy(id) {
            return Ok(false);
        }
        tx.commit()?;

        info!(policy_id = id, "deleted policy");
        Ok(true)
    }

    fn update_policy(&self, id: &str, document: &[u8]) -> Result<bool, Error> {
        let mut tx = self.begin();
        if !tx.update_policy(id, document)? {
            return Ok(false);
        }
        tx.commit()?;

        info!(policy_id = id, "updated policy");
        Ok(true)
    }

    fn get_policy(&self, id: &str) -> Result<Vec<u8>, Error> {
        self.container
            .load()
            .get(id)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn list_policies(&self) -> Result<Vec<String>, Error> {
        let mut ids: Vec<String> = self.container.load().documents.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn contains(&self, id: &str) -> Result<bool, Error> {
        Ok(self.container.load().documents.contains_key(id))
    }

    fn last_update(&self) -> OffsetDateTime {
        self.container.load().last_update
    }
}

impl PolicyIndex for IndexedPolicyStore {
    fn candidates(&self, request: &RequestContext) -> Result<FnvHashMap<String, Vec<u8>>, Error> {
        let projection = Projection::project(request, &self.index_map);
        let plan = self.plans.get_or_compile(&projection.shape());

        debug!(
            namespace = INDEX_NAMESPACE,
            query = plan.text(),
            bindings = ?projection.bindings(),
            "executing candidate query"
        );

        let container = self.container.load();
        let candidates: FnvHashMap<String, Vec<u8>> = container
            .documents
            .iter()
            .filter(|(_, entry)| plan.matches(&entry.record, &projection))
            .map(|(id, entry)| (id.clone(), entry.bytes.clone()))
            .collect();

        debug!(
            count = candidates.len(),
            total = container.len(),
            "candidate policies"
        );
        Ok(candidates)
    }
}
