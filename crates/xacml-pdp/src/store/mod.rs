//! Policy storage.

use std::{path::Path, sync::Arc};

use time::OffsetDateTime;
use xacml_common::{
    config::{Backend, StoreConfig},
    policy::{PolicyDocument, SchemaValidator},
};

use crate::{
    error::{self, Error},
    index::PolicyIndex,
};

pub mod file;
pub mod indexed;

pub use file::FilePolicyStore;
pub use indexed::{Container, IndexedPolicyStore, Transaction};

/// A persistent collection of XACML policies keyed by `PolicyId`.
pub trait PolicyStore: Send + Sync {
    /// Add a policy, returning its `PolicyId`.
    ///
    /// `name` is the storage name of the document; by default it is derived from the id.
    fn add_policy(&self, document: &[u8], name: Option<&str>) -> Result<String, Error>;

    /// Delete a policy. Returns `false` when it did not exist.
    fn delete_policy(&self, id: &str) -> Result<bool, Error>;

    /// Replace a policy with a new version of the same id. Returns `false` when it did not exist.
    fn update_policy(&self, id: &str, document: &[u8]) -> Result<bool, Error>;

    /// The serialized policy.
    fn get_policy(&self, id: &str) -> Result<Vec<u8>, Error>;

    /// Every stored policy id.
    fn list_policies(&self) -> Result<Vec<String>, Error>;

    /// Whether a policy with `id` is stored.
    fn contains(&self, id: &str) -> Result<bool, Error>;

    /// Whether the policy in the file at `path` is stored, judged by its `PolicyId`.
    fn contains_file(&self, path: &Path) -> Result<bool, Error> {
        let bytes = std::fs::read(path).map_err(error::store)?;
        let id = PolicyDocument::policy_id(&bytes)?;
        self.contains(&id)
    }

    /// When the store was last modified.
    fn last_update(&self) -> OffsetDateTime;
}

/// An opened store of either backend.
#[derive(Clone)]
pub enum StoreHandle {
    /// The file backend.
    File(Arc<FilePolicyStore>),
    /// The indexed backend.
    Indexed(Arc<IndexedPolicyStore>),
}

impl StoreHandle {
    /// The store's management interface.
    pub fn store(&self) -> Arc<dyn PolicyStore> {
        match self {
            Self::File(store) => store.clone(),
            Self::Indexed(store) => store.clone(),
        }
    }

    /// The store's candidate retrieval interface.
    pub fn index(&self) -> Arc<dyn PolicyIndex> {
        match self {
            Self::File(store) => store.clone(),
            Self::Indexed(store) => store.clone(),
        }
    }
}

/// Open the store described by `config`.
pub fn open_store(config: &StoreConfig) -> Result<StoreHandle, Error> {
    let validator = config.validator()?;

    Ok(match config.backend {
        Backend::File => StoreHandle::File(Arc::new(FilePolicyStore::open(
            &config.directory,
            config.recycle_directory(),
            validator,
        )?)),
        Backend::Indexed => StoreHandle::Indexed(Arc::new(IndexedPolicyStore::open(
            config.directory.join(&config.container),
            Arc::new(config.index_map.clone()),
            validator,
        )?)),
    })
}

/// Validate and analyze a document about to enter a store.
pub(crate) fn prepare(
    validator: Option<&SchemaValidator>,
    document: &[u8],
) -> Result<PolicyDocument, Error> {
    if let Some(validator) = validator {
        validator.validate(document)?;
    }
    Ok(PolicyDocument::parse(document)?)
}

/// The storage name of a policy: the given name, or one derived from the policy id.
pub(crate) fn file_name(id: &str, name: Option<&str>) -> String {
    let stem: String = match name {
        Some(name) => name.strip_suffix(".xml").unwrap_or(name).to_string(),
        None => id.to_string(),
    };

    let mut file_name: String = stem
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect();

    if file_name.starts_with('.') {
        file_name.replace_range(0..1, "_");
    }

    file_name.push_str(".xml");
    file_name
}
