//! Policy store configuration.
//!
//! A configuration is either a TOML document:
//!
//! ```toml
//! directory = "/var/lib/xacml/policies"
//! backend = "indexed"
//! container = "policies"
//!
//! [validation]
//! enabled = true
//! schema = "cs-xacml-schema-policy-01.xsd"
//!
//! [[index-map.resource]]
//! id = "urn:oasis:names:tc:xacml:1.0:resource:resource-id"
//! type = "string"
//! ```
//!
//! or the equivalent XML document rooted at `<PolicyStore>`.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    attribute::{AttributeType, Category},
    index_map::IndexMap,
    policy::{SchemaValidator, ValidationError},
    FromStrVisitor,
};

/// Configuration could not be loaded.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("could not read {path}: {source}")]
    Io {
        /// The configuration path.
        path: PathBuf,
        /// Underlying cause.
        source: std::io::Error,
    },

    /// TOML syntax or schema error.
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// XML syntax error.
    #[error("invalid XML configuration: {0}")]
    Xml(#[from] roxmltree::Error),

    /// The document is well-formed but its content is not a valid configuration.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The file extension names no known format.
    #[error("unknown configuration format: {0}")]
    UnknownFormat(PathBuf),
}

/// Which policy store implementation backs the decision point.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub enum Backend {
    /// A flat directory of policy files.
    #[default]
    File,
    /// An indexed document container.
    Indexed,
}

impl FromStr for Backend {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "indexed" => Ok(Self::Indexed),
            _ => Err("expected `file` or `indexed`"),
        }
    }
}

impl<'de> Deserialize<'de> for Backend {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(FromStrVisitor::new("store backend"))
    }
}

impl Serialize for Backend {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(match self {
            Self::File => "file",
            Self::Indexed => "indexed",
        })
    }
}

/// Policy validation settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    /// Whether documents are validated before they enter the store.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Schema location: a URL or a file path, relative paths resolving against the
    /// configuration file's directory.
    #[serde(default)]
    pub schema: Option<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schema: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_container() -> String {
    "policies".to_string()
}

/// Everything needed to open a policy store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding policy files (file backend) or containers (indexed backend).
    pub directory: PathBuf,

    /// Container name of the indexed backend.
    #[serde(default = "default_container")]
    pub container: String,

    /// Store implementation.
    #[serde(default)]
    pub backend: Backend,

    /// Where the file backend moves deleted policies.
    #[serde(default, rename = "recycle-directory")]
    pub recycle_directory: Option<PathBuf>,

    /// Indexed attributes.
    #[serde(default = "IndexMap::repository_default", rename = "index-map")]
    pub index_map: IndexMap,

    /// Validation settings.
    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl StoreConfig {
    /// A file-backed configuration with defaults for everything else.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            container: default_container(),
            backend: Backend::default(),
            recycle_directory: None,
            index_map: IndexMap::repository_default(),
            validation: ValidationConfig::default(),
            base_dir: None,
        }
    }

    /// Use the given backend.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Use the given index map.
    pub fn with_index_map(mut self, index_map: IndexMap) -> Self {
        self.index_map = index_map;
        self
    }

    /// Enable or disable validation.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validation.enabled = enabled;
        self
    }

    /// Load a configuration file, picking the format from its extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&text)?,
            Some("xml") => Self::from_xml(&text)?,
            _ => return Err(ConfigError::UnknownFormat(path.to_path_buf())),
        };

        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Parse a TOML configuration.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml)?)
    }

    /// Parse an XML configuration.
    pub fn from_xml(xml: &str) -> Result<Self, ConfigError> {
        let doc = roxmltree::Document::parse(xml)?;
        let root = doc.root_element();

        if root.tag_name().name() != "PolicyStore" {
            return Err(ConfigError::Invalid(format!(
                "expected <PolicyStore>, found <{}>",
                root.tag_name().name()
            )));
        }

        let text_of = |name: &str| {
            root.children()
                .find(|child| child.has_tag_name(name))
                .and_then(|child| child.text())
                .map(str::trim)
                .filter(|text| !text.is_empty())
        };

        let directory = text_of("Directory")
            .ok_or_else(|| ConfigError::Invalid("missing <Directory>".to_string()))?;

        let mut config = Self::new(directory);

        if let Some(container) = text_of("Container") {
            config.container = container.to_string();
        }
        if let Some(backend) = text_of("Backend") {
            config.backend = backend
                .parse()
                .map_err(|msg: &str| ConfigError::Invalid(format!("<Backend>: {msg}")))?;
        }
        config.recycle_directory = text_of("Recycle").map(PathBuf::from);

        if let Some(index_node) = root.children().find(|child| child.has_tag_name("IndexMap")) {
            let mut index_map = IndexMap::default();

            for category_node in index_node.children().filter(|child| child.is_element()) {
                let name = category_node.tag_name().name();
                let category = Category::ALL
                    .into_iter()
                    .find(|category| category.singular() == name)
                    .ok_or_else(|| {
                        ConfigError::Invalid(format!("unknown index category <{name}>"))
                    })?;

                for attribute in category_node
                    .children()
                    .filter(|child| child.has_tag_name("Attribute"))
                {
                    let id = attribute.attribute("id").ok_or_else(|| {
                        ConfigError::Invalid(format!("<{name}><Attribute> without id"))
                    })?;
                    let ty = match attribute.attribute("type") {
                        Some(ty) => ty.parse::<AttributeType>().map_err(|msg| {
                            ConfigError::Invalid(format!("attribute {id}: {msg}"))
                        })?,
                        None => AttributeType::String,
                    };
                    index_map.category_mut(category).put(id, ty);
                }
            }

            config.index_map = index_map;
        }

        if let Some(validation) = root
            .children()
            .find(|child| child.has_tag_name("Validation"))
        {
            config.validation.enabled = match validation.attribute("enabled") {
                None | Some("true") => true,
                Some("false") => false,
                Some(other) => {
                    return Err(ConfigError::Invalid(format!(
                        "<Validation enabled=\"{other}\">"
                    )))
                }
            };
            config.validation.schema = validation.attribute("schema").map(str::to_string);
        }

        Ok(config)
    }

    /// The directory deleted policies are moved to.
    pub fn recycle_directory(&self) -> PathBuf {
        self.recycle_directory
            .clone()
            .unwrap_or_else(|| self.directory.join(".recycle"))
    }

    /// The directory the configuration was loaded from, if it came from a file.
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Build the configured validator, `None` when validation is disabled.
    pub fn validator(&self) -> Result<Option<SchemaValidator>, ValidationError> {
        if !self.validation.enabled {
            return Ok(None);
        }

        match &self.validation.schema {
            Some(location) => SchemaValidator::from_location(location, self.base_dir()).map(Some),
            None => Ok(Some(SchemaValidator::xacml())),
        }
    }
}
