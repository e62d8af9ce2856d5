//! The typed XACML attribute model.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    hash::Hash,
    str::FromStr,
};

use int_enum::IntEnum;
use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    PrimitiveDateTime, Time, UtcOffset,
};

use crate::FromStrVisitor;

/// The four XACML attribute categories.
#[repr(u8)]
#[derive(IntEnum, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Category {
    /// Who is asking.
    Subject = 0,
    /// What is being accessed.
    Resource = 1,
    /// What is being done.
    Action = 2,
    /// The circumstances of the request.
    Environment = 3,
}

impl Category {
    /// All categories in canonical order.
    pub const ALL: [Category; 4] = [
        Category::Subject,
        Category::Resource,
        Category::Action,
        Category::Environment,
    ];

    /// Lowercase label, used in metadata and query text.
    pub fn label(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Resource => "resource",
            Self::Action => "action",
            Self::Environment => "environment",
        }
    }

    /// The Target child element holding this category (`Subjects`, ...).
    pub fn plural(self) -> &'static str {
        match self {
            Self::Subject => "Subjects",
            Self::Resource => "Resources",
            Self::Action => "Actions",
            Self::Environment => "Environments",
        }
    }

    /// The disjunctive element name (`Subject`, ...).
    pub fn singular(self) -> &'static str {
        match self {
            Self::Subject => "Subject",
            Self::Resource => "Resource",
            Self::Action => "Action",
            Self::Environment => "Environment",
        }
    }

    /// The match element name (`SubjectMatch`, ...).
    pub fn match_element(self) -> &'static str {
        match self {
            Self::Subject => "SubjectMatch",
            Self::Resource => "ResourceMatch",
            Self::Action => "ActionMatch",
            Self::Environment => "EnvironmentMatch",
        }
    }

    /// The attribute designator element name (`SubjectAttributeDesignator`, ...).
    pub fn designator(self) -> &'static str {
        match self {
            Self::Subject => "SubjectAttributeDesignator",
            Self::Resource => "ResourceAttributeDesignator",
            Self::Action => "ActionAttributeDesignator",
            Self::Environment => "EnvironmentAttributeDesignator",
        }
    }

    /// The XACML 1.0 wildcard marker element (`AnySubject`, ...).
    pub fn any_marker(self) -> &'static str {
        match self {
            Self::Subject => "AnySubject",
            Self::Resource => "AnyResource",
            Self::Action => "AnyAction",
            Self::Environment => "AnyEnvironment",
        }
    }

    /// Index of this category in `[T; 4]` tables.
    pub fn index(self) -> usize {
        u8::from(self) as usize
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The XML Schema datatypes an attribute value may have.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AttributeType {
    /// `xs:string`
    String,
    /// `xs:anyURI`
    AnyUri,
    /// `xs:dateTime`
    DateTime,
    /// `xs:date`
    Date,
    /// `xs:time`
    Time,
    /// `xs:integer`
    Integer,
    /// `xs:boolean`
    Boolean,
}

const XS: &str = "http://www.w3.org/2001/XMLSchema#";

impl AttributeType {
    /// The datatype URI used in policy and request documents.
    pub fn uri(self) -> &'static str {
        match self {
            Self::String => "http://www.w3.org/2001/XMLSchema#string",
            Self::AnyUri => "http://www.w3.org/2001/XMLSchema#anyURI",
            Self::DateTime => "http://www.w3.org/2001/XMLSchema#dateTime",
            Self::Date => "http://www.w3.org/2001/XMLSchema#date",
            Self::Time => "http://www.w3.org/2001/XMLSchema#time",
            Self::Integer => "http://www.w3.org/2001/XMLSchema#integer",
            Self::Boolean => "http://www.w3.org/2001/XMLSchema#boolean",
        }
    }
}

impl FromStr for AttributeType {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let short = s.strip_prefix(XS).unwrap_or(s);
        match short {
            "string" => Ok(Self::String),
            "anyURI" => Ok(Self::AnyUri),
            "dateTime" => Ok(Self::DateTime),
            "date" => Ok(Self::Date),
            "time" => Ok(Self::Time),
            "integer" => Ok(Self::Integer),
            "boolean" => Ok(Self::Boolean),
            _ => Err("unsupported attribute datatype"),
        }
    }
}

impl Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.uri())
    }
}

impl<'de> Deserialize<'de> for AttributeType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(FromStrVisitor::new("attribute datatype"))
    }
}

impl Serialize for AttributeType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.uri())
    }
}

/// A value could not be decoded as the requested datatype.
#[derive(thiserror::Error, Clone, PartialEq, Eq, Debug)]
#[error("invalid {ty} value `{value}`")]
pub struct ValueError {
    /// The requested datatype.
    pub ty: AttributeType,
    /// The offending text.
    pub value: String,
}

/// A typed attribute value.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum AttributeValue {
    /// A string.
    String(String),
    /// A URI, kept verbatim.
    AnyUri(String),
    /// An instant, normalized to UTC.
    DateTime(OffsetDateTime),
    /// A calendar date.
    Date(Date),
    /// A time of day.
    Time(Time),
    /// An integer.
    Integer(i64),
    /// A boolean.
    Boolean(bool),
}

impl AttributeValue {
    /// Convenience constructor for string values.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Convenience constructor for URI values.
    pub fn uri(value: impl Into<String>) -> Self {
        Self::AnyUri(value.into())
    }

    /// The datatype of this value.
    pub fn ty(&self) -> AttributeType {
        match self {
            Self::String(_) => AttributeType::String,
            Self::AnyUri(_) => AttributeType::AnyUri,
            Self::DateTime(_) => AttributeType::DateTime,
            Self::Date(_) => AttributeType::Date,
            Self::Time(_) => AttributeType::Time,
            Self::Integer(_) => AttributeType::Integer,
            Self::Boolean(_) => AttributeType::Boolean,
        }
    }

    /// Decode the lexical form `text` as a value of type `ty`.
    ///
    /// Date-times without an offset, and plain dates, are read as UTC.
    pub fn decode(ty: AttributeType, text: &str) -> Result<Self, ValueError> {
        let invalid = || ValueError {
            ty,
            value: text.to_string(),
        };
        let trimmed = text.trim();

        match ty {
            AttributeType::String => Ok(Self::String(text.to_string())),
            AttributeType::AnyUri => Ok(Self::AnyUri(trimmed.to_string())),
            AttributeType::DateTime => decode_datetime(trimmed)
                .map(Self::DateTime)
                .ok_or_else(invalid),
            AttributeType::Date => {
                Date::parse(trimmed.trim_end_matches('Z'), DATE_FORMAT)
                    .map(Self::Date)
                    .map_err(|_| invalid())
            }
            AttributeType::Time => Time::parse(trimmed.trim_end_matches('Z'), TIME_FORMAT)
                .map(Self::Time)
                .map_err(|_| invalid()),
            AttributeType::Integer => trimmed
                .parse::<i64>()
                .map(Self::Integer)
                .map_err(|_| invalid()),
            AttributeType::Boolean => match trimmed {
                "true" | "1" => Ok(Self::Boolean(true)),
                "false" | "0" => Ok(Self::Boolean(false)),
                _ => Err(invalid()),
            },
        }
    }

    /// Canonical lexical form of this value.
    ///
    /// Two values that compare equal always encode to the same string, which is what the
    /// indexer relies on when it compares request values with policy values textually.
    pub fn encode(&self) -> String {
        match self {
            Self::String(s) | Self::AnyUri(s) => s.clone(),
            Self::DateTime(dt) => {
                let utc = dt.to_offset(UtcOffset::UTC);
                utc.format(&Rfc3339).unwrap_or_else(|_| utc.to_string())
            }
            Self::Date(date) => date
                .format(DATE_FORMAT)
                .unwrap_or_else(|_| date.to_string()),
            Self::Time(time) => {
                let format = if time.nanosecond() == 0 {
                    time.format(TIME_FORMAT_SECONDS)
                } else {
                    time.format(TIME_FORMAT_MILLIS)
                };
                format.unwrap_or_else(|_| time.to_string())
            }
            Self::Integer(i) => i.to_string(),
            Self::Boolean(b) => b.to_string(),
        }
    }
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<OffsetDateTime> for AttributeValue {
    fn from(value: OffsetDateTime) -> Self {
        Self::DateTime(value.to_offset(UtcOffset::UTC))
    }
}

const DATE_FORMAT: &[time::format_description::FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

const TIME_FORMAT: &[time::format_description::FormatItem<'static>] =
    format_description!("[hour]:[minute]:[second][optional [.[subsecond]]]");

const TIME_FORMAT_SECONDS: &[time::format_description::FormatItem<'static>] =
    format_description!("[hour]:[minute]:[second]");

const TIME_FORMAT_MILLIS: &[time::format_description::FormatItem<'static>] =
    format_description!("[hour]:[minute]:[second].[subsecond digits:3]");

const LOCAL_DATETIME_FORMAT: &[time::format_description::FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");

fn decode_datetime(text: &str) -> Option<OffsetDateTime> {
    if let Ok(dt) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(dt.to_offset(UtcOffset::UTC));
    }
    if let Ok(dt) = PrimitiveDateTime::parse(text, LOCAL_DATETIME_FORMAT) {
        return Some(dt.assume_utc());
    }
    Date::parse(text, DATE_FORMAT)
        .ok()
        .map(|date| date.midnight().assume_utc())
}

/// One XACML attribute projected out of a request context: `(id, type, set-of-values)`.
///
/// Values are held in canonical encoded form. Equality and hashing only consider the `id`.
#[derive(Clone, Debug)]
pub struct AttributeBean {
    /// Attribute identifier.
    pub id: String,

    /// Datatype the values were encoded with.
    pub ty: AttributeType,

    /// Deduplicated canonical values.
    pub values: BTreeSet<String>,
}

impl AttributeBean {
    /// Create an empty bean.
    pub fn new(id: impl Into<String>, ty: AttributeType) -> Self {
        Self {
            id: id.into(),
            ty,
            values: BTreeSet::new(),
        }
    }

    /// Add a value in canonical form. Duplicates collapse.
    pub fn add_value(&mut self, value: impl Into<String>) {
        self.values.insert(value.into());
    }
}

impl PartialEq for AttributeBean {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AttributeBean {}

impl Hash for AttributeBean {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// The attributes of one category (or of one subject) in a request.
///
/// Attribute ids are kept in sorted order so that request shapes are deterministic.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct AttributeSet {
    attributes: BTreeMap<String, Vec<AttributeValue>>,
}

impl AttributeSet {
    /// Add a value under `id`, skipping exact duplicates.
    pub fn insert(&mut self, id: impl Into<String>, value: AttributeValue) {
        let values = self.attributes.entry(id.into()).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }

    /// Add several values under `id`.
    pub fn extend(&mut self, id: &str, values: impl IntoIterator<Item = AttributeValue>) {
        for value in values {
            self.insert(id, value);
        }
    }

    /// The values of `id`, empty when absent.
    pub fn get(&self, id: &str) -> &[AttributeValue] {
        self.attributes.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the set has any value for `id`.
    pub fn contains(&self, id: &str) -> bool {
        !self.get(id).is_empty()
    }

    /// Whether the set has no attributes at all.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Number of distinct attribute ids.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Iterate `(id, values)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[AttributeValue])> {
        self.attributes
            .iter()
            .map(|(id, values)| (id.as_str(), values.as_slice()))
    }

    /// Merge `other` into this set.
    pub fn merge(&mut self, other: &AttributeSet) {
        for (id, values) in other.iter() {
            self.extend(id, values.iter().cloned());
        }
    }
}
