//! Normalization of raw request parameters into typed resource attributes.

use tracing::warn;
use xacml_common::{
    attribute::{AttributeSet, AttributeType, AttributeValue},
    id::repository,
};

use crate::{path::PathParts, request::PepRequest};

/// How one request parameter maps onto a resource attribute.
struct ParamMapping {
    param: &'static str,
    attribute: &'static str,
    ty: AttributeType,
}

const fn mapping(param: &'static str, attribute: &'static str, ty: AttributeType) -> ParamMapping {
    ParamMapping {
        param,
        attribute,
        ty,
    }
}

const PARAM_MAPPINGS: &[ParamMapping] = &[
    mapping("pid", repository::OBJECT_PID, AttributeType::String),
    mapping("dsID", repository::DATASTREAM_ID, AttributeType::String),
    mapping("asOfDateTime", repository::AS_OF_DATETIME, AttributeType::DateTime),
    mapping("mimeType", repository::DATASTREAM_MIME_TYPE, AttributeType::String),
    mapping("state", repository::OBJECT_STATE, AttributeType::String),
    mapping("dsState", repository::DATASTREAM_STATE, AttributeType::String),
    mapping("format", repository::EXPORT_FORMAT, AttributeType::AnyUri),
    mapping("formatURI", repository::DATASTREAM_FORMAT_URI, AttributeType::AnyUri),
    mapping("context", repository::EXPORT_CONTEXT, AttributeType::String),
    mapping("controlGroup", repository::DATASTREAM_CONTROL_GROUP, AttributeType::String),
];

/// Maps path components and request parameters to resource attributes.
///
/// Path components win over parameters of the same meaning. Values that do not parse as
/// their datatype are dropped with a warning, so an unparseable `asOfDateTime` means no date
/// constraint at all.
#[derive(Clone, Copy, Default, Debug)]
pub struct ResourceAttributeMapper;

impl ResourceAttributeMapper {
    /// The resource attributes of `request`, addressed by `parts`.
    pub fn map(&self, request: &PepRequest, parts: &PathParts) -> AttributeSet {
        let mut resource = AttributeSet::default();

        let from_path = [
            (repository::OBJECT_PID, parts.pid.as_deref()),
            (repository::DATASTREAM_ID, parts.datastream.as_deref()),
            (repository::SDEF_PID, parts.sdef.as_deref()),
            (repository::DISSEMINATOR_METHOD, parts.method.as_deref()),
        ];
        for (attribute, value) in from_path {
            if let Some(value) = value {
                resource.insert(attribute, AttributeValue::string(value));
            }
        }

        if let Some(as_of) = parts.as_of.as_deref() {
            insert_decoded(&mut resource, repository::AS_OF_DATETIME, AttributeType::DateTime, as_of);
        }

        for mapping in PARAM_MAPPINGS {
            if resource.contains(mapping.attribute) {
                continue;
            }
            for value in request.params(mapping.param) {
                insert_decoded(&mut resource, mapping.attribute, mapping.ty, value);
            }
        }

        let namespaces: Vec<String> = resource
            .get(repository::OBJECT_PID)
            .iter()
            .filter_map(|pid| namespace(&pid.encode()).map(str::to_string))
            .collect();
        for namespace in namespaces {
            resource.insert(repository::OBJECT_NAMESPACE, AttributeValue::string(namespace));
        }

        resource
    }
}

/// The namespace part of a PID, before its first colon.
pub fn namespace(pid: &str) -> Option<&str> {
    pid.split_once(':').map(|(namespace, _)| namespace)
}

fn insert_decoded(set: &mut AttributeSet, attribute: &str, ty: AttributeType, text: &str) {
    match AttributeValue::decode(ty, text) {
        Ok(value) => set.insert(attribute, value),
        Err(err) => warn!(attribute, value = %err.value, "ignoring unparseable attribute value"),
    }
}
