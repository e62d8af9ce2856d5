//! Well-known XACML and repository attribute identifiers.
//!
//! The XACML identifiers come from the OASIS specification, the repository identifiers
//! use the `urn:fedora:names:fedora:2.1` namespace that policies are authored against.

/// XACML 1.0 policy namespace.
pub const XACML_1_POLICY_NS: &str = "urn:oasis:names:tc:xacml:1.0:policy";

/// XACML 2.0 policy namespace.
pub const XACML_2_POLICY_NS: &str = "urn:oasis:names:tc:xacml:2.0:policy:schema:os";

/// XACML 2.0 request context namespace.
pub const XACML_2_CONTEXT_NS: &str = "urn:oasis:names:tc:xacml:2.0:context:schema:os";

/// Policy namespaces accepted by the document analysis.
pub const POLICY_NAMESPACES: &[&str] = &[XACML_1_POLICY_NS, XACML_2_POLICY_NS];

/// Standard XACML identifiers.
pub mod xacml {
    /// The subject identifier.
    pub const SUBJECT_ID: &str = "urn:oasis:names:tc:xacml:1.0:subject:subject-id";

    /// The default subject category.
    pub const ACCESS_SUBJECT: &str = "urn:oasis:names:tc:xacml:1.0:subject-category:access-subject";

    /// Subject category of a party acting on behalf of the access subject.
    pub const INTERMEDIARY_SUBJECT: &str =
        "urn:oasis:names:tc:xacml:1.0:subject-category:intermediary-subject";

    /// The resource identifier. Hierarchical values are decomposed by the indexer.
    pub const RESOURCE_ID: &str = "urn:oasis:names:tc:xacml:1.0:resource:resource-id";

    /// The action identifier.
    pub const ACTION_ID: &str = "urn:oasis:names:tc:xacml:1.0:action:action-id";

    /// Current time of the environment.
    pub const CURRENT_TIME: &str = "urn:oasis:names:tc:xacml:1.0:environment:current-time";

    /// Current date of the environment.
    pub const CURRENT_DATE: &str = "urn:oasis:names:tc:xacml:1.0:environment:current-date";

    /// Current date and time of the environment.
    pub const CURRENT_DATETIME: &str = "urn:oasis:names:tc:xacml:1.0:environment:current-dateTime";

    /// The XACML ok status code.
    pub const STATUS_OK: &str = "urn:oasis:names:tc:xacml:1.0:status:ok";

    /// Status code for missing attributes.
    pub const STATUS_MISSING_ATTRIBUTE: &str =
        "urn:oasis:names:tc:xacml:1.0:status:missing-attribute";

    /// Status code for syntax errors in policies or requests.
    pub const STATUS_SYNTAX_ERROR: &str = "urn:oasis:names:tc:xacml:1.0:status:syntax-error";

    /// Status code for evaluation processing errors.
    pub const STATUS_PROCESSING_ERROR: &str =
        "urn:oasis:names:tc:xacml:1.0:status:processing-error";
}

/// XACML match function identifiers understood by the indexer and the reference evaluator.
pub mod function {
    /// String equality.
    pub const STRING_EQUAL: &str = "urn:oasis:names:tc:xacml:1.0:function:string-equal";

    /// URI equality.
    pub const ANYURI_EQUAL: &str = "urn:oasis:names:tc:xacml:1.0:function:anyURI-equal";

    /// Integer equality.
    pub const INTEGER_EQUAL: &str = "urn:oasis:names:tc:xacml:1.0:function:integer-equal";

    /// Boolean equality.
    pub const BOOLEAN_EQUAL: &str = "urn:oasis:names:tc:xacml:1.0:function:boolean-equal";

    /// Date equality.
    pub const DATE_EQUAL: &str = "urn:oasis:names:tc:xacml:1.0:function:date-equal";

    /// Date-time equality.
    pub const DATETIME_EQUAL: &str = "urn:oasis:names:tc:xacml:1.0:function:dateTime-equal";

    /// Time equality.
    pub const TIME_EQUAL: &str = "urn:oasis:names:tc:xacml:1.0:function:time-equal";

    /// Regular expression match on strings.
    pub const STRING_REGEXP_MATCH: &str =
        "urn:oasis:names:tc:xacml:1.0:function:regexp-string-match";

    /// Regular expression match on strings (XACML 2.0 name).
    pub const STRING_REGEXP_MATCH_2: &str =
        "urn:oasis:names:tc:xacml:2.0:function:string-regexp-match";

    /// Regular expression match on URIs.
    pub const ANYURI_REGEXP_MATCH: &str =
        "urn:oasis:names:tc:xacml:2.0:function:anyURI-regexp-match";

    /// Date-time ordering comparison.
    pub const DATETIME_LESS_THAN: &str =
        "urn:oasis:names:tc:xacml:1.0:function:dateTime-less-than";

    /// Date-time ordering comparison.
    pub const DATETIME_GREATER_THAN: &str =
        "urn:oasis:names:tc:xacml:1.0:function:dateTime-greater-than";

    /// Integer ordering comparison.
    pub const INTEGER_LESS_THAN: &str = "urn:oasis:names:tc:xacml:1.0:function:integer-less-than";

    /// Integer ordering comparison.
    pub const INTEGER_GREATER_THAN: &str =
        "urn:oasis:names:tc:xacml:1.0:function:integer-greater-than";

    /// Whether the function is an equality function that an index can answer by literal value lookup.
    pub fn is_equality(match_id: &str) -> bool {
        matches!(
            match_id,
            STRING_EQUAL
                | ANYURI_EQUAL
                | INTEGER_EQUAL
                | BOOLEAN_EQUAL
                | DATE_EQUAL
                | DATETIME_EQUAL
                | TIME_EQUAL
        )
    }

    /// Whether the function is a regular expression match.
    pub fn is_regexp(match_id: &str) -> bool {
        matches!(
            match_id,
            STRING_REGEXP_MATCH | STRING_REGEXP_MATCH_2 | ANYURI_REGEXP_MATCH
        )
    }
}

/// Repository (`urn:fedora:names:fedora:2.1`) attribute identifiers.
pub mod repository {
    /// The login id of the authenticated user.
    pub const SUBJECT_LOGIN_ID: &str = "urn:fedora:names:fedora:2.1:subject:loginId";

    /// The user the authenticated login acts on behalf of.
    pub const SUBJECT_REPRESENTED_USER: &str = "urn:fedora:names:fedora:2.1:subject:represented-user";

    /// Role memberships of the subject.
    pub const SUBJECT_ROLE: &str = "urn:fedora:names:fedora:2.1:subject:role";

    /// The operation identifier.
    pub const ACTION_ID: &str = "urn:fedora:names:fedora:2.1:action:id";

    /// The API family an operation belongs to.
    pub const ACTION_API: &str = "urn:fedora:names:fedora:2.1:action:api";

    /// Prefix of operation identifier values.
    pub const ACTION_ID_PREFIX: &str = "urn:fedora:names:fedora:2.1:action:id-";

    /// Access API value.
    pub const API_A: &str = "urn:fedora:names:fedora:2.1:action:api-a";

    /// Management API value.
    pub const API_M: &str = "urn:fedora:names:fedora:2.1:action:api-m";

    /// Object PID.
    pub const OBJECT_PID: &str = "urn:fedora:names:fedora:2.1:resource:object:pid";

    /// PID namespace (the part before the colon).
    pub const OBJECT_NAMESPACE: &str = "urn:fedora:names:fedora:2.1:resource:object:namespace";

    /// Object state.
    pub const OBJECT_STATE: &str = "urn:fedora:names:fedora:2.1:resource:object:state";

    /// Datastream id.
    pub const DATASTREAM_ID: &str = "urn:fedora:names:fedora:2.1:resource:datastream:id";

    /// Datastream state.
    pub const DATASTREAM_STATE: &str = "urn:fedora:names:fedora:2.1:resource:datastream:state";

    /// Datastream MIME type.
    pub const DATASTREAM_MIME_TYPE: &str =
        "urn:fedora:names:fedora:2.1:resource:datastream:mimeType";

    /// Datastream format URI.
    pub const DATASTREAM_FORMAT_URI: &str =
        "urn:fedora:names:fedora:2.1:resource:datastream:formatUri";

    /// Datastream control group.
    pub const DATASTREAM_CONTROL_GROUP: &str =
        "urn:fedora:names:fedora:2.1:resource:datastream:controlGroup";

    /// Service definition PID of a dissemination.
    pub const SDEF_PID: &str = "urn:fedora:names:fedora:2.1:resource:sdef:pid";

    /// Method name of a dissemination.
    pub const DISSEMINATOR_METHOD: &str =
        "urn:fedora:names:fedora:2.1:resource:disseminator:method";

    /// As-of date of a versioned read.
    pub const AS_OF_DATETIME: &str = "urn:fedora:names:fedora:2.1:resource:asOfDateTime";

    /// Export/serialization format.
    pub const EXPORT_FORMAT: &str = "urn:fedora:names:fedora:2.1:resource:object:formatUri";

    /// Export context.
    pub const EXPORT_CONTEXT: &str = "urn:fedora:names:fedora:2.1:resource:object:context";

    /// Client IP address.
    pub const ENV_CLIENT_IP: &str =
        "urn:fedora:names:fedora:2.1:environment:httpRequest:clientIpAddress";

    /// HTTP method of the request.
    pub const ENV_METHOD: &str = "urn:fedora:names:fedora:2.1:environment:httpRequest:method";

    /// `secure` or `insecure`, depending on the transport.
    pub const ENV_SECURITY: &str = "urn:fedora:names:fedora:2.1:environment:httpRequest:security";

    /// Repository URI scheme prefix for object references in RDF.
    pub const INFO_FEDORA_PREFIX: &str = "info:fedora/";
}
