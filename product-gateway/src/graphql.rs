//! Types related to the GraphQL requests and responses exchanged with the upstream.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// A json object
pub type Object = Map<String, Value>;

/// A GraphQL `Request` as sent to the upstream.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// The GraphQL document text.
    pub query: String,

    /// The variables referenced by the document, keyed by name without the `$`.
    #[serde(
        skip_serializing_if = "Object::is_empty",
        default,
        deserialize_with = "deserialize_null_default"
    )]
    pub variables: Object,
}

// transforms `null` to Default::default()
fn deserialize_null_default<'de, D, T: Default + Deserialize<'de>>(
    deserializer: D,
) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
{
    <Option<T>>::deserialize(deserializer).map(|x| x.unwrap_or_default())
}

impl Request {
    pub fn new(query: impl Into<String>, variables: Object) -> Self {
        Self {
            query: query.into(),
            variables,
        }
    }
}

/// The top level envelope of a GraphQL response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        default,
        deserialize_with = "deserialize_null_default"
    )]
    pub errors: Vec<Error>,

    /// The optional graphql extensions.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

impl Response {
    /// Returns the value of `data.<field>`.
    ///
    /// `None` means the field is absent, which is different from an explicit `null`.
    pub fn field(&self, field: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.get(field))
    }
}

/// A [GraphQL error](https://spec.graphql.org/October2021/#sec-Errors)
/// as found in the `errors` field of an upstream [`Response`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Error {
    /// The error message. Upstreams that omit it still yield an error.
    #[serde(default)]
    pub message: String,

    /// The locations of the error in the upstream document.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub locations: Vec<Location>,

    /// If this is a field error, the JSON path to that field.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<Vec<Value>>,

    /// The optional GraphQL extensions for this error.
    #[serde(default, skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

/// Displays (only) the error message.
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

/// A location in the document of a graphql error.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}
