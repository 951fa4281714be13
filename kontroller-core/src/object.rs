//! Decoded objects and object lists.
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{Error, ResourceVersion, Result};

/// A single object mirrored from the remote API
///
/// The identity fields are lifted out of the object's `metadata` when it is decoded;
/// everything else stays in `payload`, untouched, for the application to interpret.
/// Within a cache an object is identified by `(kind, uid)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceObject {
    /// The kind of the object, e.g. `Job`
    pub kind: String,
    /// The API version the object was served under, e.g. `batch/v1`
    pub api_version: String,
    /// The namespace of the object
    ///
    /// Empty for cluster-scoped objects.
    pub namespace: String,
    /// The name of the object
    pub name: String,
    /// The unique identifier of the object, stable for the object's lifetime
    pub uid: String,
    /// The version of the object at the time it was observed
    pub resource_version: ResourceVersion,
    /// When the object was created, if the source reported it
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// The full object as received, minus `metadata.managedFields`
    pub payload: Value,
}

impl ResourceObject {
    /// Create a bare object of `kind` with a name and uid
    ///
    /// Mostly useful for tests and for sources that build objects by hand.
    #[must_use]
    pub fn new(kind: &str, name: &str, uid: &str) -> Self {
        Self {
            kind: kind.into(),
            api_version: String::new(),
            namespace: String::new(),
            name: name.into(),
            uid: uid.into(),
            resource_version: ResourceVersion::default(),
            creation_timestamp: None,
            payload: Value::Null,
        }
    }

    /// Place the object in a namespace
    #[must_use]
    pub fn within(mut self, namespace: &str) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the observed resource version
    #[must_use]
    pub fn with_resource_version(mut self, rv: impl Into<ResourceVersion>) -> Self {
        self.resource_version = rv.into();
        self
    }

    /// Set the creation timestamp
    #[must_use]
    pub fn created_at(mut self, ts: DateTime<Utc>) -> Self {
        self.creation_timestamp = Some(ts);
        self
    }

    /// Attach an arbitrary payload
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// The `(kind, uid)` pair the object is cached under
    #[must_use]
    pub fn key(&self) -> (&str, &str) {
        (&self.kind, &self.uid)
    }

    /// Whether the object lives in a namespace
    #[must_use]
    pub fn is_namespaced(&self) -> bool {
        !self.namespace.is_empty()
    }

    /// Time elapsed between creation and `now`
    ///
    /// `None` when the creation timestamp is unknown.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.creation_timestamp.map(|created| now - created)
    }

    /// Decode an object from its JSON representation in the Kubernetes object model
    ///
    /// `metadata.name` and `metadata.uid` are required. `kind` and `apiVersion` may be
    /// missing (list items usually omit them); callers are expected to fill them in.
    ///
    /// # Errors
    /// Fails when the value is not an object, when an identity field is missing, or when
    /// `resourceVersion`/`creationTimestamp` cannot be parsed.
    pub fn from_value(mut value: Value) -> Result<Self> {
        strip_managed_fields(&mut value);
        let header = Header::deserialize(&value)?;
        let meta = header.metadata;

        let name = meta.name.filter(|s| !s.is_empty()).ok_or(Error::MissingField("metadata.name"))?;
        let uid = meta.uid.filter(|s| !s.is_empty()).ok_or(Error::MissingField("metadata.uid"))?;
        let resource_version = meta.resource_version.as_deref().unwrap_or_default().parse()?;
        let creation_timestamp = meta
            .creation_timestamp
            .map(|ts| {
                DateTime::parse_from_rfc3339(&ts)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| Error::InvalidTimestamp(ts, e))
            })
            .transpose()?;

        Ok(Self {
            kind: header.kind,
            api_version: header.api_version,
            namespace: meta.namespace.unwrap_or_default(),
            name,
            uid,
            resource_version,
            creation_timestamp,
            payload: value,
        })
    }

    /// Render the object back into the Kubernetes object model
    ///
    /// The identity fields are written over whatever the payload holds.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut obj = match &self.payload {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        obj.insert("kind".into(), Value::String(self.kind.clone()));
        obj.insert("apiVersion".into(), Value::String(self.api_version.clone()));

        let meta = obj
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !meta.is_object() {
            *meta = Value::Object(Map::new());
        }
        if let Value::Object(meta) = meta {
            meta.insert("name".into(), Value::String(self.name.clone()));
            meta.insert("uid".into(), Value::String(self.uid.clone()));
            meta.insert(
                "resourceVersion".into(),
                Value::String(self.resource_version.to_string()),
            );
            if self.is_namespaced() {
                meta.insert("namespace".into(), Value::String(self.namespace.clone()));
            }
            if let Some(ts) = self.creation_timestamp {
                meta.insert(
                    "creationTimestamp".into(),
                    Value::String(ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
                );
            }
        }
        Value::Object(obj)
    }
}

/// Identity string used in logs: `uid Kind/namespace/name`, or `uid Kind/name` when cluster-scoped
impl fmt::Display for ResourceObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/", self.uid, self.kind)?;
        if self.is_namespaced() {
            write!(f, "{}/", self.namespace)?;
        }
        write!(f, "{}", self.name)
    }
}

impl Serialize for ResourceObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourceObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(de::Error::custom)
    }
}

/// The result of a list call
///
/// Carries the resume token the subsequent watch should start from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectList {
    /// The list kind, e.g. `JobList`
    pub kind: String,
    /// The API version of the listed objects
    pub api_version: String,
    /// The resume token of the list as a whole
    pub resource_version: ResourceVersion,
    /// The listed objects, in the order the source returned them
    pub items: Vec<ResourceObject>,
}

impl ObjectList {
    /// The kind of the listed items: the list kind with its `List` suffix removed
    #[must_use]
    pub fn item_kind(&self) -> &str {
        self.kind.strip_suffix("List").unwrap_or(&self.kind)
    }

    /// Fill in `kind` and `apiVersion` on items that came without them
    #[must_use]
    pub fn stamp_items(mut self) -> Self {
        let kind = self.item_kind().to_string();
        for item in &mut self.items {
            if item.kind.is_empty() {
                item.kind.clone_from(&kind);
            }
            if item.api_version.is_empty() {
                item.api_version.clone_from(&self.api_version);
            }
        }
        self
    }

    /// Decode a list from its JSON representation
    ///
    /// # Errors
    /// Fails if the list metadata or any item cannot be decoded.
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawList = serde_json::from_value(value)?;
        let items = raw
            .items
            .into_iter()
            .map(ResourceObject::from_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            kind: raw.kind,
            api_version: raw.api_version,
            resource_version: raw.metadata.resource_version.as_deref().unwrap_or_default().parse()?,
            items,
        }
        .stamp_items())
    }
}

fn strip_managed_fields(v: &mut Value) {
    if let Some(meta) = v.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.remove("managedFields");
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    metadata: HeaderMeta,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct HeaderMeta {
    name: Option<String>,
    namespace: Option<String>,
    uid: Option<String>,
    resource_version: Option<String>,
    creation_timestamp: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawList {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    metadata: RawListMeta,
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawListMeta {
    resource_version: Option<String>,
}
