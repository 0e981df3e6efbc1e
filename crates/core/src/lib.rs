//! Data model shared by the encoder and the merge engine.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map as JsonMap, Number, Value as Json};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to read existing configuration")]
    Read(#[source] std::io::Error),
    #[error("failed to write configuration")]
    Write(#[source] std::io::Error),
    #[error("unsupported value at '{path}': {found} (expected a scalar, an object or a list of objects)")]
    UnsupportedShape { path: String, found: &'static str },
    #[error("resource data must be an object, found {found}")]
    NotAnObject { found: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar { String(String), Bool(bool), Number(Number) }

/// One field of a resource payload. Absent values render as nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Scalar(Option<Scalar>),
    Block(Option<ResourceData>),
    Blocks(Vec<ResourceData>),
}

/// Generic, possibly nested resource payload. Fields keep insertion order,
/// which is the order they are rendered in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceData { fields: Vec<(String, Field)> }

impl ResourceData {
    pub fn new() -> Self { Self::default() }

    pub fn field(mut self, key: impl Into<String>, field: Field) -> Self {
        self.fields.push((key.into(), field));
        self
    }

    pub fn string(self, key: impl Into<String>, v: impl Into<String>) -> Self {
        self.field(key, Field::Scalar(Some(Scalar::String(v.into()))))
    }
    pub fn opt_string(self, key: impl Into<String>, v: Option<impl Into<String>>) -> Self {
        self.field(key, Field::Scalar(v.map(|s| Scalar::String(s.into()))))
    }
    pub fn bool(self, key: impl Into<String>, v: bool) -> Self {
        self.field(key, Field::Scalar(Some(Scalar::Bool(v))))
    }
    pub fn opt_bool(self, key: impl Into<String>, v: Option<bool>) -> Self {
        self.field(key, Field::Scalar(v.map(Scalar::Bool)))
    }
    pub fn number(self, key: impl Into<String>, v: impl Into<Number>) -> Self {
        self.field(key, Field::Scalar(Some(Scalar::Number(v.into()))))
    }
    pub fn opt_number(self, key: impl Into<String>, v: Option<impl Into<Number>>) -> Self {
        self.field(key, Field::Scalar(v.map(|n| Scalar::Number(n.into()))))
    }
    pub fn block(self, key: impl Into<String>, v: ResourceData) -> Self {
        self.field(key, Field::Block(Some(v)))
    }
    pub fn opt_block(self, key: impl Into<String>, v: Option<ResourceData>) -> Self {
        self.field(key, Field::Block(v))
    }
    pub fn blocks(self, key: impl Into<String>, v: Vec<ResourceData>) -> Self {
        self.field(key, Field::Blocks(v))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(k, f)| (k.as_str(), f))
    }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    /// Converts a JSON object, reporting unsupported shapes relative to `prefix`.
    pub fn from_json_at(v: &Json, prefix: &str) -> Result<Self, EngineError> {
        match v {
            Json::Object(m) => from_object(m, prefix),
            other => Err(EngineError::NotAnObject { found: kind(other) }),
        }
    }
}

impl TryFrom<&Json> for ResourceData {
    type Error = EngineError;
    fn try_from(v: &Json) -> Result<Self, Self::Error> { Self::from_json_at(v, "") }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() { key.to_string() } else { format!("{prefix}.{key}") }
}

fn kind(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "list",
        Json::Object(_) => "object",
    }
}

fn from_object(m: &JsonMap<String, Json>, prefix: &str) -> Result<ResourceData, EngineError> {
    let mut data = ResourceData::new();
    for (k, v) in m {
        let path = join(prefix, k);
        let field = match v {
            Json::Null => Field::Scalar(None),
            Json::Bool(b) => Field::Scalar(Some(Scalar::Bool(*b))),
            Json::Number(n) => Field::Scalar(Some(Scalar::Number(n.clone()))),
            Json::String(s) => Field::Scalar(Some(Scalar::String(s.clone()))),
            Json::Object(inner) => Field::Block(Some(from_object(inner, &path)?)),
            Json::Array(items) => {
                let mut blocks = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{path}[{i}]");
                    match item {
                        Json::Object(inner) => blocks.push(from_object(inner, &item_path)?),
                        other => return Err(EngineError::UnsupportedShape { path: item_path, found: kind(other) }),
                    }
                }
                Field::Blocks(blocks)
            }
        };
        data.fields.push((k.clone(), field));
    }
    Ok(data)
}

/// A resource as handed over by an importer. `content` is the pre-rendered
/// body placed between the braces on merge; empty means `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub provider: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    #[serde(default, deserialize_with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub import_id: Option<String>,
    #[serde(skip)]
    pub content: Vec<u8>,
}

// Remote ids are often integers in importer output.
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Option::<Json>::deserialize(d)? {
        None | Some(Json::Null) => Ok(None),
        Some(Json::String(s)) => Ok(Some(s)),
        Some(Json::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!("import_id must be a string or a number, found {}", kind(&other)))),
    }
}

impl ResourceDefinition {
    pub fn new(provider: impl Into<String>, type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self { provider: provider.into(), type_name: type_name.into(), name: name.into(), ..Self::default() }
    }

    pub fn with_import_id(mut self, id: impl Into<String>) -> Self {
        self.import_id = Some(id.into());
        self
    }

    /// `type.name`, the key resources are deduplicated on.
    pub fn address(&self) -> String { format!("{}.{}", self.type_name, self.name) }

    pub fn provider_key(&self) -> &str { &self.provider }
}

/// Occurrences of resource addresses and provider names seen in a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionCounts {
    resources: HashMap<String, usize>,
    providers: HashMap<String, usize>,
}

impl DefinitionCounts {
    pub fn record_resource(&mut self, address: impl Into<String>) {
        *self.resources.entry(address.into()).or_default() += 1;
    }
    pub fn record_provider(&mut self, name: impl Into<String>) {
        *self.providers.entry(name.into()).or_default() += 1;
    }
    pub fn resource_count(&self, address: &str) -> usize { self.resources.get(address).copied().unwrap_or(0) }
    pub fn provider_count(&self, name: &str) -> usize { self.providers.get(name).copied().unwrap_or(0) }
    pub fn resources(&self) -> &HashMap<String, usize> { &self.resources }
    pub fn providers(&self) -> &HashMap<String, usize> { &self.providers }
}

/// Subset of a Terraform state document needed to regenerate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct State {
    #[serde(default)]
    pub resources: Vec<StateResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateResource {
    #[serde(default = "managed")]
    pub mode: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub instances: Vec<ResourceInstance>,
}

fn managed() -> String { "managed".to_string() }

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceInstance {
    #[serde(default)]
    pub attributes: Json,
}

/// Input to the full-dump renderer. `provider` is the raw state provider
/// attribute, e.g. `provider.onelogin`.
#[derive(Debug, Clone, PartialEq)]
pub struct FullDumpResource {
    pub name: String,
    pub type_name: String,
    pub provider: String,
    pub data: ResourceData,
}

impl State {
    pub fn full_dump_resources(&self) -> Result<Vec<FullDumpResource>, EngineError> {
        let mut out = Vec::with_capacity(self.resources.len());
        for r in &self.resources {
            let address = format!("{}.{}", r.type_name, r.name);
            if r.mode == "data" {
                tracing::debug!(%address, "skipping data source");
                continue;
            }
            if r.instances.len() > 1 {
                tracing::warn!(%address, instances = r.instances.len(), "only the first instance is rendered");
            }
            let data = match r.instances.first().map(|i| &i.attributes) {
                None | Some(Json::Null) => ResourceData::new(),
                Some(attrs) => ResourceData::from_json_at(attrs, &address)?,
            };
            out.push(FullDumpResource {
                name: r.name.clone(),
                type_name: r.type_name.clone(),
                provider: r.provider.clone(),
                data,
            });
        }
        Ok(out)
    }
}
