//! Structured document tree with typed path accessors
//!
//! A [`Document`] holds one decoded resource (maps, sequences and scalars) as a
//! `serde_json::Value`. Fields are addressed either by a [`FieldPath`]
//! (`spec.template.spec.containers.[name=app].image`) or by raw segments
//! (`&["metadata", "labels"]`) when keys may themselves contain dots.
//!
//! Accessors never panic: a missing field yields [`CoreError::FieldNotFound`] and
//! a wrongly shaped intermediate yields [`CoreError::TypeMismatch`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{CoreError, Result};
use crate::resid::{Gvk, ResId};

/// One step of a [`FieldPath`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Map key
    Key(String),
    /// Sequence index
    Index(usize),
    /// Sequence element whose `key` field equals `value`
    Match { key: String, value: String },
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{}", key),
            PathSegment::Index(index) => write!(f, "{}", index),
            PathSegment::Match { key, value } => write!(f, "[{}={}]", key, value),
        }
    }
}

/// Parsed field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    /// Parse a dotted path
    ///
    /// Supported forms: `a.b`, `a.0`, `a.[k=v]` and `a[k=v]`.
    pub fn parse(path: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for part in path.split('.') {
            if part.is_empty() {
                return Err(CoreError::InvalidResource {
                    message: format!("empty segment in field path '{}'", path),
                });
            }
            let (key, bracket) = match part.find('[') {
                Some(0) => ("", part),
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if !key.is_empty() {
                match key.parse::<usize>() {
                    Ok(index) => segments.push(PathSegment::Index(index)),
                    Err(_) => segments.push(PathSegment::Key(key.to_string())),
                }
            }
            if !bracket.is_empty() {
                let inner = bracket
                    .strip_prefix('[')
                    .and_then(|s| s.strip_suffix(']'))
                    .ok_or_else(|| CoreError::InvalidResource {
                        message: format!("unterminated '[' in field path '{}'", path),
                    })?;
                let (k, v) = inner.split_once('=').ok_or_else(|| CoreError::InvalidResource {
                    message: format!("expected [key=value] in field path '{}'", path),
                })?;
                segments.push(PathSegment::Match {
                    key: k.to_string(),
                    value: v.to_string(),
                });
            }
        }
        Ok(Self(segments))
    }

    /// Build a path out of plain map keys
    pub fn from_keys(keys: &[&str]) -> Self {
        Self(keys.iter().map(|k| PathSegment::Key(k.to_string())).collect())
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// A single structured configuration document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(JsonValue);

impl Document {
    /// Wrap an already decoded value
    pub fn new(value: JsonValue) -> Self {
        Self(value)
    }

    /// Parse a single YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Ok(Self(value))
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }

    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    pub fn inner_mut(&mut self) -> &mut JsonValue {
        &mut self.0
    }

    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    pub fn api_version(&self) -> &str {
        self.lookup_in(&["apiVersion"])
            .and_then(JsonValue::as_str)
            .unwrap_or("")
    }

    pub fn kind(&self) -> &str {
        self.lookup_in(&["kind"]).and_then(JsonValue::as_str).unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.lookup_in(&["metadata", "name"])
            .and_then(JsonValue::as_str)
            .unwrap_or("")
    }

    pub fn namespace(&self) -> &str {
        self.lookup_in(&["metadata", "namespace"])
            .and_then(JsonValue::as_str)
            .unwrap_or("")
    }

    pub fn gvk(&self) -> Gvk {
        Gvk::from_api_version(self.api_version(), self.kind())
    }

    /// Identity derived from the document's own fields
    pub fn id(&self) -> ResId {
        ResId::new(self.gvk(), self.name(), self.namespace())
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.set_in(&["metadata", "name"], JsonValue::String(name.to_string()))
    }

    /// Set the namespace; an empty namespace removes the field
    pub fn set_namespace(&mut self, namespace: &str) -> Result<()> {
        if namespace.is_empty() {
            self.remove_in(&["metadata", "namespace"])?;
            Ok(())
        } else {
            self.set_in(
                &["metadata", "namespace"],
                JsonValue::String(namespace.to_string()),
            )
        }
    }

    /// Labels as a string map (non-string values are skipped)
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.string_map_in(&["metadata", "labels"])
    }

    /// Annotations as a string map (non-string values are skipped)
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.string_map_in(&["metadata", "annotations"])
    }

    fn string_map_in(&self, keys: &[&str]) -> BTreeMap<String, String> {
        self.lookup_in(keys)
            .and_then(JsonValue::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Result<&JsonValue> {
        let parsed = FieldPath::parse(path)?;
        self.get_path(&parsed)
    }

    /// Get a string by dotted path
    pub fn get_str(&self, path: &str) -> Result<&str> {
        self.get(path)?
            .as_str()
            .ok_or_else(|| CoreError::mismatch(path, "string"))
    }

    /// Set a value by dotted path, creating intermediate maps
    pub fn set(&mut self, path: &str, value: JsonValue) -> Result<()> {
        let parsed = FieldPath::parse(path)?;
        self.set_path(&parsed, value, true)
    }

    /// Lookup by raw key segments, `None` when any step is absent or not a map
    pub fn lookup_in(&self, keys: &[&str]) -> Option<&JsonValue> {
        let mut current = &self.0;
        for key in keys {
            current = current.as_object()?.get(*key)?;
        }
        Some(current)
    }

    /// Set by raw key segments, creating intermediate maps
    pub fn set_in(&mut self, keys: &[&str], value: JsonValue) -> Result<()> {
        self.set_path(&FieldPath::from_keys(keys), value, true)
    }

    /// Remove by raw key segments, returning the removed value
    pub fn remove_in(&mut self, keys: &[&str]) -> Result<Option<JsonValue>> {
        let Some((last, parents)) = keys.split_last() else {
            return Ok(None);
        };
        let mut current = &mut self.0;
        for (i, key) in parents.iter().enumerate() {
            let trail = keys[..=i].join(".");
            current = match current {
                JsonValue::Object(map) => match map.get_mut(*key) {
                    Some(child) => child,
                    None => return Ok(None),
                },
                _ => return Err(CoreError::mismatch(trail, "map")),
            };
        }
        match current {
            JsonValue::Object(map) => Ok(map.remove(*last)),
            JsonValue::Null => Ok(None),
            _ => Err(CoreError::mismatch(parents.join("."), "map")),
        }
    }

    /// Resolve a parsed path
    pub fn get_path(&self, path: &FieldPath) -> Result<&JsonValue> {
        let mut current = &self.0;
        let mut trail = Vec::new();
        for segment in path.segments() {
            trail.push(segment.to_string());
            current = step(current, segment).map_err(|expected| match expected {
                None => CoreError::not_found(trail.join(".")),
                Some(kind) => CoreError::mismatch(trail.join("."), kind),
            })?;
        }
        Ok(current)
    }

    /// Set a value at a parsed path
    ///
    /// With `create`, missing map keys along the way are created. Sequence
    /// steps (`Index`, `Match`) must always resolve to an existing element.
    pub fn set_path(&mut self, path: &FieldPath, value: JsonValue, create: bool) -> Result<()> {
        let segments = path.segments();
        let Some((last, parents)) = segments.split_last() else {
            self.0 = value;
            return Ok(());
        };

        let mut current = &mut self.0;
        let mut trail = Vec::new();
        for segment in parents {
            trail.push(segment.to_string());
            current = step_mut(current, segment, create).map_err(|expected| match expected {
                None => CoreError::not_found(trail.join(".")),
                Some(kind) => CoreError::mismatch(trail.join("."), kind),
            })?;
        }
        trail.push(last.to_string());

        match (current, last) {
            (JsonValue::Object(map), PathSegment::Key(key)) => {
                if !create && !map.contains_key(key) {
                    return Err(CoreError::not_found(trail.join(".")));
                }
                map.insert(key.clone(), value);
                Ok(())
            }
            (slot @ JsonValue::Null, PathSegment::Key(key)) if create => {
                let mut map = Map::new();
                map.insert(key.clone(), value);
                *slot = JsonValue::Object(map);
                Ok(())
            }
            (JsonValue::Array(items), PathSegment::Index(index)) => match items.get_mut(*index) {
                Some(item) => {
                    *item = value;
                    Ok(())
                }
                None => Err(CoreError::not_found(trail.join("."))),
            },
            (JsonValue::Array(items), PathSegment::Match { key, value: wanted }) => {
                match items.iter_mut().find(|item| matches_element(item, key, wanted)) {
                    Some(item) => {
                        *item = value;
                        Ok(())
                    }
                    None => Err(CoreError::not_found(trail.join("."))),
                }
            }
            (_, PathSegment::Key(_)) => Err(CoreError::mismatch(trail.join("."), "map")),
            (_, _) => Err(CoreError::mismatch(trail.join("."), "sequence")),
        }
    }

    /// Visit every field addressed by a `/`-separated field spec path
    ///
    /// Sequences met along the way are traversed element by element. Missing
    /// fields are skipped unless `create` is set, in which case intermediate
    /// maps are created and the leaf is handed to `visit` as `null`.
    pub fn visit_fields_mut<F>(&mut self, path: &str, create: bool, visit: &mut F) -> Result<()>
    where
        F: FnMut(&mut JsonValue) -> Result<()>,
    {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        visit_fields(&mut self.0, &segments, create, &mut Vec::new(), visit)
    }
}

impl From<JsonValue> for Document {
    fn from(value: JsonValue) -> Self {
        Self(value)
    }
}

fn matches_element(item: &JsonValue, key: &str, wanted: &str) -> bool {
    match item.get(key) {
        Some(JsonValue::String(s)) => s == wanted,
        Some(other) if !other.is_null() => other.to_string() == wanted,
        _ => false,
    }
}

/// One read step; `Err(None)` means absent, `Err(Some(kind))` a shape mismatch
fn step<'a>(
    current: &'a JsonValue,
    segment: &PathSegment,
) -> std::result::Result<&'a JsonValue, Option<&'static str>> {
    match (current, segment) {
        (JsonValue::Object(map), PathSegment::Key(key)) => map.get(key).ok_or(None),
        (JsonValue::Array(items), PathSegment::Index(index)) => items.get(*index).ok_or(None),
        (JsonValue::Array(items), PathSegment::Match { key, value }) => items
            .iter()
            .find(|item| matches_element(item, key, value))
            .ok_or(None),
        (JsonValue::Null, _) => Err(None),
        (_, PathSegment::Key(_)) => Err(Some("map")),
        (_, _) => Err(Some("sequence")),
    }
}

fn step_mut<'a>(
    current: &'a mut JsonValue,
    segment: &PathSegment,
    create: bool,
) -> std::result::Result<&'a mut JsonValue, Option<&'static str>> {
    if create && current.is_null() && matches!(segment, PathSegment::Key(_)) {
        *current = JsonValue::Object(Map::new());
    }
    match (current, segment) {
        (JsonValue::Object(map), PathSegment::Key(key)) => {
            if create {
                let child = map
                    .entry(key.clone())
                    .or_insert_with(|| JsonValue::Object(Map::new()));
                if child.is_null() {
                    *child = JsonValue::Object(Map::new());
                }
                Ok(child)
            } else {
                map.get_mut(key).ok_or(None)
            }
        }
        (JsonValue::Array(items), PathSegment::Index(index)) => items.get_mut(*index).ok_or(None),
        (JsonValue::Array(items), PathSegment::Match { key, value }) => items
            .iter_mut()
            .find(|item| matches_element(item, key, value))
            .ok_or(None),
        (JsonValue::Null, _) => Err(None),
        (_, PathSegment::Key(_)) => Err(Some("map")),
        (_, _) => Err(Some("sequence")),
    }
}

fn visit_fields<F>(
    value: &mut JsonValue,
    segments: &[&str],
    create: bool,
    trail: &mut Vec<String>,
    visit: &mut F,
) -> Result<()>
where
    F: FnMut(&mut JsonValue) -> Result<()>,
{
    let Some((first, rest)) = segments.split_first() else {
        return visit(value);
    };

    match value {
        JsonValue::Array(items) => {
            for item in items.iter_mut() {
                visit_fields(item, segments, create, trail, visit)?;
            }
            Ok(())
        }
        JsonValue::Object(map) => {
            trail.push(first.to_string());
            let present = map.get(*first).is_some_and(|v| !v.is_null() || rest.is_empty());
            let result = if present {
                match map.get_mut(*first) {
                    Some(child) => visit_fields(child, rest, create, trail, visit),
                    None => Ok(()),
                }
            } else if create {
                let seed = if rest.is_empty() {
                    JsonValue::Null
                } else {
                    JsonValue::Object(Map::new())
                };
                map.insert(first.to_string(), seed);
                match map.get_mut(*first) {
                    Some(child) => visit_fields(child, rest, create, trail, visit),
                    None => Ok(()),
                }
            } else {
                Ok(())
            };
            trail.pop();
            result
        }
        JsonValue::Null => Ok(()),
        _ => Err(CoreError::mismatch(trail.join("."), "map")),
    }
}
