use kustom_core::{CoreError, FieldOptions, FieldPath, Replacement, ResourceMap};
use serde_json::Value as JsonValue;

use super::Transformer;
use crate::error::{EngineError, Result};

/// Copies one source field into target fields, in declaration order
///
/// The source selector must match exactly one resource. A target selector
/// may match none.
#[derive(Debug, Clone)]
pub struct ReplacementTransformer {
    replacements: Vec<Replacement>,
}

impl ReplacementTransformer {
    pub fn new(replacements: Vec<Replacement>) -> Self {
        Self { replacements }
    }
}

impl Transformer for ReplacementTransformer {
    fn transform(&self, resources: &mut ResourceMap) -> Result<()> {
        for (index, replacement) in self.replacements.iter().enumerate() {
            apply(resources, index, replacement)?;
        }
        Ok(())
    }
}

fn apply(resources: &mut ResourceMap, index: usize, replacement: &Replacement) -> Result<()> {
    let fail = |message: String| EngineError::Replacement { index, message };
    let source = &replacement.source;

    let matches = resources.select(&source.selector)?;
    let source_id = match matches.as_slice() {
        [id] => id.clone(),
        [] => return Err(fail(format!("source {} matches no resource", source.selector.describe()))),
        many => {
            return Err(fail(format!(
                "source {} matches {} resources, expected exactly one",
                source.selector.describe(),
                many.len()
            )));
        }
    };

    let path = FieldPath::parse(source.field_path())?;
    let value = match resources.get_by_id(&source_id) {
        Some(res) => res
            .document()
            .get_path(&path)
            .map_err(|e| fail(format!("reading {} of {}: {}", path, source_id, e)))?
            .clone(),
        None => return Err(CoreError::IdNotFound { id: source_id }.into()),
    };
    let value = match &source.options {
        Some(options) => extract_part(value, options).map_err(fail)?,
        None => value,
    };

    for target in &replacement.targets {
        let mut ids = resources.select(&target.select)?;
        for reject in &target.reject {
            let rejected = resources.select(reject)?;
            ids.retain(|id| !rejected.contains(id));
        }
        if ids.is_empty() {
            tracing::debug!(selector = %target.select.describe(), "replacement target matched nothing");
            continue;
        }

        let paths = target
            .field_paths
            .iter()
            .map(|p| FieldPath::parse(p))
            .collect::<kustom_core::Result<Vec<_>>>()?;
        let options = target.options.clone().unwrap_or_default();

        for id in ids {
            resources.update(&id, |res| {
                for path in &paths {
                    let doc = res.document_mut();
                    let next = match &options.delimiter {
                        Some(delimiter) => {
                            let current = match doc.get_path(path) {
                                Ok(JsonValue::String(s)) => s.clone(),
                                Ok(JsonValue::Null) | Err(CoreError::FieldNotFound { .. }) => String::new(),
                                Ok(_) => {
                                    return Err(fail(format!(
                                        "field {} of {} is not a string and cannot be split",
                                        path, id
                                    )));
                                }
                                Err(e) => return Err(e.into()),
                            };
                            JsonValue::String(
                                splice(&current, delimiter, options.index, &value).map_err(fail)?,
                            )
                        }
                        None => value.clone(),
                    };
                    doc.set_path(path, next, options.create).map_err(|e| match e {
                        CoreError::FieldNotFound { .. } => {
                            fail(format!("field {} not found in {} and create is not set", path, id))
                        }
                        other => other.into(),
                    })?;
                }
                Ok::<(), EngineError>(())
            })?;
        }
    }
    Ok(())
}

/// Pick part `index` of a delimited source value
fn extract_part(value: JsonValue, options: &FieldOptions) -> std::result::Result<JsonValue, String> {
    let Some(delimiter) = options.delimiter.as_deref() else {
        return Ok(value);
    };
    let JsonValue::String(text) = value else {
        return Err("source value is not a string and cannot be split".to_string());
    };
    let parts: Vec<&str> = text.split(delimiter).collect();
    usize::try_from(options.index)
        .ok()
        .and_then(|i| parts.get(i))
        .map(|part| JsonValue::String(part.to_string()))
        .ok_or_else(|| format!("index {} out of range for '{}'", options.index, text))
}

/// Replace part `index` of a delimited target value
///
/// A negative index prepends and an index past the end appends.
fn splice(
    current: &str,
    delimiter: &str,
    index: i64,
    value: &JsonValue,
) -> std::result::Result<String, String> {
    let replacement = match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(_) | JsonValue::Bool(_) => value.to_string(),
        _ => {
            return Err("only scalar values can be spliced into a delimited field".to_string());
        }
    };
    let mut parts: Vec<String> = if current.is_empty() {
        Vec::new()
    } else {
        current.split(delimiter).map(str::to_string).collect()
    };
    match usize::try_from(index) {
        Err(_) => parts.insert(0, replacement),
        Ok(i) if i >= parts.len() => parts.push(replacement),
        Ok(i) => parts[i] = replacement,
    }
    Ok(parts.join(delimiter))
}
