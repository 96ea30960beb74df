//! Resource selection for patches, replacements and transformers
//!
//! Id fields are anchored regular expressions. A name or namespace matches when
//! it matches the resource's current value or its value before any transformer
//! renamed it, so directives can keep referring to resources as they were
//! authored.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::resource::Resource;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_selector: Option<String>,
}

impl Selector {
    /// Selector matching one kind and name exactly
    pub fn by_kind_name(kind: &str, name: &str) -> Self {
        Self {
            kind: Some(regex::escape(kind)),
            name: Some(regex::escape(name)),
            ..Default::default()
        }
    }

    pub fn compile(&self) -> Result<SelectorMatcher> {
        Ok(SelectorMatcher {
            group: compile_field(self.group.as_deref())?,
            version: compile_field(self.version.as_deref())?,
            kind: compile_field(self.kind.as_deref())?,
            name: compile_field(self.name.as_deref())?,
            namespace: compile_field(self.namespace.as_deref())?,
            labels: parse_requirements(self.label_selector.as_deref())?,
            annotations: parse_requirements(self.annotation_selector.as_deref())?,
        })
    }

    /// Human readable form for diagnostics
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        let fields = [
            ("group", &self.group),
            ("version", &self.version),
            ("kind", &self.kind),
            ("name", &self.name),
            ("namespace", &self.namespace),
            ("labelSelector", &self.label_selector),
            ("annotationSelector", &self.annotation_selector),
        ];
        for (label, value) in fields {
            if let Some(v) = value {
                parts.push(format!("{}={}", label, v));
            }
        }
        if parts.is_empty() {
            "<all resources>".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Compiled form of a [`Selector`]
#[derive(Debug, Clone)]
pub struct SelectorMatcher {
    group: Option<Regex>,
    version: Option<Regex>,
    kind: Option<Regex>,
    name: Option<Regex>,
    namespace: Option<Regex>,
    labels: Vec<Requirement>,
    annotations: Vec<Requirement>,
}

impl SelectorMatcher {
    pub fn matches(&self, res: &Resource) -> bool {
        let gvk = res.document().gvk();
        let origin = res.origin_id();

        field_matches(&self.group, &gvk.group)
            && field_matches(&self.version, &gvk.version)
            && field_matches(&self.kind, &gvk.kind)
            && (field_matches(&self.name, res.name())
                || res
                    .previous_names()
                    .iter()
                    .any(|n| field_matches(&self.name, n)))
            && (field_matches(&self.namespace, res.namespace())
                || field_matches(&self.namespace, &origin.namespace))
            && requirements_hold(&self.labels, &res.document().labels())
            && requirements_hold(&self.annotations, &res.document().annotations())
    }
}

fn compile_field(pattern: Option<&str>) -> Result<Option<Regex>> {
    match pattern {
        None | Some("") => Ok(None),
        Some(p) => Regex::new(&format!("^(?:{})$", p))
            .map(Some)
            .map_err(|e| CoreError::InvalidSelector {
                message: format!("bad pattern '{}': {}", p, e),
            }),
    }
}

fn field_matches(pattern: &Option<Regex>, value: &str) -> bool {
    pattern.as_ref().is_none_or(|re| re.is_match(value))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
    NotExists(String),
}

impl Requirement {
    fn holds(&self, map: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(k, v) => map.get(k) == Some(v),
            Requirement::NotEquals(k, v) => map.get(k) != Some(v),
            Requirement::Exists(k) => map.contains_key(k),
            Requirement::NotExists(k) => !map.contains_key(k),
        }
    }
}

fn requirements_hold(requirements: &[Requirement], map: &BTreeMap<String, String>) -> bool {
    requirements.iter().all(|r| r.holds(map))
}

/// Parse `k=v,k2!=v2,k3,!k4`
fn parse_requirements(selector: Option<&str>) -> Result<Vec<Requirement>> {
    let Some(selector) = selector else {
        return Ok(Vec::new());
    };
    let mut requirements = Vec::new();
    for raw in selector.split(',') {
        let term = raw.trim();
        if term.is_empty() {
            continue;
        }
        let requirement = if let Some((k, v)) = term.split_once("!=") {
            Requirement::NotEquals(k.trim().to_string(), v.trim().to_string())
        } else if let Some((k, v)) = term.split_once("==") {
            Requirement::Equals(k.trim().to_string(), v.trim().to_string())
        } else if let Some((k, v)) = term.split_once('=') {
            Requirement::Equals(k.trim().to_string(), v.trim().to_string())
        } else if let Some(k) = term.strip_prefix('!') {
            Requirement::NotExists(k.trim().to_string())
        } else {
            Requirement::Exists(term.to_string())
        };
        let key = match &requirement {
            Requirement::Equals(k, _)
            | Requirement::NotEquals(k, _)
            | Requirement::Exists(k)
            | Requirement::NotExists(k) => k,
        };
        if key.is_empty() {
            return Err(CoreError::InvalidSelector {
                message: format!("empty key in selector term '{}'", term),
            });
        }
        requirements.push(requirement);
    }
    Ok(requirements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use serde_json::json;

    fn deployment(name: &str, labels: serde_json::Value) -> Resource {
        Resource::new(Document::new(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": name, "labels": labels},
        })))
        .unwrap()
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let matcher = Selector::default().compile().unwrap();
        assert!(matcher.matches(&deployment("web", json!({}))));
    }

    #[test]
    fn test_name_regex_is_anchored() {
        let selector = Selector {
            name: Some("web".into()),
            ..Default::default()
        };
        let matcher = selector.compile().unwrap();
        assert!(matcher.matches(&deployment("web", json!({}))));
        assert!(!matcher.matches(&deployment("web-2", json!({}))));

        let wildcard = Selector {
            name: Some("web.*".into()),
            ..Default::default()
        };
        assert!(wildcard.compile().unwrap().matches(&deployment("web-2", json!({}))));
    }

    #[test]
    fn test_matches_previous_name() {
        let mut res = deployment("web", json!({}));
        res.set_name("prod-web").unwrap();
        let matcher = Selector::by_kind_name("Deployment", "web").compile().unwrap();
        assert!(matcher.matches(&res));
    }

    #[test]
    fn test_label_selector() {
        let res = deployment("web", json!({"tier": "frontend", "env": "prod"}));
        let check = |s: &str| {
            Selector {
                label_selector: Some(s.to_string()),
                ..Default::default()
            }
            .compile()
            .unwrap()
            .matches(&res)
        };
        assert!(check("tier=frontend"));
        assert!(check("tier=frontend,env"));
        assert!(!check("tier!=frontend"));
        assert!(check("!canary"));
        assert!(!check("env=staging"));
    }

    #[test]
    fn test_invalid_pattern() {
        let selector = Selector {
            kind: Some("(".into()),
            ..Default::default()
        };
        assert!(matches!(
            selector.compile().unwrap_err(),
            CoreError::InvalidSelector { .. }
        ));
    }

    #[test]
    fn test_describe() {
        let selector = Selector::by_kind_name("Deployment", "web");
        assert_eq!(selector.describe(), "kind=Deployment, name=web");
        assert_eq!(Selector::default().describe(), "<all resources>");
    }
}
