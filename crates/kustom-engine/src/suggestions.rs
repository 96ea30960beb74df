//! Fuzzy matching for "did you mean" hints
//!
//! Used when a directive selects nothing and when a kustomization carries an
//! unknown field, using Levenshtein distance over the known candidates.

use kustom_core::{ResourceMap, Selector};

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Top-level fields understood in a kustomization file
pub const KUSTOMIZATION_FIELDS: &[&str] = &[
    "apiVersion",
    "kind",
    "namePrefix",
    "nameSuffix",
    "namespace",
    "commonLabels",
    "commonAnnotations",
    "bases",
    "resources",
    "configMapGenerator",
    "secretGenerator",
    "generatorOptions",
    "patchesStrategicMerge",
    "patchesJson6902",
    "patches",
    "replacements",
];

/// Suggestion result with confidence scoring
#[derive(Debug, Clone)]
pub struct Suggestion {
    /// The suggested correction
    pub text: String,
    /// Levenshtein distance (lower = better match)
    pub distance: usize,
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Find closest matches from a list of candidates, best first
pub fn find_closest_matches(input: &str, candidates: &[&str], max_results: usize) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = levenshtein(input, candidate);
            if distance <= MAX_SUGGESTION_DISTANCE && distance > 0 {
                Some(Suggestion {
                    text: candidate.to_string(),
                    distance,
                })
            } else {
                None
            }
        })
        .collect();

    suggestions.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.text.cmp(&b.text)));
    suggestions.dedup_by(|a, b| a.text == b.text);
    suggestions.truncate(max_results);
    suggestions
}

/// Hint for a selector that matched nothing
///
/// Compares the selector's kind and name, with regex escapes dropped, against
/// the resources present.
pub fn suggest_for_selector(selector: &Selector, resources: &ResourceMap) -> Option<String> {
    let unescaped = |pattern: &str| pattern.replace('\\', "");
    if let Some(kind) = selector.kind.as_deref().map(unescaped) {
        let kind = kind.as_str();
        let kinds: Vec<&str> = resources.resources().map(|r| r.kind()).collect();
        if !kinds.contains(&kind) {
            let matches = find_closest_matches(kind, &kinds, 1);
            if let Some(best) = matches.first() {
                return Some(format!("Did you mean kind `{}`?", best.text));
            }
        }
    }

    let name = unescaped(selector.name.as_deref()?);
    let kind = selector.kind.as_deref().map(unescaped);
    let names: Vec<&str> = resources
        .resources()
        .filter(|r| kind.as_deref().is_none_or(|k| r.kind() == k))
        .flat_map(|r| std::iter::once(r.name()).chain(r.previous_names().iter().map(String::as_str)))
        .collect();

    let matches = find_closest_matches(&name, &names, 3);
    if matches.is_empty() {
        if names.is_empty() {
            return None;
        }
        let mut available = names;
        available.sort_unstable();
        available.dedup();
        return Some(format!("Available names: {}", available.join(", ")));
    }
    let quoted: Vec<String> = matches.iter().map(|s| format!("`{}`", s.text)).collect();
    Some(format!("Did you mean {}?", quoted.join(" or ")))
}

/// Hint for an unknown kustomization field
pub fn suggest_kustomization_field(field: &str) -> Option<String> {
    find_closest_matches(field, KUSTOMIZATION_FIELDS, 1)
        .first()
        .map(|s| format!("Did you mean `{}`?", s.text))
}
