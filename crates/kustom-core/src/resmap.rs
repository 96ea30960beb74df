//! Ordered working set of resources for one build layer
//!
//! Entries keep insertion order so that output is deterministic. The key of an
//! entry always equals the id derived from its resource's document: all
//! identity changes go through [`ResourceMap::update`] or
//! [`ResourceMap::rekey`], which move the entry to its new key in place.

use indexmap::IndexMap;
use similar::TextDiff;

use crate::document::Document;
use crate::error::{CoreError, Result};
use crate::resid::ResId;
use crate::resource::Resource;
use crate::selector::Selector;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceMap {
    entries: IndexMap<ResId, Resource>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from resources, failing on the first duplicate id
    pub fn from_resources(resources: impl IntoIterator<Item = Resource>) -> Result<Self> {
        let mut map = Self::new();
        for res in resources {
            map.append(res)?;
        }
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids in insertion order
    pub fn ids(&self) -> Vec<ResId> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResId, &Resource)> {
        self.entries.iter()
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.entries.values()
    }

    pub fn into_resources(self) -> Vec<Resource> {
        self.entries.into_values().collect()
    }

    pub fn contains(&self, id: &ResId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get_by_id(&self, id: &ResId) -> Option<&Resource> {
        self.entries.get(id)
    }

    /// Find the entry a same-identity resource should reconcile with
    ///
    /// An exact id match wins; otherwise the single resource whose original
    /// identity equals `id` is returned.
    pub fn find_for_merge(&self, id: &ResId) -> Option<ResId> {
        if self.entries.contains_key(id) {
            return Some(id.clone());
        }
        let mut candidates = self
            .entries
            .iter()
            .filter(|(_, res)| res.origin_id() == id)
            .map(|(key, _)| key.clone());
        match (candidates.next(), candidates.next()) {
            (Some(found), None) => Some(found),
            _ => None,
        }
    }

    /// Add a resource
    ///
    /// The incoming resource collides with an entry holding its current id or
    /// its original id. A collision is only acceptable when the incoming
    /// behavior is merge or replace; those behaviors in turn require one.
    pub fn append(&mut self, res: Resource) -> Result<()> {
        let id = res.id();
        let existing = self
            .find_for_merge(&id)
            .or_else(|| self.find_for_merge(res.origin_id()));
        match existing {
            Some(existing) if res.behavior().allows_existing() => {
                self.update(&existing, |current| current.merge(res))?;
                Ok(())
            }
            Some(_) => Err(CoreError::DuplicateId { id }),
            None if res.behavior().allows_existing() => Err(CoreError::MergeConflict {
                id,
                message: format!(
                    "behavior '{}' requires an existing resource, found none",
                    res.behavior()
                ),
            }),
            None => {
                self.entries.insert(id, res);
                Ok(())
            }
        }
    }

    /// Fold every resource of `other` into this map
    ///
    /// Stops at the first conflict; on error this map is left unchanged.
    pub fn merge(&mut self, other: ResourceMap) -> Result<()> {
        let mut staged = self.clone();
        for res in other.into_resources() {
            staged.append(res)?;
        }
        *self = staged;
        Ok(())
    }

    /// Ids of resources satisfying `predicate`, in insertion order
    pub fn get_matching_ids<P>(&self, predicate: P) -> Vec<ResId>
    where
        P: Fn(&Resource) -> bool,
    {
        self.entries
            .iter()
            .filter(|(_, res)| predicate(res))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Ids selected by a [`Selector`], in insertion order
    pub fn select(&self, selector: &Selector) -> Result<Vec<ResId>> {
        let matcher = selector.compile()?;
        Ok(self.get_matching_ids(|res| matcher.matches(res)))
    }

    /// Deep copy of the resources satisfying `predicate`
    pub fn filter<P>(&self, predicate: P) -> ResourceMap
    where
        P: Fn(&Resource) -> bool,
    {
        ResourceMap {
            entries: self
                .entries
                .iter()
                .filter(|(_, res)| predicate(res))
                .map(|(id, res)| (id.clone(), res.deep_copy()))
                .collect(),
        }
    }

    pub fn remove(&mut self, id: &ResId) -> Result<Resource> {
        self.entries
            .shift_remove(id)
            .ok_or_else(|| CoreError::IdNotFound { id: id.clone() })
    }

    /// Swap the document of an entry, re-keying if the new document's id differs
    pub fn replace(&mut self, id: &ResId, doc: Document) -> Result<ResId> {
        self.update(id, |res| {
            let name = doc.name().to_string();
            let mut doc = doc;
            doc.set_name(res.name())?;
            *res.document_mut() = doc;
            res.set_name(&name)
        })
    }

    /// Move an entry to a new id, renaming its document accordingly
    pub fn rekey(&mut self, old: &ResId, new: &ResId) -> Result<()> {
        if old.gvk != new.gvk {
            return Err(CoreError::InvalidResource {
                message: format!("cannot re-key {} to {}: kinds differ", old, new),
            });
        }
        self.update(old, |res| {
            res.set_name(&new.name)?;
            res.set_namespace(&new.namespace)
        })?;
        Ok(())
    }

    /// Mutate one resource, re-keying the entry if its identity changed
    ///
    /// Returns the id the entry is stored under afterwards. If `mutate` fails,
    /// or the new id is already taken by another resource, the resource is
    /// restored as it was.
    pub fn update<F, E>(&mut self, id: &ResId, mutate: F) -> std::result::Result<ResId, E>
    where
        F: FnOnce(&mut Resource) -> std::result::Result<(), E>,
        E: From<CoreError>,
    {
        let Some((index, _, res)) = self.entries.get_full_mut(id) else {
            return Err(CoreError::IdNotFound { id: id.clone() }.into());
        };
        let snapshot = res.clone();
        if let Err(e) = mutate(res) {
            *res = snapshot;
            return Err(e);
        }
        let new_id = res.id();
        if &new_id == id {
            return Ok(new_id);
        }
        if self.entries.contains_key(&new_id) {
            if let Some((_, res)) = self.entries.get_index_mut(index) {
                *res = snapshot;
            }
            return Err(CoreError::DuplicateId { id: new_id }.into());
        }
        if let Some((_, res)) = self.entries.shift_remove_index(index) {
            self.entries.shift_insert(index, new_id.clone(), res);
        }
        Ok(new_id)
    }

    /// Structural comparison independent of entry order
    pub fn error_if_not_equal(&self, other: &ResourceMap) -> Result<()> {
        if self.len() != other.len() {
            return Err(CoreError::NotEqual {
                message: format!(
                    "expected {} resources, found {}",
                    self.len(),
                    other.len()
                ),
            });
        }
        for (id, res) in &self.entries {
            let Some(theirs) = other.entries.get(id) else {
                return Err(CoreError::NotEqual {
                    message: format!("{} missing from the other map", id),
                });
            };
            if res.document() != theirs.document() {
                let ours = res.document().to_yaml().unwrap_or_default();
                let found = theirs.document().to_yaml().unwrap_or_default();
                let diff = TextDiff::from_lines(&ours, &found)
                    .unified_diff()
                    .header("expected", "found")
                    .to_string();
                return Err(CoreError::NotEqual {
                    message: format!("{} differs\n{}", id, diff),
                });
            }
        }
        Ok(())
    }

    /// Serialize as a YAML stream, one document per resource in map order
    pub fn as_yaml(&self) -> Result<String> {
        let mut out = String::new();
        for (i, res) in self.entries.values().enumerate() {
            if i > 0 {
                out.push_str("---\n");
            }
            out.push_str(&res.document().to_yaml()?);
        }
        Ok(out)
    }
}

impl IntoIterator for ResourceMap {
    type Item = Resource;
    type IntoIter = indexmap::map::IntoValues<ResId, Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}
