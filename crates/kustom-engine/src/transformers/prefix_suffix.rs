use kustom_core::ResourceMap;

use super::Transformer;
use crate::config::TransformerConfig;
use crate::error::Result;

/// Adds `namePrefix` and `nameSuffix` to every resource name
///
/// A content-hash suffix stays last: `cm-<hash>` becomes
/// `<prefix>cm<suffix>-<hash>`.
#[derive(Debug, Clone)]
pub struct PrefixSuffixTransformer {
    prefix: String,
    suffix: String,
    exempt_kinds: Vec<String>,
}

impl PrefixSuffixTransformer {
    pub fn new(prefix: &str, suffix: &str, config: &TransformerConfig) -> Self {
        Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            exempt_kinds: config.prefix_exempt_kinds.clone(),
        }
    }

    fn rename(&self, name: &str, hash: Option<&str>) -> String {
        let stem = hash
            .and_then(|h| name.strip_suffix(h))
            .and_then(|n| n.strip_suffix('-'));
        match (stem, hash) {
            (Some(stem), Some(hash)) => format!("{}{}{}-{}", self.prefix, stem, self.suffix, hash),
            _ => format!("{}{}{}", self.prefix, name, self.suffix),
        }
    }
}

impl Transformer for PrefixSuffixTransformer {
    fn transform(&self, resources: &mut ResourceMap) -> Result<()> {
        if self.prefix.is_empty() && self.suffix.is_empty() {
            return Ok(());
        }
        let targets = resources.get_matching_ids(|res| !self.exempt_kinds.iter().any(|k| k == res.kind()));
        for id in targets {
            resources.update(&id, |res| {
                let name = self.rename(res.name(), res.name_hash());
                res.set_name(&name)
            })?;
        }
        Ok(())
    }
}
