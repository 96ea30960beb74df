//! Key/value data sources for generators
//!
//! Sources are read in a fixed order (literals, files, env files, commands) and
//! collected into one key-sorted map. A key may appear only once across all
//! sources of one generator.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use kustom_core::{GeneratorArgs, Loader};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{EngineError, Result};

static KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-._a-zA-Z0-9]+$").expect("key pattern is valid"));

/// One value produced by a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceValue {
    Text(String),
    /// Content that is not valid UTF-8
    Binary(Vec<u8>),
}

impl SourceValue {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            SourceValue::Text(s) => s.as_bytes(),
            SourceValue::Binary(b) => b,
        }
    }

    fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => SourceValue::Text(text),
            Err(e) => SourceValue::Binary(e.into_bytes()),
        }
    }
}

/// Collected generator data, sorted by key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValues {
    name: String,
    entries: BTreeMap<String, SourceValue>,
}

impl KeyValues {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: BTreeMap::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SourceValue)> {
        self.entries.iter()
    }

    fn insert(&mut self, key: &str, value: SourceValue) -> Result<()> {
        if !KEY_PATTERN.is_match(key) {
            return Err(EngineError::parse(format!(
                "'{}': invalid key '{}', keys may only contain alphanumerics, '-', '_' and '.'",
                self.name, key
            )));
        }
        if self.entries.contains_key(key) {
            return Err(EngineError::parse(format!(
                "'{}': duplicate key '{}'",
                self.name, key
            )));
        }
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Read every data source of a generator
pub fn collect(
    args: &GeneratorArgs,
    commands: &BTreeMap<String, String>,
    loader: &dyn Loader,
) -> Result<KeyValues> {
    let mut kv = KeyValues::new(&args.name);

    for literal in &args.literals {
        let (key, value) = parse_literal(literal)?;
        kv.insert(key, SourceValue::Text(value))?;
    }

    for file in &args.files {
        let (key, path) = parse_file_source(file)?;
        let bytes = loader
            .load(path)
            .map_err(|e| EngineError::generation(&args.name, e.to_string()))?;
        kv.insert(&key, SourceValue::from_bytes(bytes))?;
    }

    for env_file in args.env_files() {
        let content = loader
            .load_string(env_file)
            .map_err(|e| EngineError::generation(&args.name, e.to_string()))?;
        for (key, value) in parse_env_file(env_file, &content)? {
            kv.insert(&key, SourceValue::Text(value))?;
        }
    }

    for (key, command) in commands {
        let output = run_command(&args.name, command, &loader.root())?;
        kv.insert(key, SourceValue::from_bytes(output))?;
    }

    Ok(kv)
}

/// Split `KEY=VALUE`, dropping one level of matching quotes around the value
fn parse_literal(literal: &str) -> Result<(&str, String)> {
    let Some((key, value)) = literal.split_once('=') else {
        return Err(EngineError::parse(format!(
            "invalid literal source '{}', expected key=value",
            literal
        )));
    };
    if key.is_empty() {
        return Err(EngineError::parse(format!(
            "invalid literal source '{}', key is empty",
            literal
        )));
    }
    Ok((key, unquote(value).to_string()))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// `path` or `key=path`; the key defaults to the file name
fn parse_file_source(source: &str) -> Result<(String, &str)> {
    if let Some((key, path)) = source.split_once('=') {
        if key.is_empty() || path.is_empty() {
            return Err(EngineError::parse(format!(
                "invalid file source '{}', expected path or key=path",
                source
            )));
        }
        return Ok((key.to_string(), path));
    }
    let key = Path::new(source)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| EngineError::parse(format!("file source '{}' has no file name", source)))?;
    Ok((key, source))
}

/// `KEY=VALUE` lines; blank lines and `#` comments are skipped
fn parse_env_file(path: &str, content: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim_start_matches('\u{feff}').trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(EngineError::parse(format!(
                "{}:{}: '{}' is not of the form KEY=VALUE",
                path,
                n + 1,
                line
            )));
        };
        pairs.push((key.trim().to_string(), value.to_string()));
    }
    Ok(pairs)
}

/// Run through `sh -c` in the layer directory; stdout is the value
fn run_command(name: &str, command: &str, dir: &str) -> Result<Vec<u8>> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    if Path::new(dir).is_dir() {
        cmd.current_dir(dir);
    }
    tracing::debug!(generator = name, command, "running secret command");
    let output = cmd
        .output()
        .map_err(|e| EngineError::generation(name, format!("failed to run '{}': {}", command, e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::generation(
            name,
            format!("command '{}' failed ({}): {}", command, output.status, stderr.trim()),
        ));
    }
    Ok(output.stdout)
}
