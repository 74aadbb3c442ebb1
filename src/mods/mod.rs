//! Declarative code modifications.
//!
//! A code mod is a named, versioned, non-diff source modification described
//! in a JSON configuration document: a mod-owned patch file, a set of literal
//! or regex text replacements, or a structured append into a build
//! description. Mods are collected into an ordered registry (defaults first,
//! caller overrides replacing in place) and applied one by one; a failing
//! entry is logged and skipped so the other entries still run, unless the
//! entry is marked required.

pub mod structured;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::context::BuildContext;
use crate::error::CodeModError;
use crate::models::{BuildTarget, StageResult};
use crate::patch;

/// One search/replace pair of a text-replace mod.
#[derive(Debug, Clone, Deserialize)]
pub struct Replacement {
    pub search: String,
    pub replace: String,
    /// Interpret `search` as a regex instead of a literal.
    #[serde(default)]
    pub regex: bool,
}

/// Kind-specific payload of a code mod entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum CodeModKind {
    /// Apply a unified-diff patch file shipped with the mod set.
    #[serde(rename = "patch")]
    PatchFile { file: String },

    /// Global substitutions over a list of source files.
    #[serde(rename = "text-replace")]
    TextReplace {
        files: Vec<String>,
        replacements: Vec<Replacement>,
    },

    /// Append values into a named list of a structured build document.
    #[serde(rename = "structured-append")]
    StructuredAppend {
        file: String,
        section: String,
        list: String,
        values: Vec<serde_json::Value>,
    },
}

/// One declarative code modification. Loaded once per run; never mutated.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeModEntry {
    /// Filled from the config document's map key.
    #[serde(default)]
    pub name: String,

    pub enabled: bool,

    /// Versions this entry applies to; absent means all versions.
    #[serde(default)]
    pub versions: Option<HashSet<String>>,

    /// Entry must succeed or the whole custom-mod step is fatal.
    #[serde(default)]
    pub required: bool,

    /// Entry only makes sense on top of the upstream patch set; skipped with
    /// an error when the upstream patch was not applied this run.
    #[serde(default)]
    pub requires_upstream: bool,

    #[serde(flatten)]
    pub kind: CodeModKind,

    #[serde(default)]
    pub description: String,
}

impl CodeModEntry {
    /// Whether this entry applies to the given runtime version.
    pub fn applies_to(&self, version: &str) -> bool {
        match &self.versions {
            None => true,
            Some(set) => set.contains(version),
        }
    }
}

/// Ordered registry of code mods, keyed by name.
///
/// Iteration order is deterministic: defaults in their registration order,
/// overrides replacing in place, new names appended.
#[derive(Debug, Default)]
pub struct CodeModRegistry {
    entries: Vec<CodeModEntry>,
    index: HashMap<String, usize>,
}

impl CodeModRegistry {
    pub fn builder() -> CodeModRegistryBuilder {
        CodeModRegistryBuilder::default()
    }

    /// Load a registry from a JSON config document mapping mod name to entry.
    ///
    /// Map keys are sorted, so the resulting order is deterministic for a
    /// given document regardless of its on-disk key order.
    pub fn load(path: &Path) -> Result<Self, CodeModError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CodeModError::ConfigNotFound(path.display().to_string())
            } else {
                CodeModError::Io(e)
            }
        })?;
        let doc: BTreeMap<String, CodeModEntry> = serde_json::from_str(&raw)?;

        let mut builder = Self::builder();
        for (name, mut entry) in doc {
            entry.name = name;
            builder = builder.entry(entry);
        }
        Ok(builder.build())
    }

    pub fn entries(&self) -> &[CodeModEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&CodeModEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds a registry defaults-first; an entry with an already-registered name
/// replaces the original in place, keeping its position.
#[derive(Debug, Default)]
pub struct CodeModRegistryBuilder {
    registry: CodeModRegistry,
}

impl CodeModRegistryBuilder {
    pub fn entry(mut self, entry: CodeModEntry) -> Self {
        match self.registry.index.get(&entry.name) {
            Some(&i) => self.registry.entries[i] = entry,
            None => {
                self.registry
                    .index
                    .insert(entry.name.clone(), self.registry.entries.len());
                self.registry.entries.push(entry);
            }
        }
        self
    }

    pub fn entries(mut self, entries: impl IntoIterator<Item = CodeModEntry>) -> Self {
        for entry in entries {
            self = self.entry(entry);
        }
        self
    }

    pub fn build(self) -> CodeModRegistry {
        self.registry
    }
}

/// Apply every applicable entry of the registry against the source tree.
///
/// Returns the number of entries that produced an actual modification.
/// `upstream_applied` reflects whether the upstream patch set landed this
/// run; entries marked `requires_upstream` are skipped (with an error log)
/// when it did not.
pub fn apply_all(
    registry: &CodeModRegistry,
    target: &BuildTarget,
    ctx: &BuildContext,
    upstream_applied: bool,
) -> Result<usize, CodeModError> {
    let mut modified = 0usize;

    for entry in registry.entries() {
        if !entry.enabled {
            log::info!("[CodeMod] Skipping '{}' (disabled)", entry.name);
            continue;
        }
        if !entry.applies_to(&target.version) {
            log::info!(
                "[CodeMod] Skipping '{}' (not applicable to {})",
                entry.name,
                target.version
            );
            continue;
        }
        if entry.requires_upstream && !upstream_applied {
            log::error!(
                "[CodeMod] Aborting '{}': requires the upstream patch set, which was not applied",
                entry.name
            );
            if entry.required {
                return Err(CodeModError::RequiredModFailed(entry.name.clone()));
            }
            continue;
        }

        match apply_entry(entry, ctx) {
            Ok(true) => {
                log::info!("[CodeMod] Applied '{}'", entry.name);
                modified += 1;
            }
            Ok(false) => {
                log::info!("[CodeMod] '{}' made no changes", entry.name);
            }
            Err(e) => {
                log::error!("[CodeMod] '{}' failed: {}", entry.name, e);
                if entry.required {
                    return Err(CodeModError::RequiredModFailed(entry.name.clone()));
                }
            }
        }
    }

    Ok(modified)
}

/// Apply one entry. Returns whether anything on disk changed.
fn apply_entry(entry: &CodeModEntry, ctx: &BuildContext) -> Result<bool, CodeModError> {
    match &entry.kind {
        CodeModKind::PatchFile { file } => {
            let patch_path = ctx.mods_dir.join(file);
            let text = std::fs::read_to_string(&patch_path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CodeModError::ConfigNotFound(patch_path.display().to_string())
                } else {
                    CodeModError::Io(e)
                }
            })?;
            let parsed = patch::parse(&text).map_err(|e| CodeModError::PatchModFailed {
                file: file.clone(),
                reason: e.to_string(),
            })?;
            let report = patch::apply_with_options(
                &parsed,
                &ctx.source_dir,
                patch::ApplyOptions {
                    fuzz_window: ctx.fuzz_window,
                },
            )
            .map_err(|e| CodeModError::PatchModFailed {
                file: file.clone(),
                reason: e.to_string(),
            })?;
            match report.overall() {
                StageResult::Fatal { reason } => Err(CodeModError::PatchModFailed {
                    file: file.clone(),
                    reason,
                }),
                _ => Ok(report.applied_count() > 0),
            }
        }

        CodeModKind::TextReplace {
            files,
            replacements,
        } => {
            let mut changed = false;
            for file in files {
                changed |= apply_replacements(&ctx.source_dir.join(file), replacements)?;
            }
            Ok(changed)
        }

        CodeModKind::StructuredAppend {
            file,
            section,
            list,
            values,
        } => structured::append_values(&ctx.source_dir.join(file), section, list, values),
    }
}

/// Run every replacement pair over one file. A file with zero matches is left
/// untouched and does not count as modified.
fn apply_replacements(path: &Path, replacements: &[Replacement]) -> Result<bool, CodeModError> {
    let original = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CodeModError::ConfigNotFound(path.display().to_string())
        } else {
            CodeModError::Io(e)
        }
    })?;

    let mut content = original.clone();
    for rep in replacements {
        if rep.regex {
            let re = regex::Regex::new(&rep.search).map_err(|e| CodeModError::InvalidPattern {
                pattern: rep.search.clone(),
                reason: e.to_string(),
            })?;
            content = re.replace_all(&content, rep.replace.as_str()).into_owned();
        } else {
            content = content.replace(&rep.search, &rep.replace);
        }
    }

    if content == original {
        return Ok(false);
    }
    std::fs::write(path, content)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, enabled: bool) -> CodeModEntry {
        CodeModEntry {
            name: name.to_string(),
            enabled,
            versions: None,
            required: false,
            requires_upstream: false,
            kind: CodeModKind::TextReplace {
                files: vec![],
                replacements: vec![],
            },
            description: String::new(),
        }
    }

    #[test]
    fn builder_overrides_replace_in_place() {
        let mut replacement = entry("b", false);
        replacement.description = "override".to_string();

        let registry = CodeModRegistry::builder()
            .entries([entry("a", true), entry("b", true), entry("c", true)])
            .entry(replacement)
            .entry(entry("d", true))
            .build();

        let names: Vec<&str> = registry.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
        assert!(!registry.get("b").unwrap().enabled);
        assert_eq!(registry.get("b").unwrap().description, "override");
    }

    #[test]
    fn version_gating() {
        let mut e = entry("v", true);
        assert!(e.applies_to("1.0.0"));
        e.versions = Some(["2.0.0".to_string()].into_iter().collect());
        assert!(!e.applies_to("1.0.0"));
        assert!(e.applies_to("2.0.0"));
    }

    #[test]
    fn config_document_parses() {
        let doc = r#"{
            "add-builtin": {
                "enabled": true,
                "versions": ["22.12.0"],
                "type": "structured-append",
                "file": "node.gyp",
                "section": "variables",
                "list": "library_files",
                "values": ["lib/smol.js"],
                "description": "register the embedded loader"
            },
            "brand": {
                "enabled": false,
                "type": "text-replace",
                "files": ["src/node_version.h"],
                "replacements": [{"search": "Node.js", "replace": "smol"}]
            }
        }"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mods.json");
        std::fs::write(&path, doc).unwrap();

        let registry = CodeModRegistry::load(&path).unwrap();
        assert_eq!(registry.len(), 2);
        let e = registry.get("add-builtin").unwrap();
        assert!(e.applies_to("22.12.0"));
        assert!(!e.applies_to("20.0.0"));
        assert!(matches!(e.kind, CodeModKind::StructuredAppend { .. }));
        assert!(!registry.get("brand").unwrap().enabled);
    }
}
