//! Formula index: the table of every known formula and its published artifacts.
//!
//! The index starts from the formulae compiled into the binary and can be extended
//! with directories of `*.json` definitions (one formula per file). A definition
//! loaded later replaces a built-in one of the same name.
//!
//! Every formula is validated when it enters the index. Published descriptors are
//! immutable, so the index refuses to hold two descriptors that share a URL and
//! version but disagree on the checksum.

use crate::error::{Result, TapkegError};
use crate::formula::Formula;
use anyhow::Context;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::debug;

const BUILTIN_FORMULAE: &[(&str, &str)] = &[
    ("mutagen.json", include_str!("../formulae/mutagen.json")),
    ("mutagen-edge.json", include_str!("../formulae/mutagen-edge.json")),
];

#[derive(Debug, Clone, Default)]
pub struct FormulaIndex {
    formulae: BTreeMap<String, Formula>,
}

impl FormulaIndex {
    /// Index containing only the built-in formulae
    pub fn builtin() -> Result<Self> {
        let mut index = Self::default();
        for (file, json) in BUILTIN_FORMULAE {
            let formula: Formula = serde_json::from_str(json)
                .with_context(|| format!("Failed to parse built-in formula {file}"))?;
            index.insert(formula)?;
        }
        Ok(index)
    }

    /// Build an index from already parsed formulae
    pub fn from_formulae(formulae: impl IntoIterator<Item = Formula>) -> Result<Self> {
        let mut index = Self::default();
        for formula in formulae {
            index.insert(formula)?;
        }
        Ok(index)
    }

    /// Load every `*.json` definition in `dir` into the index
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut paths: Vec<_> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read formula index: {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in &paths {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read formula: {}", path.display()))?;
            let formula: Formula = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse formula: {}", path.display()))?;
            debug!("Loaded formula {} from {}", formula.name, path.display());
            self.insert(formula)?;
        }

        Ok(paths.len())
    }

    /// Validate and add a formula, replacing any existing one of the same name
    pub fn insert(&mut self, formula: Formula) -> Result<()> {
        validate_formula(&formula)?;

        let mut candidate = self.formulae.clone();
        candidate.insert(formula.name.clone(), formula);
        check_published_checksums(candidate.values())?;

        self.formulae = candidate;
        Ok(())
    }

    /// Look up a formula by name
    pub fn get(&self, name: &str) -> Result<&Formula> {
        self.formulae
            .get(name)
            .ok_or_else(|| TapkegError::FormulaNotFound {
                name: name.to_string(),
                suggestion: self.suggest(name),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Formula> {
        self.formulae.values()
    }

    pub fn len(&self) -> usize {
        self.formulae.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulae.is_empty()
    }

    /// Closest known formula name, if any is reasonably close
    fn suggest(&self, name: &str) -> Option<String> {
        self.formulae
            .keys()
            .map(|known| (strsim::jaro_winkler(name, known), known))
            .filter(|(score, _)| *score > 0.8)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, known)| known.clone())
    }
}

fn validate_formula(formula: &Formula) -> Result<()> {
    let invalid = |msg: String| TapkegError::InvalidIndex(format!("{}: {}", formula.name, msg));

    if formula.name.is_empty() {
        return Err(TapkegError::InvalidIndex("formula with empty name".to_string()));
    }
    if formula.variants.is_empty() {
        return Err(invalid("no variants defined".to_string()));
    }

    let mut labels = HashSet::new();
    for variant in &formula.variants {
        if !labels.insert(variant.label) {
            return Err(invalid(format!("{} variant defined twice", variant.label)));
        }
        if variant.artifacts.is_empty() {
            return Err(invalid(format!("{} variant has no artifacts", variant.label)));
        }
        for (platform, artifact) in &variant.artifacts {
            if !is_sha256_hex(&artifact.sha256) {
                return Err(invalid(format!(
                    "{platform} artifact has malformed sha256 `{}`",
                    artifact.sha256
                )));
            }
            if artifact.version != variant.version {
                return Err(invalid(format!(
                    "{platform} artifact version {} differs from {} version {}",
                    artifact.version, variant.label, variant.version
                )));
            }
        }
    }

    if formula.variant(formula.default_variant).is_none() {
        return Err(invalid(format!(
            "default variant {} is not defined",
            formula.default_variant
        )));
    }

    let mut files = HashSet::new();
    for script in &formula.completions {
        if script.file.contains('/') || !files.insert(script.file.as_str()) {
            return Err(invalid(format!("bad completion file name `{}`", script.file)));
        }
    }

    Ok(())
}

/// Reject any (url, version) pair published with more than one checksum
fn check_published_checksums<'a>(formulae: impl Iterator<Item = &'a Formula>) -> Result<()> {
    let mut published: HashMap<(&str, &str), &str> = HashMap::new();

    for formula in formulae {
        for variant in &formula.variants {
            for artifact in variant.artifacts.values() {
                let key = (artifact.url.as_str(), artifact.version.as_str());
                match published.get(&key) {
                    Some(existing) if *existing != artifact.sha256 => {
                        return Err(TapkegError::ChecksumRepublished {
                            url: artifact.url.clone(),
                            version: artifact.version.clone(),
                            published: existing.to_string(),
                            found: artifact.sha256.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        published.insert(key, &artifact.sha256);
                    }
                }
            }
        }
    }

    Ok(())
}

pub(crate) fn is_sha256_hex(digest: &str) -> bool {
    digest.len() == 64 && digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
