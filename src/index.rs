use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

use lazy_static::lazy_static;
use regex::Regex;
use strum_macros::Display;
use thiserror::Error;

use crate::config::ProjectConfig;
use crate::progress::Progress;
use crate::source::{strip_comment, SourceError, SourceFiles, SourcePosition};

const CONSTANT: &str = r"([A-Za-z][A-Za-z0-9_]*)\s*=\s*(\$[0-9A-F]+|%[0-1]+|[0-9]+)";
const RAM_VARIABLE: &str = r"([A-Za-z_][A-Za-z0-9_]*):\s*(\.ds.*)";
const LABEL: &str = r"([A-Za-z_][A-Za-z0-9_]*):\s*(.*)";
const NAME: &str = r"[A-Za-z_][A-Za-z0-9_]*";

fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(err) => panic!("Error parsing regex {pattern} - {err}"),
    }
}

lazy_static! {
    /// Definition patterns, in the order they are tried on a line.
    static ref DEFINITION_PATTERNS: [(Regex, DefinitionKind); 3] = [
        (compile(CONSTANT), DefinitionKind::Constant),
        (compile(RAM_VARIABLE), DefinitionKind::RamVariable),
        (compile(LABEL), DefinitionKind::Label),
    ];
    static ref NAME_PATTERN: Regex = compile(NAME);
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("{second}: '{name}' is already defined at {first}")]
    Redefinition {
        name: String,
        first: SourcePosition,
        second: SourcePosition,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum DefinitionKind {
    Constant,
    Label,
    RamVariable,
}

/// Where a name is declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    /// Value text as written, e.g. `$40` or `.ds 1`
    pub value: String,
    pub position: SourcePosition,
    pub kind: DefinitionKind,
    /// Whole source line
    pub line: String,
}

/// A place a name is mentioned, other than its definition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference {
    pub position: SourcePosition,
    pub name: String,
    pub line: String,
}

/// Definitions and references of every name in a project.
///
/// References are collected for every identifier, known or not, so that a definition added later
/// finds its references without scanning everything again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    definitions: HashMap<String, Definition>,
    references: HashMap<String, BTreeSet<Reference>>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn definition(&self, name: &str) -> Option<&Definition> {
        self.definitions.get(name)
    }

    /// References of `name`, sorted by position.
    pub fn references(&self, name: &str) -> impl Iterator<Item = &Reference> {
        self.references.get(name).into_iter().flatten()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Builds the index from scratch: definitions of all project files first, then references.
    #[tracing::instrument(skip_all)]
    pub fn full_scan(
        files: &SourceFiles,
        config: &ProjectConfig,
        progress: &impl Progress,
    ) -> Result<Index, IndexError> {
        let start = Instant::now();
        let paths = files.project_files(config)?;
        progress.maximum_found(paths.len() * 2 + 1);

        let mut index = Index::new();
        let mut step = 0;

        for path in &paths {
            progress.progress_made(step, &format!("Parsing: {}", path.display()));
            step += 1;
            let text = files.read(path)?;
            for definition in scan_definitions(path, &text) {
                index.define(definition, None)?;
            }
        }

        for path in &paths {
            progress.progress_made(step, &format!("Parsing: {}", path.display()));
            step += 1;
            index.scan_references(path, &files.read(path)?);
        }

        progress.progress_made(step, "Cleaning up References");
        index.clean_up();

        tracing::info!(
            "Indexed {} definitions in {} files in {:?}",
            index.len(),
            paths.len(),
            start.elapsed()
        );
        Ok(index)
    }

    /// Index with `changed` scanned again. Only files mentioning a newly defined name are scanned
    /// for references besides `changed` itself.
    ///
    /// `self` is left untouched, on failure as well.
    #[tracing::instrument(skip(self, files, config, progress))]
    pub fn rescan_file(
        &self,
        files: &SourceFiles,
        config: &ProjectConfig,
        changed: &Path,
        progress: &impl Progress,
    ) -> Result<Index, IndexError> {
        let start = Instant::now();
        let mut paths = files.project_files(config)?;
        if !paths.iter().any(|path| path == changed) {
            paths.push(changed.to_owned());
        }
        progress.maximum_found(paths.len() + 2);

        let mut index = self.clone();
        index
            .definitions
            .retain(|_, definition| !definition.position.is_in(changed));

        progress.progress_made(0, &format!("Parsing: {}", changed.display()));
        let text = files.read(changed)?;
        for definition in scan_definitions(changed, &text) {
            index.define(definition, Some(changed))?;
        }

        let old_names: HashSet<&String> = self.definitions.keys().collect();
        let new_names: HashSet<&String> = index.definitions.keys().collect();
        let added: Vec<String> = new_names
            .difference(&old_names)
            .map(|name| name.to_string())
            .collect();
        let removed: Vec<String> = old_names
            .difference(&new_names)
            .map(|name| name.to_string())
            .collect();

        for name in &removed {
            tracing::debug!("Dropping references of removed definition {}", name);
            index.references.remove(name);
        }
        for references in index.references.values_mut() {
            references.retain(|reference| !reference.position.is_in(changed));
        }

        for (step, path) in paths.iter().enumerate() {
            progress.progress_made(step + 1, &format!("Parsing: {}", path.display()));
            let text = files.read(path)?;
            if path == changed || added.iter().any(|name| text.contains(name.as_str())) {
                index.scan_references(path, &text);
            }
        }

        progress.progress_made(paths.len() + 1, "Cleaning up References");
        index.clean_up();

        tracing::info!(
            "Rescanned {} ({} added, {} removed) in {:?}",
            changed.display(),
            added.len(),
            removed.len(),
            start.elapsed()
        );
        Ok(index)
    }

    /// Adds a definition. A name defined twice is an error, unless the earlier definition is from
    /// another file than `replacing`, in which case the new one wins.
    fn define(
        &mut self,
        definition: Definition,
        replacing: Option<&Path>,
    ) -> Result<(), IndexError> {
        if let Some(existing) = self.definitions.get(&definition.name) {
            match replacing {
                Some(changed) if !existing.position.is_in(changed) => {
                    tracing::warn!(
                        "{} replaces the definition of '{}' at {}",
                        definition.position,
                        definition.name,
                        existing.position
                    );
                }
                _ => {
                    return Err(IndexError::Redefinition {
                        name: definition.name,
                        first: existing.position.clone(),
                        second: definition.position,
                    })
                }
            }
        }
        self.definitions.insert(definition.name.clone(), definition);
        Ok(())
    }

    fn scan_references(&mut self, path: &Path, text: &str) {
        for (index, line) in text.lines().enumerate() {
            for name in NAME_PATTERN.find_iter(strip_comment(line)) {
                self.references
                    .entry(name.as_str().to_owned())
                    .or_default()
                    .insert(Reference {
                        position: SourcePosition::new(path, index + 1),
                        name: name.as_str().to_owned(),
                        line: line.to_owned(),
                    });
            }
        }
    }

    /// Takes the definition sites out of the references and drops names without references.
    fn clean_up(&mut self) {
        for (name, definition) in &self.definitions {
            if let Some(references) = self.references.get_mut(name) {
                references.retain(|reference| !reference.position.same_line(&definition.position));
            }
        }
        self.references.retain(|_, references| !references.is_empty());
    }
}

/// Definitions on the lines of one file. Per line the first pattern that matches wins.
fn scan_definitions(path: &Path, text: &str) -> Vec<Definition> {
    text.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let code = strip_comment(line);
            DEFINITION_PATTERNS.iter().find_map(|(pattern, kind)| {
                let captures = pattern.captures(code)?;
                Some(Definition {
                    name: captures[1].to_owned(),
                    value: captures[2].to_owned(),
                    position: SourcePosition::new(path, index + 1),
                    kind: *kind,
                    line: line.to_owned(),
                })
            })
        })
        .collect()
}
