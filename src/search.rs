use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::{Path, PathBuf},
};

use crate::source::{SourceError, SourceFiles};

/// Terms shorter than this find nothing.
pub const MINIMUM_CHAR_COUNT_FOR_SEARCH: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub file: PathBuf,
    /// 1-based
    pub line_number: usize,
    pub line: String,
}

impl fmt::Display for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.file.display(),
            self.line_number,
            self.line
        )
    }
}

/// Case-insensitive search through the text of all project files.
///
/// Results are cached per term. When a term extends the previous one, only the previous results
/// are searched again.
#[derive(Debug, Default)]
pub struct GlobalSearch {
    texts: BTreeMap<PathBuf, String>,
    last_term: String,
    cache: HashMap<String, Vec<SearchResult>>,
}

impl GlobalSearch {
    pub fn new(texts: BTreeMap<PathBuf, String>) -> Self {
        Self {
            texts,
            last_term: String::new(),
            cache: HashMap::from([(String::new(), Vec::new())]),
        }
    }

    /// Reads `paths` through `files`, so unsaved local copies are searched too.
    pub fn from_files(files: &SourceFiles, paths: &[PathBuf]) -> Result<Self, SourceError> {
        let texts = paths
            .iter()
            .map(|path| Ok((path.clone(), files.read(path)?)))
            .collect::<Result<_, SourceError>>()?;

        Ok(Self::new(texts))
    }

    #[tracing::instrument(skip(self))]
    pub fn search(&mut self, term: &str) -> &[SearchResult] {
        let term = term.trim().to_lowercase();

        if !self.cache.contains_key(&term) {
            let results = if self.last_term.len() >= MINIMUM_CHAR_COUNT_FOR_SEARCH
                && term.contains(self.last_term.as_str())
            {
                self.narrow(&term)
            } else if term.len() >= MINIMUM_CHAR_COUNT_FOR_SEARCH {
                self.search_everything(&term)
            } else {
                Vec::new()
            };
            tracing::debug!("{} results for '{}'", results.len(), term);
            self.cache.insert(term.clone(), results);
        }

        self.last_term = term;
        self.cache
            .get(&self.last_term)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Forgets cached results of a changed file.
    pub fn update_file(&mut self, file: &Path, text: impl Into<String>) {
        self.texts.insert(file.to_owned(), text.into());
        self.cache.retain(|term, _| term.is_empty());
        self.last_term.clear();
    }

    fn narrow(&self, term: &str) -> Vec<SearchResult> {
        self.cache
            .get(&self.last_term)
            .into_iter()
            .flatten()
            .filter(|result| result.line.to_lowercase().contains(term))
            .cloned()
            .collect()
    }

    fn search_everything(&self, term: &str) -> Vec<SearchResult> {
        let mut results = Vec::new();
        for (file, text) in &self.texts {
            for (index, line) in text.lines().enumerate() {
                if line.to_lowercase().contains(term) {
                    results.push(SearchResult {
                        file: file.clone(),
                        line_number: index + 1,
                        line: line.to_owned(),
                    });
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn global_search() -> GlobalSearch {
        GlobalSearch::new(BTreeMap::from([
            (
                PathBuf::from("PRG/prg000.asm"),
                "Player_X:\n\tLDA Player_XVel\n\tSTA <Temp_Var1\n".to_owned(),
            ),
            (
                PathBuf::from("smb3.asm"),
                "Player_X:\t.ds 1\nPlayer_Y:\t.ds 1\n".to_owned(),
            ),
        ]))
    }

    fn found(results: &[SearchResult]) -> Vec<(&str, usize)> {
        results
            .iter()
            .map(|result| (result.file.to_str().unwrap_or_default(), result.line_number))
            .collect()
    }

    #[test]
    fn test_search() {
        let mut search = global_search();
        let tests = vec![
            ("pl", vec![]),
            (
                "  PLAYER ",
                vec![
                    ("PRG/prg000.asm", 1),
                    ("PRG/prg000.asm", 2),
                    ("smb3.asm", 1),
                    ("smb3.asm", 2),
                ],
            ),
            (
                "player_x",
                vec![("PRG/prg000.asm", 1), ("PRG/prg000.asm", 2), ("smb3.asm", 1)],
            ),
            ("player_xv", vec![("PRG/prg000.asm", 2)]),
            ("temp", vec![("PRG/prg000.asm", 3)]),
        ];

        for (term, expected) in tests {
            assert_eq!(found(search.search(term)), expected, "'{}'", term);
        }
    }

    #[test]
    fn test_narrowing_reuses_previous_results() {
        let mut search = global_search();
        search.search("player");

        // Only the cached results are narrowed down, the texts are not searched again
        search.texts.clear();
        assert_eq!(found(search.search("player_y")), vec![("smb3.asm", 2)]);
    }

    #[test]
    fn test_update_file() {
        let mut search = global_search();
        search.search("temp");

        search.update_file(Path::new("smb3.asm"), "TEMP = 1\n");
        assert_eq!(
            found(search.search("temp")),
            vec![("PRG/prg000.asm", 3), ("smb3.asm", 1)]
        );
    }
}
