use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;

use self::count::{count_data, count_instruction, data_to_bytes};
use self::line::{classify, Line, KNOWN_ANOMALY, KNOWN_ANOMALY_ADDRESS};
use crate::config::ProjectConfig;
use crate::formula::{parse_formula, FormulaError};
use crate::macros::{is_macro_end, split_arguments, Macro, MacroError};
use crate::progress::Progress;
use crate::source::{SourceError, SourceFiles, SourcePosition};
use crate::syntax::{is_built_in_function, parse_number, Directive};

/// Shape of a single source line.
pub mod line;

/// iNES header synthesized from the `.ines*` directives.
pub mod header;

/// Labels, RAM variables, constants and functions found in pass 1.
pub mod symbols;

/// Byte counting of instructions and data.
mod count;

pub use header::{InesHeader, HEADER_SIZE};
pub use symbols::{Symbol, SymbolError, SymbolTable, SymbolType};

/// Deepest nesting of macro invocations.
pub const MAX_MACRO_DEPTH: usize = 64;

/// CPU address of a bank without `.org`.
const DEFAULT_BANK_ORIGIN: u16 = 0x8000;

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("{position}: could not classify '{line}'")]
    Unclassifiable {
        position: SourcePosition,
        line: String,
    },
    #[error("{position}: {source}")]
    Formula {
        position: SourcePosition,
        #[source]
        source: FormulaError,
    },
    #[error("{position}: {source}")]
    Symbol {
        position: SourcePosition,
        #[source]
        source: SymbolError,
    },
    #[error(transparent)]
    Macro(#[from] MacroError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("{position}: function '{name}' is not defined")]
    UnknownFunction {
        name: String,
        position: SourcePosition,
    },
    #[error("{position}: '{}' includes itself", file.display())]
    IncludeCycle {
        file: PathBuf,
        position: SourcePosition,
    },
    #[error("{position}: macros nested deeper than {depth} levels")]
    MacroDepth {
        position: SourcePosition,
        depth: usize,
    },
    #[error("{position}: invalid bank index '{index}'")]
    InvalidBank {
        index: String,
        position: SourcePosition,
    },
    #[error("{position}: {value} is out of range")]
    OutOfRange { value: i64, position: SourcePosition },
    #[error("'{line}' is not a .byte or .word line")]
    NotData { line: String },
    #[error("'{line}': {source}")]
    Data {
        line: String,
        #[source]
        source: FormulaError,
    },
    #[error("{0} is past the end of the file")]
    NoSuchLine(SourcePosition),
}

fn at(position: &SourcePosition) -> impl FnOnce(FormulaError) -> LayoutError + '_ {
    move |source| LayoutError::Formula {
        position: position.clone(),
        source,
    }
}

/// Narrows an evaluated value, e.g. to a CPU address or a header byte.
fn fit<T: TryFrom<i64>>(value: i64, position: &SourcePosition) -> Result<T, LayoutError> {
    T::try_from(value).map_err(|_| LayoutError::OutOfRange {
        value,
        position: position.clone(),
    })
}

fn symbol_at(position: &SourcePosition) -> impl FnOnce(SymbolError) -> LayoutError + '_ {
    move |source| LayoutError::Symbol {
        position: position.clone(),
        source,
    }
}

/// A PRG bank and the file that fills it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bank {
    pub index: usize,
    pub file: PathBuf,
    /// CPU address the bank is mapped to
    pub origin: u16,
    /// Bytes counted for the bank
    pub size: usize,
}

/// Byte layout of the assembled ROM, without the bytes themselves.
#[derive(Debug, Clone)]
pub struct Layout {
    pub header: InesHeader,
    pub symbols: SymbolTable,
    pub macros: HashMap<String, Macro>,
    pub banks: BTreeMap<usize, Bank>,
    pub chr_files: Vec<PathBuf>,
    /// Offsets do not include the header
    bytes_to_lines: BTreeMap<usize, SourcePosition>,
    image_size: usize,
}

impl Layout {
    pub fn header_bytes(&self) -> [u8; HEADER_SIZE] {
        self.header.to_bytes()
    }

    /// Number of PRG bytes counted, up to the end of the last byte of the last bank.
    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Source line that produced the PRG byte at `offset`.
    pub fn position_for_offset(&self, offset: usize) -> Option<&SourcePosition> {
        if offset >= self.image_size {
            return None;
        }
        self.bytes_to_lines
            .range(..=offset)
            .next_back()
            .map(|(_, position)| position)
    }

    /// First PRG offset produced by the given line.
    pub fn offset_of(&self, file: &Path, line: usize) -> Option<usize> {
        self.bytes_to_lines
            .iter()
            .find(|(_, position)| position.is_in(file) && position.line == line)
            .map(|(offset, _)| *offset)
    }

    pub fn offsets(&self) -> impl Iterator<Item = (&usize, &SourcePosition)> {
        self.bytes_to_lines.iter()
    }

    /// The bytes a `.byte`/`.word` line stands for.
    pub fn line_to_bytes(&self, line: &str) -> Result<Vec<u8>, LayoutError> {
        match classify(line, |name| self.macros.contains_key(name)) {
            Line::Data { unit, operand, .. } => data_to_bytes(operand, unit, &self.symbols)
                .map_err(|source| LayoutError::Data {
                    line: line.trim().to_owned(),
                    source,
                }),
            _ => Err(LayoutError::NotData {
                line: line.trim().to_owned(),
            }),
        }
    }

    /// The bytes of the `.byte`/`.word` line at `position`.
    pub fn bytes_at(
        &self,
        files: &SourceFiles,
        position: &SourcePosition,
    ) -> Result<Vec<u8>, LayoutError> {
        let text = files.read(&position.file)?;
        let line = position
            .line
            .checked_sub(1)
            .and_then(|index| text.lines().nth(index))
            .ok_or_else(|| LayoutError::NoSuchLine(position.clone()))?;

        self.line_to_bytes(line)
    }
}

/// Where the next definition of the entry file goes.
#[derive(Debug, Default)]
struct EntryState {
    ram_address: i64,
    pending_bank: Option<(usize, u16)>,
}

/// Two pass scanner computing the [`Layout`] of a project.
///
/// Pass 1 reads the entry file, which declares RAM, constants, macros and the banks, and then
/// every bank file for its labels. Pass 2 walks the banks in order and counts the bytes of each
/// line.
pub struct AssemblyParser<'a> {
    files: &'a SourceFiles,
    config: &'a ProjectConfig,
    symbols: SymbolTable,
    macros: HashMap<String, Macro>,
    header: InesHeader,
    banks: BTreeMap<usize, Bank>,
    chr_files: Vec<PathBuf>,
    visited: HashSet<PathBuf>,
    bytes_to_lines: BTreeMap<usize, SourcePosition>,
    bank_base: usize,
    offset_in_bank: usize,
    origin: u16,
    image_size: usize,
}

impl<'a> AssemblyParser<'a> {
    pub fn new(files: &'a SourceFiles, config: &'a ProjectConfig) -> Self {
        Self {
            files,
            config,
            symbols: SymbolTable::new(),
            macros: HashMap::new(),
            header: InesHeader::default(),
            banks: BTreeMap::new(),
            chr_files: Vec::new(),
            visited: HashSet::new(),
            bytes_to_lines: BTreeMap::new(),
            bank_base: 0,
            offset_in_bank: 0,
            origin: DEFAULT_BANK_ORIGIN,
            image_size: 0,
        }
    }

    #[tracing::instrument(skip_all)]
    pub fn parse(mut self, progress: &impl Progress) -> Result<Layout, LayoutError> {
        let start = Instant::now();

        let entry_file = self.config.entry_file.clone();
        self.parse_entry_file(&entry_file, &mut EntryState::default(), &mut Vec::new())?;

        let mut bank_files: Vec<PathBuf> = Vec::new();
        for bank in self.banks.values() {
            if !bank_files.contains(&bank.file) {
                bank_files.push(bank.file.clone());
            }
        }
        progress.maximum_found(bank_files.len() + self.banks.len());

        let mut step = 0;
        for file in &bank_files {
            step += 1;
            progress.progress_made(step, &format!("Pass 1 of {}", file.display()));
            self.pass_1_file(file)?;
        }

        let unresolved = self.symbols.resolve_deferred();
        if unresolved > 0 {
            tracing::debug!(
                "Constants left unresolved: {}",
                self.symbols.deferred_constants().join(", ")
            );
        }

        let indices: Vec<usize> = self.banks.keys().copied().collect();
        for index in indices {
            step += 1;
            if let Some(bank) = self.banks.get(&index) {
                progress.progress_made(step, &format!("Pass 2 of {}", bank.file.display()));
            }
            self.pass_2_bank(index)?;
        }

        tracing::info!(
            "Laid out {} banks with {} symbols and {} macros, {:#x} bytes in {:?}",
            self.banks.len(),
            self.symbols.len(),
            self.macros.len(),
            self.image_size,
            start.elapsed()
        );

        Ok(Layout {
            header: self.header,
            symbols: self.symbols,
            macros: self.macros,
            banks: self.banks,
            chr_files: self.chr_files,
            bytes_to_lines: self.bytes_to_lines,
            image_size: self.image_size,
        })
    }

    fn evaluate(&self, text: &str, position: &SourcePosition) -> Result<i64, LayoutError> {
        let mut formula = parse_formula(text).map_err(at(position))?;
        self.symbols.fill_in(&mut formula);
        formula.evaluate().map_err(at(position))
    }

    fn define(
        &mut self,
        name: &str,
        symbol: SymbolType,
        position: &SourcePosition,
    ) -> Result<(), LayoutError> {
        self.symbols
            .new_symbol(Symbol {
                name: name.to_owned(),
                symbol,
                position: position.clone(),
            })
            .map_err(symbol_at(position))
    }

    /// Records a constant. Calculations that can not be evaluated yet are resolved after pass 1.
    fn define_constant(
        &mut self,
        name: &str,
        value: &str,
        position: &SourcePosition,
    ) -> Result<(), LayoutError> {
        let symbol = match parse_number(value) {
            Ok(number) => SymbolType::Constant(number),
            Err(_) => {
                let mut formula = parse_formula(value).map_err(at(position))?;
                self.symbols.fill_in(&mut formula);
                match formula.evaluate() {
                    Ok(number) => SymbolType::Constant(number),
                    Err(_) => SymbolType::DeferredConstant(value.to_owned()),
                }
            }
        };
        self.define(name, symbol, position)
    }

    /// Paths of data includes may omit the `.asm` extension.
    fn resolve_include(&self, path: &str) -> PathBuf {
        let file = PathBuf::from(path);
        if self.files.exists(&file) || file.extension().is_some_and(|ext| ext == "asm") {
            file
        } else {
            PathBuf::from(format!("{}.asm", path))
        }
    }

    fn log_line(&self, line: &Line, position: &SourcePosition, text: &str) {
        tracing::debug!(
            "{:<15}{} | {:x}: {}",
            line.category(),
            position.line,
            self.offset_in_bank,
            text.trim()
        );
    }

    /// Pass 1 of the entry file and the files it includes outside of bank definitions.
    #[tracing::instrument(skip(self, state, chain))]
    fn parse_entry_file(
        &mut self,
        path: &Path,
        state: &mut EntryState,
        chain: &mut Vec<PathBuf>,
    ) -> Result<(), LayoutError> {
        chain.push(path.to_owned());
        let text = self.files.read(path)?;
        let lines: Vec<&str> = text.lines().collect();

        let mut index = 0;
        while index < lines.len() {
            let raw = lines[index];
            let position = SourcePosition::new(path, index + 1);
            let line = classify(raw, |name| self.macros.contains_key(name));
            self.log_line(&line, &position, raw);

            match line {
                Line::MacroStart { .. } => {
                    let definition = Macro::parse_macro(&lines[index..], position)?;
                    index += definition.line_count();
                    self.macros.insert(definition.name.clone(), definition);
                    continue;
                }
                Line::Org { operand } => {
                    let address = self.evaluate(operand, &position)?;
                    match state.pending_bank.as_mut() {
                        Some((_, origin)) => *origin = fit(address, &position)?,
                        None => state.ram_address = address,
                    }
                }
                Line::Ds { name, size } => {
                    let size = self.evaluate(size, &position)?;
                    if let Some(name) = name {
                        let address: u16 = fit(state.ram_address, &position)?;
                        let position = SourcePosition {
                            byte_offset: Some(address as usize),
                            ..position.clone()
                        };
                        self.define(name, SymbolType::RamVariable(address), &position)?;
                    }
                    state.ram_address += size;
                }
                Line::SymbolDefinition { name, .. } => {
                    // Bulk RAM definitions name the current address
                    let address: u16 = fit(state.ram_address, &position)?;
                    self.define(name, SymbolType::RamVariable(address), &position)?;
                }
                Line::Func { name, body } => {
                    self.define(name, SymbolType::Function(body.to_owned()), &position)?;
                }
                Line::Ines { directive, value } => {
                    let value: u8 = fit(self.evaluate(value, &position)?, &position)?;
                    match directive {
                        Directive::InesPrg => self.header.prg_count = value,
                        Directive::InesChr => self.header.chr_count = value,
                        Directive::InesMap => self.header.mapper = value,
                        Directive::InesMir => self.header.mirroring = value,
                        _ => {}
                    }
                }
                Line::Bank { index: bank } => {
                    let number = self.evaluate(bank, &position)?;
                    let bank_index =
                        usize::try_from(number).map_err(|_| LayoutError::InvalidBank {
                            index: bank.to_owned(),
                            position: position.clone(),
                        })?;
                    state.pending_bank = Some((bank_index, DEFAULT_BANK_ORIGIN));
                }
                Line::IncChr { path: chr_file } => {
                    let chr_file = PathBuf::from(chr_file);
                    if !self.files.exists(&chr_file) {
                        return Err(SourceError::Missing(chr_file).into());
                    }
                    self.chr_files.push(chr_file);
                }
                Line::Include {
                    label: None,
                    path: include,
                } => {
                    let file = self.resolve_include(include);
                    match state.pending_bank.take() {
                        Some((bank_index, origin)) => {
                            if !self.files.exists(&file) {
                                return Err(SourceError::Missing(file).into());
                            }
                            self.banks.insert(
                                bank_index,
                                Bank {
                                    index: bank_index,
                                    file,
                                    origin,
                                    size: 0,
                                },
                            );
                        }
                        None => {
                            if chain.contains(&file) {
                                return Err(LayoutError::IncludeCycle { file, position });
                            }
                            self.parse_entry_file(&file, state, chain)?;
                        }
                    }
                }
                Line::Include {
                    label: Some(label), ..
                } => {
                    self.define(label, SymbolType::Label(None), &position)?;
                }
                Line::ConstAssignment { name, value } => {
                    self.define_constant(name, value, &position)?;
                }
                Line::Anomaly => tracing::warn!("{}: tolerating '{}'", position, KNOWN_ANOMALY),
                Line::Unknown => {
                    return Err(LayoutError::Unclassifiable {
                        position,
                        line: raw.trim().to_owned(),
                    })
                }
                Line::Empty
                | Line::Comment
                | Line::MacroEnd
                | Line::Data { .. }
                | Line::Ignored(_)
                | Line::Directive(_)
                | Line::Instruction { .. }
                | Line::MacroInvocation { .. }
                | Line::FuncCall { .. } => {}
            }
            index += 1;
        }

        chain.pop();
        Ok(())
    }

    /// Pass 1 of a bank file: labels, constants, functions and macros. Each file is read once,
    /// even if several banks include it.
    #[tracing::instrument(skip(self))]
    fn pass_1_file(&mut self, path: &Path) -> Result<(), LayoutError> {
        if !self.visited.insert(path.to_owned()) {
            return Ok(());
        }

        let text = self.files.read(path)?;
        let lines: Vec<&str> = text.lines().collect();

        let mut index = 0;
        while index < lines.len() {
            let raw = lines[index];
            let position = SourcePosition::new(path, index + 1);

            match classify(raw, |name| self.macros.contains_key(name)) {
                Line::MacroStart { .. } => {
                    let definition = Macro::parse_macro(&lines[index..], position)?;
                    index += definition.line_count();
                    self.macros.insert(definition.name.clone(), definition);
                    continue;
                }
                Line::Func { name, body } => {
                    self.define(name, SymbolType::Function(body.to_owned()), &position)?;
                }
                Line::Data {
                    label: Some(name), ..
                }
                | Line::Include {
                    label: Some(name), ..
                }
                | Line::Ds {
                    name: Some(name), ..
                }
                | Line::SymbolDefinition { name, .. } => {
                    self.define(name, SymbolType::Label(None), &position)?;
                }
                Line::Include {
                    label: None,
                    path: include,
                } => {
                    let file = self.resolve_include(include);
                    self.pass_1_file(&file)?;
                }
                Line::ConstAssignment { name, value } => {
                    self.define_constant(name, value, &position)?;
                }
                // Reported by pass 2, macros may only be known by then
                _ => {}
            }
            index += 1;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn pass_2_bank(&mut self, index: usize) -> Result<(), LayoutError> {
        let Some(bank) = self.banks.get(&index).cloned() else {
            return Ok(());
        };
        let bank_size = self.config.prg_bank_size;

        self.bank_base = index * bank_size;
        self.offset_in_bank = 0;
        self.origin = bank.origin;

        self.pass_2_file(&bank.file, &mut Vec::new())?;

        if self.offset_in_bank > bank_size {
            tracing::warn!(
                "Bank {} ({}) overflows by {} bytes",
                index,
                bank.file.display(),
                self.offset_in_bank - bank_size
            );
        }

        self.image_size = self.image_size.max(self.bank_base + self.offset_in_bank);
        if let Some(bank) = self.banks.get_mut(&index) {
            bank.size = self.offset_in_bank;
        }
        Ok(())
    }

    fn pass_2_file(&mut self, path: &Path, chain: &mut Vec<PathBuf>) -> Result<(), LayoutError> {
        chain.push(path.to_owned());
        let text = self.files.read(path)?;

        let mut in_macro = false;
        for (index, raw) in text.lines().enumerate() {
            if in_macro {
                in_macro = !is_macro_end(raw);
                continue;
            }
            let position = SourcePosition::new(path, index + 1);
            in_macro = self.account(raw, &position, chain)?;
        }

        chain.pop();
        Ok(())
    }

    /// Counts the bytes of a line, expanding macros on the way. Returns whether the line starts
    /// a macro definition.
    fn account(
        &mut self,
        raw: &str,
        position: &SourcePosition,
        chain: &mut Vec<PathBuf>,
    ) -> Result<bool, LayoutError> {
        let mut pending = vec![(raw.to_owned(), 0)];

        while let Some((text, depth)) = pending.pop() {
            let line = classify(&text, |name| self.macros.contains_key(name));
            self.log_line(&line, position, &text);

            match line {
                Line::MacroStart { .. } if depth == 0 => return Ok(true),
                Line::Data {
                    label,
                    unit,
                    operand,
                } => {
                    if let Some(label) = label {
                        self.place_label(label, position)?;
                    }
                    let count = count_data(operand, unit).map_err(at(position))?;
                    self.add_bytes(count, position);
                }
                Line::Instruction { mnemonic, operand } => {
                    let count =
                        count_instruction(mnemonic, operand, &self.symbols).map_err(at(position))?;
                    self.add_bytes(count, position);
                }
                Line::MacroInvocation { name, args } => {
                    if depth >= MAX_MACRO_DEPTH {
                        return Err(LayoutError::MacroDepth {
                            position: position.clone(),
                            depth: MAX_MACRO_DEPTH,
                        });
                    }
                    let args = split_arguments(args);
                    if let Some(definition) = self.macros.get(name) {
                        let body = definition.expand_body(&args);
                        pending.extend(body.into_iter().rev().map(|line| (line, depth + 1)));
                    }
                }
                Line::SymbolDefinition { name, statement } => {
                    self.place_label(name, position)?;
                    if !statement.is_empty() {
                        pending.push((statement.to_owned(), depth));
                    }
                }
                Line::Include {
                    label: None,
                    path: include,
                } => {
                    let file = self.resolve_include(include);
                    if chain.contains(&file) {
                        return Err(LayoutError::IncludeCycle {
                            file,
                            position: position.clone(),
                        });
                    }
                    self.pass_2_file(&file, chain)?;
                }
                Line::Include {
                    label: Some(label),
                    path: include,
                } => {
                    self.place_label(label, position)?;
                    let file = self.resolve_include(include);
                    let count = self.count_include_bytes(&file, position, chain)?;
                    self.add_bytes(count, position);
                }
                Line::Ds { name, size } => {
                    if let Some(name) = name {
                        self.place_label(name, position)?;
                    }
                    let size = self.evaluate(size, position)?;
                    self.add_bytes(size.max(0) as usize, position);
                }
                Line::FuncCall { name } => {
                    let is_function = matches!(
                        self.symbols.find_symbol(name),
                        Some(Symbol {
                            symbol: SymbolType::Function(_),
                            ..
                        })
                    );
                    if !is_function && !is_built_in_function(name) {
                        return Err(LayoutError::UnknownFunction {
                            name: name.to_owned(),
                            position: position.clone(),
                        });
                    }
                }
                Line::Anomaly => {
                    tracing::warn!("{}: tolerating '{}'", position, KNOWN_ANOMALY);
                    self.offset_in_bank = KNOWN_ANOMALY_ADDRESS % self.config.prg_bank_size;
                }
                Line::MacroStart { .. } | Line::Unknown => {
                    return Err(LayoutError::Unclassifiable {
                        position: position.clone(),
                        line: text.trim().to_owned(),
                    })
                }
                Line::Empty
                | Line::Comment
                | Line::MacroEnd
                | Line::Org { .. }
                | Line::Func { .. }
                | Line::Ines { .. }
                | Line::Bank { .. }
                | Line::IncChr { .. }
                | Line::Ignored(_)
                | Line::Directive(_)
                | Line::ConstAssignment { .. } => {}
            }
        }

        Ok(false)
    }

    /// Sums the data lines of a data include and the files it includes.
    fn count_include_bytes(
        &self,
        path: &Path,
        position: &SourcePosition,
        chain: &mut Vec<PathBuf>,
    ) -> Result<usize, LayoutError> {
        if chain.iter().any(|file| file == path) {
            return Err(LayoutError::IncludeCycle {
                file: path.to_owned(),
                position: position.clone(),
            });
        }
        chain.push(path.to_owned());
        let text = self.files.read(path)?;

        let mut count = 0;
        for (index, raw) in text.lines().enumerate() {
            let line_position = SourcePosition::new(path, index + 1);
            match classify(raw, |name| self.macros.contains_key(name)) {
                Line::Data { unit, operand, .. } => {
                    count += count_data(operand, unit).map_err(at(&line_position))?;
                }
                Line::Include { path: include, .. } => {
                    let file = self.resolve_include(include);
                    count += self.count_include_bytes(&file, &line_position, chain)?;
                }
                _ => {}
            }
        }

        chain.pop();
        Ok(count)
    }

    /// Gives a label the CPU address of the next byte.
    fn place_label(&mut self, name: &str, position: &SourcePosition) -> Result<(), LayoutError> {
        let address = self.origin.wrapping_add(self.offset_in_bank as u16);
        match self.symbols.set_label_address(name, address) {
            Ok(()) => Ok(()),
            // Labels coming from macro expansions are first seen here
            Err(SymbolError::SymbolNotFound(_)) => {
                self.define(name, SymbolType::Label(Some(address)), position)
            }
            Err(source) => Err(symbol_at(position)(source)),
        }
    }

    /// Records the line as the origin of the byte at the current offset and moves past `count`
    /// bytes.
    fn add_bytes(&mut self, count: usize, position: &SourcePosition) {
        if count == 0 {
            return;
        }
        let offset = self.bank_base + self.offset_in_bank;
        self.bytes_to_lines
            .entry(offset)
            .or_insert_with(|| SourcePosition {
                byte_offset: Some(offset),
                ..position.clone()
            });
        self.offset_in_bank += count;
    }
}
