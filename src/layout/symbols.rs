use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::formula::{parse_formula, Formula};
use crate::source::SourcePosition;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SymbolError {
    #[error("Symbol already defined: {name} (first defined at {first})")]
    SymbolAlreadyDefined { name: String, first: SourcePosition },
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolType {
    /// Code or data label, with its CPU address once the bytes in front of it are counted
    Label(Option<u16>),
    RamVariable(u16),
    Constant(i64),
    /// Constant defined by a calculation that has not been resolved (yet)
    DeferredConstant(String),
    /// `.func` definition with its body
    Function(String),
}

impl fmt::Display for SymbolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolType::Label(Some(address)) => write!(f, "Label({:#06x})", address),
            SymbolType::Label(None) => write!(f, "Label(?)"),
            SymbolType::RamVariable(address) => write!(f, "RamVariable({:#06x})", address),
            SymbolType::Constant(value) => write!(f, "Constant({:#x})", value),
            SymbolType::DeferredConstant(text) => write!(f, "DeferredConstant({})", text),
            SymbolType::Function(body) => write!(f, "Function({})", body),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Name of the symbol
    pub name: String,
    /// Symbol type with data
    pub symbol: SymbolType,
    /// Where the symbol is defined
    pub position: SourcePosition,
}

/// Writes a value the way the disassembly would, so that its byte size can be judged from it.
pub fn literal(value: i64) -> String {
    match value {
        0..=0xFF => format!("${:02X}", value),
        0x100..=0xFFFF => format!("${:04X}", value),
        _ => value.to_string(),
    }
}

/// All names the layout knows about: labels, RAM variables, constants and functions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable {
            symbols: HashMap::new(),
        }
    }

    pub fn find_symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    /// Adds a symbol. Defining a name again from the same position, which happens when a file is
    /// visited a second time, is not an error.
    #[tracing::instrument(skip(self))]
    pub fn new_symbol(&mut self, symbol: Symbol) -> Result<(), SymbolError> {
        if let Some(existing) = self.symbols.get(&symbol.name) {
            if existing.position == symbol.position {
                return Ok(());
            }
            return Err(SymbolError::SymbolAlreadyDefined {
                name: symbol.name,
                first: existing.position.clone(),
            });
        }
        self.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    pub fn set_label_address(&mut self, name: &str, address: u16) -> Result<(), SymbolError> {
        match self.symbols.get_mut(name) {
            Some(symbol) => {
                if let SymbolType::Label(_) = symbol.symbol {
                    symbol.symbol = SymbolType::Label(Some(address));
                }
                Ok(())
            }
            None => Err(SymbolError::SymbolNotFound(name.to_owned())),
        }
    }

    /// Value of a resolved constant, a RAM variable or a label with a known address.
    pub fn value_of(&self, name: &str) -> Option<i64> {
        match self.symbols.get(name)?.symbol {
            SymbolType::Constant(value) => Some(value),
            SymbolType::RamVariable(address) | SymbolType::Label(Some(address)) => {
                Some(address as i64)
            }
            _ => None,
        }
    }

    /// Name to literal text of every symbol with a known value, for
    /// [`crate::formula::Formula::fill_in_symbols`].
    pub fn resolved_values(&self) -> HashMap<String, String> {
        self.symbols
            .keys()
            .filter_map(|name| Some((name.clone(), literal(self.value_of(name)?))))
            .collect()
    }

    /// Fills in the values of the symbols `formula` mentions.
    pub fn fill_in(&self, formula: &mut Formula) {
        let values: HashMap<String, String> = formula
            .symbols()
            .into_iter()
            .filter_map(|name| Some((name.to_owned(), literal(self.value_of(name)?))))
            .collect();
        formula.fill_in_symbols(&values);
    }

    pub fn deferred_constants(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .symbols
            .values()
            .filter(|symbol| matches!(symbol.symbol, SymbolType::DeferredConstant(_)))
            .map(|symbol| symbol.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Resolves deferred constants by filling in the values of resolved ones, until a round
    /// resolves nothing new. Returns how many are left unresolved.
    #[tracing::instrument(skip(self))]
    pub fn resolve_deferred(&mut self) -> usize {
        loop {
            let values = self.resolved_values();
            let mut resolved = Vec::new();

            for symbol in self.symbols.values() {
                let SymbolType::DeferredConstant(text) = &symbol.symbol else {
                    continue;
                };
                let Ok(mut formula) = parse_formula(text) else {
                    continue;
                };
                formula.fill_in_symbols(&values);
                if let Ok(value) = formula.evaluate() {
                    resolved.push((symbol.name.clone(), value));
                }
            }

            if resolved.is_empty() {
                break;
            }
            for (name, value) in resolved {
                tracing::debug!("Resolved {} = {}", name, literal(value));
                if let Some(symbol) = self.symbols.get_mut(&name) {
                    symbol.symbol = SymbolType::Constant(value);
                }
            }
        }

        self.deferred_constants().len()
    }
}
