use std::str::FromStr;

use crate::macros::{is_macro_end, macro_on_line};
use crate::source::strip_comment;
use crate::syntax::directive::DataUnit;
use crate::syntax::{is_identifier, Directive, Mnemonic};

/// The one line of the disassembly that does not follow the grammar: a `.org` missing its dot.
pub const KNOWN_ANOMALY: &str = "org $D800";

/// Offset the [`KNOWN_ANOMALY`] line moves to in its bank.
pub const KNOWN_ANOMALY_ADDRESS: usize = 0xD800;

/// Shape of a single source line.
///
/// Variants are listed in the order they are recognized, the first shape that fits wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    Empty,
    Comment,
    MacroStart { name: &'a str },
    MacroEnd,
    Org { operand: &'a str },
    Ds { name: Option<&'a str>, size: &'a str },
    Func { name: &'a str, body: &'a str },
    Ines { directive: Directive, value: &'a str },
    Bank { index: &'a str },
    IncChr { path: &'a str },
    Include { label: Option<&'a str>, path: &'a str },
    Data { label: Option<&'a str>, unit: DataUnit, operand: &'a str },
    /// `.code` and `.data`
    Ignored(Directive),
    /// Any other directive, contributes nothing.
    Directive(Directive),
    Instruction { mnemonic: Mnemonic, operand: &'a str },
    MacroInvocation { name: &'a str, args: &'a str },
    ConstAssignment { name: &'a str, value: &'a str },
    FuncCall { name: &'a str },
    /// A label, possibly followed by a statement on the same line.
    SymbolDefinition { name: &'a str, statement: &'a str },
    Anomaly,
    Unknown,
}

impl<'a> Line<'a> {
    pub fn category(&self) -> &'static str {
        match self {
            Line::Empty => "Empty Line",
            Line::Comment => "Comment",
            Line::MacroStart { .. } => "Macro Start",
            Line::MacroEnd => "Macro End",
            Line::Org { .. } => "Directive org",
            Line::Ds { .. } => "Directive ds",
            Line::Func { .. } => "Directive func",
            Line::Ines { .. } => "Directive ines",
            Line::Bank { .. } => "Bank Start",
            Line::IncChr { .. } => "Char Mem Incl",
            Line::Include { .. } => "Directive Incl",
            Line::Data {
                unit: DataUnit::Byte,
                ..
            } => "Byte Include",
            Line::Data {
                unit: DataUnit::Word,
                ..
            } => "Word Include",
            Line::Ignored(_) => "Directive igno",
            Line::Directive(_) => "Directive",
            Line::Instruction { .. } => "Instruction",
            Line::MacroInvocation { .. } => "Macro Invoke",
            Line::ConstAssignment { .. } => "Const Assign",
            Line::FuncCall { .. } => "Func Invoke",
            Line::SymbolDefinition { .. } => "Symbol Define",
            Line::Anomaly => "Anomaly",
            Line::Unknown => "Unknown",
        }
    }
}

fn split_first_word(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim()),
        None => (line, ""),
    }
}

/// `"PRG/prg000.asm"` to `PRG/prg000.asm`.
pub fn unquote(text: &str) -> &str {
    text.trim().trim_matches('"')
}

/// Classifies a raw source line. `is_macro` tells which words are names of known macros.
pub fn classify<'a>(raw: &'a str, is_macro: impl Fn(&str) -> bool) -> Line<'a> {
    if raw.trim().is_empty() {
        return Line::Empty;
    }

    let line = strip_comment(raw);
    if line.is_empty() {
        return Line::Comment;
    }
    if line == KNOWN_ANOMALY {
        return Line::Anomaly;
    }
    if let Some(name) = macro_on_line(line) {
        return Line::MacroStart { name };
    }
    if is_macro_end(line) {
        return Line::MacroEnd;
    }

    match split_label(line, &is_macro) {
        Some((name, statement)) => classify_labeled(name, statement),
        None => classify_statement(line, &is_macro),
    }
}

/// Splits `Name: statement` and `Name .directive ..` into name and statement.
fn split_label<'a>(line: &'a str, is_macro: impl Fn(&str) -> bool) -> Option<(&'a str, &'a str)> {
    if let Some((name, statement)) = line.split_once(':') {
        if is_identifier(name) {
            return Some((name, statement.trim()));
        }
    }

    let (first, rest) = split_first_word(line);
    let is_named_directive = is_identifier(first)
        && rest.starts_with('.')
        && Mnemonic::from_str(first).is_err()
        && !is_macro(first);

    is_named_directive.then_some((first, rest))
}

fn classify_labeled<'a>(name: &'a str, statement: &'a str) -> Line<'a> {
    let (first, rest) = split_first_word(statement);
    if !first.starts_with('.') {
        return Line::SymbolDefinition { name, statement };
    }

    match Directive::from_str(first) {
        Ok(Directive::Macro) => Line::MacroStart { name },
        Ok(Directive::Include) => Line::Include {
            label: Some(name),
            path: unquote(rest),
        },
        Ok(Directive::Ds) => Line::Ds {
            name: Some(name),
            size: rest,
        },
        Ok(Directive::Func) => Line::Func { name, body: rest },
        Ok(Directive::Equ) => Line::ConstAssignment { name, value: rest },
        Ok(directive) => match directive.data_unit() {
            Some(unit) => Line::Data {
                label: Some(name),
                unit,
                operand: rest,
            },
            None => Line::SymbolDefinition { name, statement },
        },
        Err(_) => Line::Unknown,
    }
}

fn classify_statement<'a>(line: &'a str, is_macro: impl Fn(&str) -> bool) -> Line<'a> {
    let (first, rest) = split_first_word(line);

    if first.starts_with('.') {
        let Ok(directive) = Directive::from_str(first) else {
            return Line::Unknown;
        };
        return match directive {
            Directive::Org => Line::Org { operand: rest },
            Directive::Ds => Line::Ds {
                name: None,
                size: rest,
            },
            Directive::Macro => Line::MacroStart { name: rest },
            Directive::EndM => Line::MacroEnd,
            Directive::Bank => Line::Bank { index: rest },
            Directive::IncChr => Line::IncChr {
                path: unquote(rest),
            },
            Directive::Include => Line::Include {
                label: None,
                path: unquote(rest),
            },
            directive if directive.is_ines() => Line::Ines {
                directive,
                value: rest,
            },
            directive if directive.is_ignored() => Line::Ignored(directive),
            directive => match directive.data_unit() {
                Some(unit) => Line::Data {
                    label: None,
                    unit,
                    operand: rest,
                },
                None => Line::Directive(directive),
            },
        };
    }

    if let Ok(mnemonic) = Mnemonic::from_str(first) {
        return Line::Instruction {
            mnemonic,
            operand: rest,
        };
    }

    if is_macro(first) {
        return Line::MacroInvocation {
            name: first,
            args: rest,
        };
    }

    if let Some((name, value)) = line.split_once('=') {
        let name = name.trim();
        if is_identifier(name) && !value.contains('=') {
            return Line::ConstAssignment {
                name,
                value: value.trim(),
            };
        }
    }

    if let Some((name, _)) = line.split_once('(') {
        if is_identifier(name) {
            return Line::FuncCall { name };
        }
    }

    if rest.is_empty() && is_identifier(first) {
        return Line::SymbolDefinition {
            name: first,
            statement: "",
        };
    }

    Line::Unknown
}
