use thiserror::Error;

use crate::syntax::{is_symbol_char, is_symbol_start, NumberError};

/// Arena holding the parsed expression.
pub mod tree;

/// Computing the value of a parsed expression.
pub mod eval;

pub use tree::{Leaf, LeafType, NodeId, Tree};

// Example operands:
//
//   2,   4,   2,   8       ; listing of numbers
//   MLEN(DMC01, DMC01_End) ; function call with two parameters
//   ($FF & $FF00) >> 8     ; formula on parenthesized formula
//   \1 >> 8                ; macro parameter
//   -$01, $01              ; signed numbers

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormulaError {
    #[error("Unexpected character '{ch}' at column {column} in '{line}'")]
    UnexpectedCharacter { ch: char, column: usize, line: String },
    #[error("Expected an operator before column {column} in '{line}'")]
    MissingOperator { column: usize, line: String },
    #[error("Operator '{0}' is missing an operand")]
    MissingOperand(String),
    #[error("Unknown operator '{0}'")]
    UnknownOperator(String),
    #[error("Closing parenthesis at column {column} has no opening one in '{line}'")]
    UnmatchedParenthesis { column: usize, line: String },
    #[error("Parenthesis left open in '{0}'")]
    UnclosedParenthesis(String),
    #[error("Ran out of characters in state {state:?} in '{line}'")]
    RanOutOfCharacters { state: ParseState, line: String },
    #[error("Macro parameter must be a digit from 1 to 9, got '{0}'")]
    InvalidMacroParameter(char),
    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] NumberError),
    #[error("Symbol '{0}' has no value")]
    UnresolvedSymbol(String),
    #[error("Macro parameter '{0}' has no value")]
    UnresolvedMacroParameter(String),
    #[error("Function '{0}' can not be evaluated")]
    UnknownFunction(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Result does not fit in 64 bits")]
    Overflow,
    #[error("Can not shift by {0} bits")]
    ShiftOutOfRange(i64),
    #[error("Expression does not have a single value")]
    NotASingleValue,
    #[error("Empty expression")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Neutral,
    Symbol,
    Numeral,
    Binary,
    Decimal,
    Hexadecimal,
    Quoted,
    FunctionParams,
    Parens,
    Operator,
    MacroParam,
    Comment,
    End,
}

/// An operand parsed into a tree, together with its atomic parts in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    pub tree: Tree,
    pub parts: Vec<String>,
}

impl Formula {
    pub fn has_symbols(&self) -> bool {
        self.tree.has_symbols()
    }

    pub fn has_macro_params(&self) -> bool {
        self.tree.has_macro_params()
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.tree.symbols()
    }

    pub fn fill_in_symbols(&mut self, values: &std::collections::HashMap<String, String>) {
        self.tree.fill_in_symbols(values);
    }

    pub fn byte_size(&self) -> Result<usize, FormulaError> {
        self.tree.byte_size_of(Tree::ROOT)
    }

    pub fn evaluate(&self) -> Result<i64, FormulaError> {
        eval::evaluate(&self.tree)
    }

    pub fn debug_string(&self) -> String {
        self.tree.debug_string()
    }
}

/// Parses an operand into a [`Formula`].
#[tracing::instrument]
pub fn parse_formula(line: &str) -> Result<Formula, FormulaError> {
    FormulaParser::new(line).parse()
}

/// Character driven state machine building a [`Tree`].
pub struct FormulaParser<'a> {
    line: &'a str,
    chars: Vec<char>,
    position: usize, // Current position in chars
    state: ParseState,
    tree: Tree,
    cursor: NodeId,        // Node that receives new operands
    token: Option<NodeId>, // Leaf currently being read
    quote: char,
    expect_operand: bool,
    last_was_operator: bool,
    parts: Vec<String>,
}

impl<'a> FormulaParser<'a> {
    pub fn new(line: &'a str) -> Self {
        Self {
            line,
            chars: line.chars().collect(),
            position: 0,
            state: ParseState::Neutral,
            tree: Tree::new(),
            cursor: Tree::ROOT,
            token: None,
            quote: '\'',
            expect_operand: true,
            last_was_operator: false,
            parts: Vec::new(),
        }
    }

    pub fn parse(mut self) -> Result<Formula, FormulaError> {
        while self.state != ParseState::End {
            let Some(ch) = self.ch() else {
                break;
            };

            match self.state {
                ParseState::Neutral => self.do_neutral(ch)?,
                ParseState::Symbol => self.do_symbol(ch),
                ParseState::Numeral => self.do_numeral(ch)?,
                ParseState::Binary => self.do_digits(ch, |ch| ch == '0' || ch == '1')?,
                ParseState::Decimal => self.do_digits(ch, |ch| ch.is_ascii_digit())?,
                ParseState::Hexadecimal => self.do_digits(ch, |ch| ch.is_ascii_hexdigit())?,
                ParseState::Quoted => self.do_quoted(ch),
                ParseState::FunctionParams => self.open(LeafType::FunctionParams)?,
                ParseState::Parens => self.open(LeafType::Parens)?,
                ParseState::Operator => self.do_operator(ch)?,
                ParseState::MacroParam => self.do_macro_param(ch)?,
                ParseState::Comment | ParseState::End => self.state = ParseState::End,
            }
        }

        self.finish()
    }

    fn ch(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.position + 1).copied()
    }

    fn skip(&mut self) {
        self.position += 1;
    }

    /// Moves the current character into the token being read.
    fn take(&mut self) {
        if let (Some(token), Some(ch)) = (self.token, self.ch()) {
            self.tree.value_mut(token).push(ch);
        }
        self.position += 1;
    }

    fn unexpected(&self, ch: char) -> FormulaError {
        FormulaError::UnexpectedCharacter {
            ch,
            column: self.position,
            line: self.line.to_owned(),
        }
    }

    fn do_neutral(&mut self, ch: char) -> Result<(), FormulaError> {
        if is_symbol_start(ch) {
            self.start_token(LeafType::Symbol)?;
            self.state = ParseState::Symbol;
        } else if ch == '\\' {
            self.start_token(LeafType::MacroParam)?;
            self.take();
            self.state = ParseState::MacroParam;
        } else if ch == '\'' || ch == '"' {
            self.start_token(LeafType::Number)?;
            self.quote = ch;
            self.take();
            self.state = ParseState::Quoted;
        } else if self.is_numeral_start(ch) {
            self.state = ParseState::Numeral;
        } else if ch == '(' {
            self.state = if self.tree.leaf_type(self.cursor) == LeafType::FunctionName {
                ParseState::FunctionParams
            } else {
                ParseState::Parens
            };
        } else if ch == ')' {
            self.close()?;
        } else if ch == ';' {
            self.state = ParseState::Comment;
        } else if is_operator_char(ch) {
            self.state = ParseState::Operator;
        } else if ch == ',' {
            self.insert_listing()?;
        } else if ch.is_whitespace() {
            self.skip();
        } else {
            return Err(self.unexpected(ch));
        }
        Ok(())
    }

    /// `+`, `-` and `%` only start numbers where an operand is expected.
    fn is_numeral_start(&self, ch: char) -> bool {
        match ch {
            '$' => true,
            '+' | '-' | '%' => self.expect_operand,
            _ => ch.is_ascii_digit(),
        }
    }

    /// Adds an operand leaf under the cursor and starts reading into it.
    fn start_token(&mut self, leaf_type: LeafType) -> Result<(), FormulaError> {
        if !self.expect_operand {
            return Err(FormulaError::MissingOperator {
                column: self.position,
                line: self.line.to_owned(),
            });
        }
        self.token = Some(self.tree.push(self.cursor, "", leaf_type));
        self.expect_operand = false;
        self.last_was_operator = false;
        Ok(())
    }

    fn end_token(&mut self) {
        if let Some(token) = self.token.take() {
            self.parts.push(self.tree.leaf(token).value.clone());
        }
        self.state = ParseState::Neutral;
    }

    fn do_symbol(&mut self, ch: char) {
        if is_symbol_char(ch) {
            self.take();
        } else {
            self.end_symbol(Some(ch));
        }
    }

    fn end_symbol(&mut self, next: Option<char>) {
        if let (Some(token), Some('(')) = (self.token, next) {
            self.tree.set_leaf_type(token, LeafType::FunctionName);
            self.cursor = token;
        }
        self.end_token();
    }

    fn do_numeral(&mut self, ch: char) -> Result<(), FormulaError> {
        match ch {
            '+' | '-' if self.token.is_none() => {
                let signs_literal = matches!(
                    self.peek_char(),
                    Some(next) if next == '$' || next == '%' || next.is_ascii_digit()
                );
                if signs_literal {
                    self.start_token(LeafType::Number)?;
                    self.take();
                } else {
                    self.state = ParseState::Operator;
                }
            }
            '$' | '%' => {
                if self.token.is_none() {
                    self.start_token(LeafType::Number)?;
                }
                self.take();
                self.state = if ch == '$' {
                    ParseState::Hexadecimal
                } else {
                    ParseState::Binary
                };
            }
            '0'..='9' => {
                if self.token.is_none() {
                    self.start_token(LeafType::Number)?;
                }
                self.state = ParseState::Decimal;
            }
            _ => return Err(self.unexpected(ch)),
        }
        Ok(())
    }

    fn do_digits(&mut self, ch: char, is_digit: fn(char) -> bool) -> Result<(), FormulaError> {
        if is_digit(ch) {
            self.take();
            Ok(())
        } else {
            self.end_number()
        }
    }

    fn end_number(&mut self) -> Result<(), FormulaError> {
        if let Some(token) = self.token {
            let value = &self.tree.leaf(token).value;
            let digits = value.trim_start_matches(['-', '+']).trim_start_matches(['$', '%']);
            if digits.is_empty() {
                return Err(NumberError::Invalid(value.clone()).into());
            }
        }
        self.end_token();
        Ok(())
    }

    fn do_quoted(&mut self, ch: char) {
        self.take();
        let closed = self
            .token
            .is_some_and(|token| ch == self.quote && self.tree.leaf(token).value.len() > 1);
        if closed {
            self.end_token();
        }
    }

    fn do_macro_param(&mut self, ch: char) -> Result<(), FormulaError> {
        if !('1'..='9').contains(&ch) {
            return Err(FormulaError::InvalidMacroParameter(ch));
        }
        self.take();
        self.end_token();
        Ok(())
    }

    /// Opens parentheses, either the parameters of the function name under the cursor or a
    /// plain group.
    fn open(&mut self, leaf_type: LeafType) -> Result<(), FormulaError> {
        if leaf_type == LeafType::Parens && !self.expect_operand {
            return Err(FormulaError::MissingOperator {
                column: self.position,
                line: self.line.to_owned(),
            });
        }
        self.cursor = self.tree.push(self.cursor, "()", leaf_type);
        self.expect_operand = true;
        self.last_was_operator = false;
        self.skip();
        self.state = ParseState::Neutral;
        Ok(())
    }

    fn close(&mut self) -> Result<(), FormulaError> {
        if self.last_was_operator {
            return Err(FormulaError::MissingOperand(self.line.to_owned()));
        }

        let mut node = self.cursor;
        self.cursor = loop {
            match self.tree.leaf_type(node) {
                LeafType::FunctionParams => {
                    let function = self.tree.parent(node);
                    break function.and_then(|function| self.tree.parent(function));
                }
                LeafType::Parens => break self.tree.parent(node),
                LeafType::Root => break None,
                _ => match self.tree.parent(node) {
                    Some(parent) => node = parent,
                    None => break None,
                },
            }
        }
        .ok_or_else(|| FormulaError::UnmatchedParenthesis {
            column: self.position,
            line: self.line.to_owned(),
        })?;

        self.expect_operand = false;
        self.skip();
        Ok(())
    }

    fn do_operator(&mut self, ch: char) -> Result<(), FormulaError> {
        let operator = match (ch, self.peek_char()) {
            ('<', Some('<')) => "<<".to_owned(),
            ('>', Some('>')) => ">>".to_owned(),
            _ => ch.to_string(),
        };

        if self.expect_operand {
            // Unary operator: starts a formula of its own
            if !matches!(operator.as_str(), "-" | "+" | "~" | "<" | ">") {
                return Err(FormulaError::MissingOperand(operator));
            }
            self.cursor = self.tree.push(self.cursor, "", LeafType::Formula);
        } else {
            if operator == "<" || operator == ">" {
                return Err(FormulaError::UnknownOperator(operator));
            }
            self.close_unary_formulas();
            if self.tree.leaf_type(self.cursor) != LeafType::Formula {
                self.cursor = self
                    .tree
                    .wrap_last_child(self.cursor, LeafType::Formula)
                    .ok_or_else(|| FormulaError::MissingOperand(operator.clone()))?;
            }
        }

        self.tree.push(self.cursor, &operator, LeafType::Operator);
        self.position += operator.len();
        self.parts.push(operator);
        self.expect_operand = true;
        self.last_was_operator = true;
        self.state = ParseState::Neutral;
        Ok(())
    }

    /// Leaves formulas of a unary operator which already got their operand.
    fn close_unary_formulas(&mut self) {
        loop {
            let children = self.tree.children(self.cursor);
            let is_complete_unary = self.tree.leaf_type(self.cursor) == LeafType::Formula
                && children.len() >= 2
                && self.tree.leaf_type(children[0]) == LeafType::Operator;
            match self.tree.parent(self.cursor) {
                Some(parent) if is_complete_unary => self.cursor = parent,
                _ => break,
            }
        }
    }

    /// A comma ends the current element and makes it part of a listing.
    fn insert_listing(&mut self) -> Result<(), FormulaError> {
        if self.expect_operand {
            return Err(self.unexpected(','));
        }

        while self.tree.leaf_type(self.cursor) == LeafType::Formula {
            match self.tree.parent(self.cursor) {
                Some(parent) => self.cursor = parent,
                None => break,
            }
        }

        if self.tree.leaf_type(self.cursor) != LeafType::Listing {
            self.cursor = self
                .tree
                .wrap_last_child(self.cursor, LeafType::Listing)
                .ok_or_else(|| self.unexpected(','))?;
        }

        self.expect_operand = true;
        self.skip();
        Ok(())
    }

    fn finish(mut self) -> Result<Formula, FormulaError> {
        match self.state {
            ParseState::Symbol => self.end_symbol(None),
            ParseState::Binary | ParseState::Decimal | ParseState::Hexadecimal => {
                self.end_number()?
            }
            ParseState::Neutral | ParseState::Comment | ParseState::End => {}
            state => {
                return Err(FormulaError::RanOutOfCharacters {
                    state,
                    line: self.line.to_owned(),
                })
            }
        }

        if self.last_was_operator {
            return Err(FormulaError::MissingOperand(self.line.to_owned()));
        }

        let mut node = Some(self.cursor);
        while let Some(current) = node {
            if matches!(
                self.tree.leaf_type(current),
                LeafType::Parens | LeafType::FunctionParams | LeafType::FunctionName
            ) {
                return Err(FormulaError::UnclosedParenthesis(self.line.to_owned()));
            }
            node = self.tree.parent(current);
        }

        Ok(Formula {
            tree: self.tree,
            parts: self.parts,
        })
    }
}

fn is_operator_char(ch: char) -> bool {
    matches!(ch, '+' | '-' | '*' | '/' | '%' | '^' | '&' | '|' | '~' | '<' | '>')
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn parts(line: &str) -> Vec<String> {
        parse_formula(line).unwrap().parts
    }

    #[test]
    fn test_parts() {
        let tests = vec![
            ("2,   4,   2,   8\t; 0", vec!["2", "4", "2", "8"]),
            ("MLEN(DMC01, DMC01_End)", vec!["MLEN", "DMC01", "DMC01_End"]),
            ("(TimeBonus_Score - 1)", vec!["TimeBonus_Score", "-", "1"]),
            ("($FF & $FF00) >> 8", vec!["$FF", "&", "$FF00", ">>", "8"]),
            ("\\1 >> 8", vec!["\\1", ">>", "8"]),
            ("-$01, $01", vec!["-$01", "$01"]),
            ("$00, -$03,  $03, $00", vec!["$00", "-$03", "$03", "$00"]),
            ("'A', \"BC\"", vec!["'A'", "\"BC\""]),
            ("%0101 % 3", vec!["%0101", "%", "3"]),
            ("Counter-1", vec!["Counter", "-", "1"]),
            ("1 << 4", vec!["1", "<<", "4"]),
            ("<Label, >Label", vec!["<", "Label", ">", "Label"]),
        ];

        for (line, expected) in tests {
            assert_eq!(parts(line), expected, "parts of '{}'", line);
        }
    }

    #[test]
    fn test_listing_of_numbers() {
        let formula = parse_formula("2,   4,   2,   8\t; 0").unwrap();

        assert_eq!(
            formula.debug_string(),
            "('', ROOT, l=[('', LISTING, l=[('2', NUMBER, l=[]), ('4', NUMBER, l=[]), \
             ('2', NUMBER, l=[]), ('8', NUMBER, l=[])])])"
        );
        assert!(!formula.has_symbols());
    }

    #[test]
    fn test_function_call() {
        let formula = parse_formula("MLEN(DMC01, DMC01_End)").unwrap();

        assert_eq!(
            formula.debug_string(),
            "('', ROOT, l=[('MLEN', FUNCTION_NAME, l=[('()', FUNCTION_PARAMS, l=[('', LISTING, \
             l=[('DMC01', SYMBOL, l=[]), ('DMC01_End', SYMBOL, l=[])])])])])"
        );
        assert_eq!(formula.symbols(), vec!["DMC01", "DMC01_End"]);
    }

    #[test]
    fn test_formula_in_parens() {
        let formula = parse_formula("(TimeBonus_Score - 1)").unwrap();

        assert_eq!(
            formula.debug_string(),
            "('', ROOT, l=[('()', PARENS, l=[('', FORMULA, l=[('TimeBonus_Score', SYMBOL, l=[]), \
             ('-', OPERATOR, l=[]), ('1', NUMBER, l=[])])])])"
        );
    }

    #[test]
    fn test_operator_chain_shares_one_formula() {
        let formula =
            parse_formula("OAT_BOUNDBOX01 | OAT_FIREIMMUNITY | OAT_HITNOTKILL").unwrap();

        assert_eq!(
            formula.debug_string(),
            "('', ROOT, l=[('', FORMULA, l=[('OAT_BOUNDBOX01', SYMBOL, l=[]), ('|', OPERATOR, \
             l=[]), ('OAT_FIREIMMUNITY', SYMBOL, l=[]), ('|', OPERATOR, l=[]), \
             ('OAT_HITNOTKILL', SYMBOL, l=[])])])"
        );
    }

    #[test]
    fn test_parens_inside_listing() {
        let formula = parse_formula("0, (LL_LargeBGClouds2B - LL_LargeBGClouds2)").unwrap();

        assert_eq!(
            formula.debug_string(),
            "('', ROOT, l=[('', LISTING, l=[('0', NUMBER, l=[]), ('()', PARENS, l=[('', FORMULA, \
             l=[('LL_LargeBGClouds2B', SYMBOL, l=[]), ('-', OPERATOR, l=[]), \
             ('LL_LargeBGClouds2', SYMBOL, l=[])])])])])"
        );
    }

    #[test]
    fn test_macro_parameter() {
        let formula = parse_formula("\\1 >> 8").unwrap();

        assert!(formula.has_macro_params());
        assert!(!formula.has_symbols());
    }

    #[test]
    fn test_every_node_reaches_root() {
        let formula = parse_formula("HIGH(Table + 2), <(A_B - 1) * 3, \\2").unwrap();
        let tree = &formula.tree;

        let mut stack = vec![Tree::ROOT];
        while let Some(id) = stack.pop() {
            for child in tree.children(id) {
                assert_eq!(tree.parent(*child), Some(id));
                stack.push(*child);
            }
            let leaf = tree.leaf(id);
            if leaf.leaf_type.is_terminal() {
                assert!(leaf.leaves.is_empty());
            }
            if leaf.leaf_type == LeafType::Formula {
                assert!(leaf.leaves.len() >= 2);
            }
        }
    }

    #[test]
    fn test_invalid_formulas() {
        let tests = vec![
            ("(A + 1", FormulaError::UnclosedParenthesis("(A + 1".to_owned())),
            (
                "A + 1)",
                FormulaError::UnmatchedParenthesis {
                    column: 5,
                    line: "A + 1)".to_owned(),
                },
            ),
            ("A +", FormulaError::MissingOperand("A +".to_owned())),
            ("\\x", FormulaError::InvalidMacroParameter('x')),
            (
                "'AB",
                FormulaError::RanOutOfCharacters {
                    state: ParseState::Quoted,
                    line: "'AB".to_owned(),
                },
            ),
            (
                "A B",
                FormulaError::MissingOperator {
                    column: 2,
                    line: "A B".to_owned(),
                },
            ),
            ("$", NumberError::Invalid("$".to_owned()).into()),
            (
                "A @ B",
                FormulaError::UnexpectedCharacter {
                    ch: '@',
                    column: 2,
                    line: "A @ B".to_owned(),
                },
            ),
        ];

        for (line, expected) in tests {
            assert_eq!(parse_formula(line), Err(expected), "parsing '{}'", line);
        }
    }

    #[test]
    fn test_empty_operand() {
        let formula = parse_formula("   ; nothing here").unwrap();

        assert!(formula.parts.is_empty());
        assert_eq!(formula.debug_string(), "('', ROOT, l=[])");
    }
}
