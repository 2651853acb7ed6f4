/// 6502 instruction mnemonics as they appear in the source.
pub mod mnemonic;

/// Assembler directives, i.e. the words starting with `.`.
pub mod directive;

/// Numeric literals: `$7F`, `%0101`, `48` and `'A'`.
pub mod number;

pub use directive::Directive;
pub use mnemonic::Mnemonic;
pub use number::{byte_length_of_number_string, parse_number, NumberError};

/// Binary operators understood in expressions. `~` is accepted in operator position as well.
pub const OPERATORS: [&str; 11] = ["+", "-", "*", "/", "%", "^", "&", "|", "~", "<<", ">>"];

/// Functions the assembler provides without a `.func` definition.
pub const BUILT_IN_FUNCTIONS: [&str; 5] = ["HIGH", "LOW", "BANK", "PAGE", "SIZEOF"];

pub fn is_operator(text: &str) -> bool {
    OPERATORS.contains(&text)
}

pub fn is_built_in_function(name: &str) -> bool {
    BUILT_IN_FUNCTIONS.contains(&name)
}

/// First character of an identifier.
pub fn is_symbol_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

pub fn is_symbol_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Whether `text` is a complete identifier, e.g. `Level_SlopeQuad00`.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => is_symbol_start(first) && chars.all(is_symbol_char),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_identifier() {
        let tests = vec![
            ("Level_SlopeQuad00", true),
            ("_private", true),
            ("A", true),
            ("0Start", false),
            ("Label:", false),
            ("", false),
        ];
        for (input, expected) in tests {
            assert_eq!(is_identifier(input), expected, "{}", input);
        }
    }

    #[test]
    fn test_operators() {
        assert!(is_operator("<<"));
        assert!(is_operator("|"));
        assert!(!is_operator("<"));
        assert!(!is_operator("="));
    }
}
