use thiserror::Error;

use crate::source::{strip_comment, SourcePosition};

pub const MACRO_START: &str = ".macro";
pub const MACRO_END: &str = ".endm";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MacroError {
    #[error("{0}: no macro definition on this line")]
    NotAMacro(SourcePosition),
    #[error("{position}: ran out of lines in the definition of macro '{name}'")]
    Unterminated {
        name: String,
        position: SourcePosition,
    },
}

/// Whether the line is a `.endm`.
pub fn is_macro_end(line: &str) -> bool {
    strip_comment(line)
        .split_whitespace()
        .any(|word| word.eq_ignore_ascii_case(MACRO_END))
}

/// Name of the macro defined on the line, e.g. `MusSeg` for `MusSeg .macro`.
pub fn macro_on_line(line: &str) -> Option<&str> {
    let line = strip_comment(line);
    let mut words = line.split_whitespace();
    let name = words.next()?.trim_end_matches(':');

    match words.next() {
        Some(directive) if directive.eq_ignore_ascii_case(MACRO_START) => Some(name),
        _ => None,
    }
}

/// Arguments of a macro invocation. Commas inside parentheses or quotes do not split.
pub fn split_arguments(args: &str) -> Vec<&str> {
    let args = args.trim();
    if args.is_empty() {
        return Vec::new();
    }

    let mut arguments = Vec::new();
    let mut depth = 0usize;
    let mut quote = None;
    let mut start = 0;
    for (index, ch) in args.char_indices() {
        match (quote, ch) {
            (Some(open), ch) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                arguments.push(args[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    arguments.push(args[start..].trim());
    arguments
}

/// A named template of source lines with positional parameters `\1` to `\9`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub name: String,
    /// Body without comments, including the `.macro` and `.endm` lines.
    pub lines: Vec<String>,
    pub position: SourcePosition,
}

impl Macro {
    /// Reads a macro definition from the `NAME .macro` line at the start of `lines` up to and
    /// including the first `.endm` line.
    pub fn parse_macro<S: AsRef<str>>(
        lines: &[S],
        position: SourcePosition,
    ) -> Result<Macro, MacroError> {
        let mut lines = lines.iter().map(|line| strip_comment(line.as_ref()));

        let first = lines.next().unwrap_or_default();
        let Some(name) = macro_on_line(first) else {
            return Err(MacroError::NotAMacro(position));
        };

        let mut body = vec![first.to_owned()];
        for line in lines {
            body.push(line.to_owned());
            if is_macro_end(line) {
                return Ok(Macro {
                    name: name.to_owned(),
                    lines: body,
                    position,
                });
            }
        }

        Err(MacroError::Unterminated {
            name: name.to_owned(),
            position,
        })
    }

    /// Number of source lines the definition spans.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Body lines with every `\N` replaced by the Nth argument.
    ///
    /// Empty lines are dropped. Nested macro invocations are left as they are.
    pub fn expand<S: AsRef<str>>(&self, args: &[S]) -> Vec<String> {
        self.lines
            .iter()
            .filter(|line| !line.is_empty())
            .map(|line| {
                // Backwards, so that `\1` does not eat the start of a `\10`
                args.iter()
                    .enumerate()
                    .rev()
                    .fold(line.clone(), |line, (index, arg)| {
                        line.replace(&format!("\\{}", index + 1), arg.as_ref())
                    })
            })
            .collect()
    }

    /// Expanded lines between the `.macro` and `.endm` delimiters.
    pub fn expand_body<S: AsRef<str>>(&self, args: &[S]) -> Vec<String> {
        let mut lines = self.expand(args);
        if lines.last().is_some_and(|line| is_macro_end(line)) {
            lines.pop();
        }
        if !lines.is_empty() {
            lines.remove(0);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn mus_seg() -> Macro {
        let definition = vec![
            "MusSeg .macro",
            ".byte \\1\t; Music_RestH_Base value (always divisible by $10)",
            ".word \\2\t; Address of music segment data",
            ".byte \\3\t; Triangle track starting offset ($00 means disabled)",
            ".byte \\4\t; Square 1 track starting offset (cannot be disabled)",
            ".byte \\5\t; Noise track starting offset ($00 means disabled)",
            ".byte \\6\t; DCM track starting offset ($00 means disabled)",
            ".endm",
            "",
            "Music_Seg00: MusSeg $00, M12ASegData00, $00, $00, $00, $00",
        ];

        Macro::parse_macro(&definition, SourcePosition::new("smb3.asm", 120)).unwrap()
    }

    #[test]
    fn test_macro_lines() {
        let mus_seg = mus_seg();

        assert_eq!(mus_seg.name, "MusSeg");
        assert_eq!(
            mus_seg.lines,
            vec![
                "MusSeg .macro",
                ".byte \\1",
                ".word \\2",
                ".byte \\3",
                ".byte \\4",
                ".byte \\5",
                ".byte \\6",
                ".endm",
            ]
        );
        assert_eq!(mus_seg.line_count(), 8);
    }

    #[test]
    fn test_macro_expansion() {
        let args = ["$FF", "$FFFF", "$FF", "Bro_Const", "$FF", "$FF"];

        assert_eq!(
            mus_seg().expand(&args),
            vec![
                "MusSeg .macro",
                ".byte $FF",
                ".word $FFFF",
                ".byte $FF",
                ".byte Bro_Const",
                ".byte $FF",
                ".byte $FF",
                ".endm",
            ]
        );
        assert_eq!(mus_seg().expand_body(&args).len(), 6);
    }

    #[test]
    fn test_macro_on_line() {
        let tests = vec![
            ("MusSeg .macro", Some("MusSeg")),
            ("LoadPtr: .MACRO\t; pointer", Some("LoadPtr")),
            (".byte $00", None),
            ("; MusSeg .macro", None),
            ("Label: LDA #$00", None),
        ];

        for (line, expected) in tests {
            assert_eq!(macro_on_line(line), expected, "'{}'", line);
        }
    }

    #[test]
    fn test_split_arguments() {
        let tests = vec![
            ("", vec![]),
            ("$01", vec!["$01"]),
            ("Seg0, Seg0_End, 3", vec!["Seg0", "Seg0_End", "3"]),
            ("MLEN(A, B), 2", vec!["MLEN(A, B)", "2"]),
            ("\"A, B\", ','", vec!["\"A, B\"", "','"]),
            ("(1, 2), , 3", vec!["(1, 2)", "", "3"]),
        ];

        for (args, expected) in tests {
            assert_eq!(split_arguments(args), expected, "'{}'", args);
        }
    }

    #[test]
    fn test_unterminated_macro() {
        let definition = ["Broken .macro", ".byte \\1", ""];

        assert_eq!(
            Macro::parse_macro(&definition, SourcePosition::new("prg000.asm", 3)),
            Err(MacroError::Unterminated {
                name: "Broken".to_owned(),
                position: SourcePosition::new("prg000.asm", 3),
            })
        );
    }
}
