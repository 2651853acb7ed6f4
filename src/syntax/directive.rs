use std::fmt;

use strum_macros::{EnumIter, EnumString, IntoStaticStr};

/// Commands to the assembler that are not instructions.
///
/// The keyword is matched case-insensitively, `.BYTE` and `.byte` are the same directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum Directive {
    #[strum(serialize = ".list")]
    List,
    #[strum(serialize = ".nolist")]
    NoList,
    #[strum(serialize = ".mlist")]
    MList,
    #[strum(serialize = ".nomlist")]
    NoMList,
    #[strum(serialize = ".opt")]
    Opt,
    #[strum(serialize = ".equ")]
    Equ,
    #[strum(serialize = ".bank")]
    Bank,
    #[strum(serialize = ".org")]
    Org,
    #[strum(serialize = ".db")]
    Db,
    #[strum(serialize = ".dw")]
    Dw,
    #[strum(serialize = ".byte")]
    Byte,
    #[strum(serialize = ".word")]
    Word,
    #[strum(serialize = ".ds")]
    Ds,
    #[strum(serialize = ".rsset")]
    RsSet,
    #[strum(serialize = ".rs")]
    Rs,
    #[strum(serialize = ".macro")]
    Macro,
    #[strum(serialize = ".endm")]
    EndM,
    #[strum(serialize = ".proc")]
    Proc,
    #[strum(serialize = ".endp")]
    EndP,
    #[strum(serialize = ".procgroup")]
    ProcGroup,
    #[strum(serialize = ".endprocgroup")]
    EndProcGroup,
    #[strum(serialize = ".incbin")]
    IncBin,
    #[strum(serialize = ".include")]
    Include,
    #[strum(serialize = ".incchr")]
    IncChr,
    #[strum(serialize = ".defchr")]
    DefChr,
    #[strum(serialize = ".zp")]
    Zp,
    #[strum(serialize = ".bss")]
    Bss,
    #[strum(serialize = ".code")]
    Code,
    #[strum(serialize = ".data")]
    Data,
    #[strum(serialize = ".if")]
    If,
    #[strum(serialize = ".ifdef")]
    IfDef,
    #[strum(serialize = ".ifndef")]
    IfNDef,
    #[strum(serialize = ".else")]
    Else,
    #[strum(serialize = ".endif")]
    EndIf,
    #[strum(serialize = ".fail")]
    Fail,
    #[strum(serialize = ".inesprg")]
    InesPrg,
    #[strum(serialize = ".ineschr")]
    InesChr,
    #[strum(serialize = ".inesmap")]
    InesMap,
    #[strum(serialize = ".inesmir")]
    InesMir,
    /// User function definition, `NAME .func EXPR`.
    #[strum(serialize = ".func")]
    Func,
}

/// Element width of a data directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataUnit {
    Byte,
    Word,
}

impl DataUnit {
    pub fn size(&self) -> usize {
        match self {
            DataUnit::Byte => 1,
            DataUnit::Word => 2,
        }
    }
}

impl Directive {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn data_unit(&self) -> Option<DataUnit> {
        match self {
            Directive::Byte | Directive::Db => Some(DataUnit::Byte),
            Directive::Word | Directive::Dw => Some(DataUnit::Word),
            _ => None,
        }
    }

    pub fn is_ines(&self) -> bool {
        matches!(
            self,
            Directive::InesPrg | Directive::InesChr | Directive::InesMap | Directive::InesMir
        )
    }

    /// Directives that neither emit bytes nor define anything the layout cares about.
    pub fn is_ignored(&self) -> bool {
        matches!(self, Directive::Data | Directive::Code | Directive::Org)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_str_is_case_insensitive() {
        let tests = vec![
            (".byte", Some(Directive::Byte)),
            (".BYTE", Some(Directive::Byte)),
            (".Dw", Some(Directive::Dw)),
            (".inesmir", Some(Directive::InesMir)),
            (".ENDPROCGROUP", Some(Directive::EndProcGroup)),
            ("byte", None),
            (".bytes", None),
        ];
        for (input, expected) in tests {
            assert_eq!(Directive::from_str(input).ok(), expected, "{}", input);
        }
    }

    #[test]
    fn test_ines_directives() {
        let ines: Vec<Directive> = Directive::iter().filter(Directive::is_ines).collect();
        assert_eq!(
            ines,
            vec![
                Directive::InesPrg,
                Directive::InesChr,
                Directive::InesMap,
                Directive::InesMir
            ]
        );
        assert_eq!(Directive::InesMap.to_string(), ".inesmap");
    }

    #[test]
    fn test_data_unit() {
        assert_eq!(Directive::Db.data_unit(), Some(DataUnit::Byte));
        assert_eq!(Directive::Word.data_unit(), Some(DataUnit::Word));
        assert_eq!(Directive::Ds.data_unit(), None);
        assert_eq!(DataUnit::Word.size(), 2);
    }
}
