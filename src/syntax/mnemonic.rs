use std::fmt;

/// Mnemonic of an instruction.
///
/// Parsing is case sensitive, the disassembly writes instructions in upper case.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, strum_macros::EnumString)]
pub enum Mnemonic {
    ADC,
    AND,
    ASL,
    BCC,
    BCS,
    BEQ,
    BIT,
    BMI,
    BNE,
    BPL,
    BRA,
    BRK,
    BVC,
    BVS,
    CLC,
    CLD,
    CLI,
    CLV,
    CMP,
    CPX,
    CPY,
    DEC,
    DEX,
    DEY,
    EOR,
    INC,
    INX,
    INY,
    JMP,
    JSR,
    LDA,
    LDX,
    LDY,
    LSR,
    NOP,
    ORA,
    PHA,
    PHP,
    PLA,
    PLP,
    ROL,
    ROR,
    RTI,
    RTS,
    SBC,
    SEC,
    SED,
    SEI,
    STA,
    STX,
    STY,
    TAX,
    TAY,
    TSX,
    TXA,
    TXS,
    TYA,
}

impl Mnemonic {
    /// Branches always take a one byte relative offset.
    pub fn is_branching_instruction(&self) -> bool {
        matches!(
            self,
            Mnemonic::BCC
                | Mnemonic::BCS
                | Mnemonic::BEQ
                | Mnemonic::BMI
                | Mnemonic::BNE
                | Mnemonic::BPL
                | Mnemonic::BRA
                | Mnemonic::BVC
                | Mnemonic::BVS
        )
    }

    pub fn is_jump(&self) -> bool {
        matches!(self, Mnemonic::JMP)
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_str() {
        let tests = vec![
            ("LDA", Some(Mnemonic::LDA)),
            ("BRA", Some(Mnemonic::BRA)),
            ("JMP", Some(Mnemonic::JMP)),
            ("lda", None),
            ("LDAX", None),
            (".byte", None),
        ];
        for (input, expected) in tests {
            assert_eq!(Mnemonic::from_str(input).ok(), expected);
        }
    }

    #[test]
    fn test_branches() {
        assert!(Mnemonic::BNE.is_branching_instruction());
        assert!(Mnemonic::BRA.is_branching_instruction());
        assert!(!Mnemonic::JMP.is_branching_instruction());
        assert!(!Mnemonic::JSR.is_branching_instruction());
    }
}
