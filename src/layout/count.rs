use crate::formula::{
    eval::evaluate_node, parse_formula, Formula, FormulaError, LeafType, NodeId, Tree,
};
use crate::syntax::directive::DataUnit;
use crate::syntax::number::quoted_text;
use crate::syntax::Mnemonic;

use super::symbols::SymbolTable;

/// Bytes an instruction takes: opcode plus operand.
pub fn count_instruction(
    mnemonic: Mnemonic,
    operand: &str,
    symbols: &SymbolTable,
) -> Result<usize, FormulaError> {
    let operand = operand.trim();

    // Implied or explicit accumulator addressing
    if operand.is_empty() || operand == "A" {
        return Ok(1);
    }
    if mnemonic.is_branching_instruction() {
        return Ok(2);
    }
    if mnemonic.is_jump() {
        return Ok(3);
    }

    let operand = operand.replace(' ', "");

    // Immediate, forced zero page and indirect addressing
    if operand.starts_with(['#', '<', '[']) {
        return Ok(2);
    }

    let operand = [",X", ",Y", ",x", ",y"]
        .iter()
        .find_map(|index| operand.strip_suffix(index))
        .unwrap_or(&operand);

    let formula = parse_formula(operand)?;
    if formula.parts.iter().any(|part| symbols.contains(part)) {
        return Ok(3);
    }
    if let Some(symbol) = formula.symbols().first() {
        return Err(FormulaError::UnresolvedSymbol((*symbol).to_owned()));
    }

    if formula.evaluate()? > 0xFF {
        Ok(3)
    } else {
        Ok(2)
    }
}

/// Number of elements in a data operand. Quoted strings count one element per character.
fn element_widths(formula: &Formula) -> Result<Vec<(NodeId, usize)>, FormulaError> {
    let tree = &formula.tree;
    let root = tree.children(Tree::ROOT);

    let elements: Vec<NodeId> = match root {
        [] => return Err(FormulaError::Empty),
        [only] if tree.leaf_type(*only) == LeafType::Listing => tree.children(*only).to_vec(),
        _ => root.to_vec(),
    };

    Ok(elements
        .into_iter()
        .map(|id| {
            let leaf = tree.leaf(id);
            let width = match (leaf.leaf_type, quoted_text(&leaf.value)) {
                (LeafType::Number, Some(text)) => text.chars().count(),
                _ => 1,
            };
            (id, width)
        })
        .collect())
}

/// Bytes a `.byte`/`.word` operand takes.
pub fn count_data(operand: &str, unit: DataUnit) -> Result<usize, FormulaError> {
    let formula = parse_formula(operand)?;
    let elements: usize = element_widths(&formula)?
        .iter()
        .map(|(_, width)| width)
        .sum();

    Ok(elements * unit.size())
}

/// The concrete bytes of a `.byte`/`.word` operand, words in little endian.
pub fn data_to_bytes(
    operand: &str,
    unit: DataUnit,
    symbols: &SymbolTable,
) -> Result<Vec<u8>, FormulaError> {
    let mut formula = parse_formula(operand)?;
    symbols.fill_in(&mut formula);

    let mut bytes = Vec::new();
    for (id, _) in element_widths(&formula)? {
        let leaf = formula.tree.leaf(id);
        if let (LeafType::Number, Some(text)) = (leaf.leaf_type, quoted_text(&leaf.value)) {
            bytes.extend(text.bytes());
            continue;
        }

        let value = evaluate_node(&formula.tree, id)?;
        match unit {
            DataUnit::Byte => bytes.push(value as u8),
            DataUnit::Word => bytes.extend((value as u16).to_le_bytes()),
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::symbols::{Symbol, SymbolType};
    use crate::source::SourcePosition;

    use pretty_assertions::assert_eq;

    fn symbols() -> SymbolTable {
        let mut symbols = SymbolTable::new();
        let definitions = vec![
            ("Player_X", SymbolType::RamVariable(0x0090)),
            ("Temp_Var1", SymbolType::RamVariable(0x0000)),
            ("Level_SlopeQuad00", SymbolType::Label(Some(0xC008))),
            ("SPR_HFLIP", SymbolType::Constant(0x40)),
        ];
        for (line, (name, symbol)) in definitions.into_iter().enumerate() {
            symbols
                .new_symbol(Symbol {
                    name: name.to_owned(),
                    symbol,
                    position: SourcePosition::new("smb3.asm", line + 1),
                })
                .unwrap();
        }
        symbols
    }

    #[test]
    fn test_count_instruction() {
        let symbols = symbols();
        let tests = vec![
            (Mnemonic::RTS, "", 1),
            (Mnemonic::ASL, "A", 1),
            (Mnemonic::BNE, "PRG000_C000", 2),
            (Mnemonic::JMP, "[Temp_Var1]", 3),
            (Mnemonic::LDA, "#$00", 2),
            (Mnemonic::LDA, "#SPR_HFLIP", 2),
            (Mnemonic::LDA, "<Temp_Var1", 2),
            (Mnemonic::LDA, "[Temp_Var1],Y", 2),
            (Mnemonic::STA, "Player_X,X", 3),
            (Mnemonic::ORA, "SPR_HFLIP", 3),
            (Mnemonic::LDA, "$0200, Y", 3),
            (Mnemonic::LDA, "$20", 2),
            (Mnemonic::LDA, "$0020", 2),
        ];

        for (mnemonic, operand, expected) in tests {
            assert_eq!(
                count_instruction(mnemonic, operand, &symbols),
                Ok(expected),
                "{} {}",
                mnemonic,
                operand
            );
        }
    }

    #[test]
    fn test_count_instruction_with_unknown_symbol() {
        assert_eq!(
            count_instruction(Mnemonic::LDA, "Nowhere", &symbols()),
            Err(FormulaError::UnresolvedSymbol("Nowhere".to_owned()))
        );
    }

    #[test]
    fn test_count_data() {
        let tests = vec![
            ("$00", DataUnit::Byte, 1),
            ("2,   4,   2,   8", DataUnit::Byte, 4),
            ("\"WORLD\"", DataUnit::Byte, 5),
            ("'A', $00", DataUnit::Byte, 2),
            ("Level_SlopeQuad00, Level_SlopeQuad00", DataUnit::Word, 4),
            ("(Seg_End - Seg) >> 8", DataUnit::Byte, 1),
        ];

        for (operand, unit, expected) in tests {
            assert_eq!(count_data(operand, unit), Ok(expected), "{}", operand);
        }
        assert_eq!(count_data("", DataUnit::Byte), Err(FormulaError::Empty));
    }

    #[test]
    fn test_data_to_bytes() {
        let symbols = symbols();
        let tests = vec![
            ("Level_SlopeQuad00", DataUnit::Word, vec![0x08, 0xC0]),
            ("SPR_HFLIP | $01, -1", DataUnit::Byte, vec![0x41, 0xFF]),
            ("\"AB\"", DataUnit::Byte, vec![b'A', b'B']),
            ("$1234, Player_X", DataUnit::Word, vec![0x34, 0x12, 0x90, 0x00]),
        ];

        for (operand, unit, expected) in tests {
            assert_eq!(data_to_bytes(operand, unit, &symbols), Ok(expected), "{}", operand);
        }
    }
}
