use super::{FormulaError, LeafType, NodeId, Tree};
use crate::syntax::{number::quoted_text, parse_number};

/// Computes the single value of an expression tree.
///
/// Operators bind like in C: `* / %`, then `+ -`, then `<< >>`, then `&`, `^` and finally `|`.
/// Unary `<` and `>` take the low and high byte of their operand.
pub fn evaluate(tree: &Tree) -> Result<i64, FormulaError> {
    evaluate_node(tree, Tree::ROOT)
}

/// Value of the subtree starting at `id`.
pub fn evaluate_node(tree: &Tree, id: NodeId) -> Result<i64, FormulaError> {
    let leaf = tree.leaf(id);
    match leaf.leaf_type {
        LeafType::Root | LeafType::Parens | LeafType::FunctionParams => {
            match tree.children(id) {
                [only] => evaluate_node(tree, *only),
                _ => Err(FormulaError::NotASingleValue),
            }
        }
        LeafType::Number => evaluate_number(&leaf.value),
        LeafType::Symbol => Err(FormulaError::UnresolvedSymbol(leaf.value.clone())),
        LeafType::MacroParam => Err(FormulaError::UnresolvedMacroParameter(leaf.value.clone())),
        LeafType::Listing | LeafType::Operator => Err(FormulaError::NotASingleValue),
        LeafType::FunctionName => {
            let argument = match tree.children(id) {
                [params] => evaluate_node(tree, *params)?,
                _ => return Err(FormulaError::NotASingleValue),
            };
            match leaf.value.as_str() {
                "HIGH" => Ok((argument >> 8) & 0xFF),
                "LOW" => Ok(argument & 0xFF),
                name => Err(FormulaError::UnknownFunction(name.to_owned())),
            }
        }
        LeafType::Formula => evaluate_formula(tree, tree.children(id)),
    }
}

fn evaluate_number(text: &str) -> Result<i64, FormulaError> {
    if let Some(inner) = quoted_text(text) {
        let mut chars = inner.chars();
        return match (chars.next(), chars.next()) {
            (Some(ch), None) => Ok(ch as i64),
            _ => Err(FormulaError::NotASingleValue),
        };
    }
    let number = text.strip_prefix('+').unwrap_or(text);
    Ok(parse_number(number)?)
}

fn operator_of(tree: &Tree, id: NodeId) -> Result<&str, FormulaError> {
    let leaf = tree.leaf(id);
    match leaf.leaf_type {
        LeafType::Operator => Ok(leaf.value.as_str()),
        _ => Err(FormulaError::NotASingleValue),
    }
}

fn evaluate_formula(tree: &Tree, children: &[NodeId]) -> Result<i64, FormulaError> {
    let Some(first) = children.first() else {
        return Err(FormulaError::NotASingleValue);
    };

    if tree.leaf_type(*first) == LeafType::Operator {
        let operator = operator_of(tree, *first)?;
        let operand = match children {
            [_, operand] => evaluate_node(tree, *operand)?,
            _ => return Err(FormulaError::MissingOperand(operator.to_owned())),
        };
        return apply_unary(operator, operand);
    }

    if children.len() % 2 == 0 {
        let last = children[children.len() - 1];
        return Err(FormulaError::MissingOperand(operator_of(tree, last)?.to_owned()));
    }

    let mut values = vec![evaluate_node(tree, *first)?];
    let mut operators: Vec<&str> = Vec::new();

    for pair in children[1..].chunks(2) {
        let operator = operator_of(tree, pair[0])?;
        let rank = precedence(operator)?;

        while let Some(top) = operators.last() {
            if precedence(top)? < rank {
                break;
            }
            reduce(&mut values, &mut operators)?;
        }

        operators.push(operator);
        values.push(evaluate_node(tree, pair[1])?);
    }

    while !operators.is_empty() {
        reduce(&mut values, &mut operators)?;
    }

    values.pop().ok_or(FormulaError::NotASingleValue)
}

fn reduce(values: &mut Vec<i64>, operators: &mut Vec<&str>) -> Result<(), FormulaError> {
    let (Some(operator), Some(rhs), Some(lhs)) = (operators.pop(), values.pop(), values.pop())
    else {
        return Err(FormulaError::NotASingleValue);
    };
    values.push(apply_binary(operator, lhs, rhs)?);
    Ok(())
}

fn precedence(operator: &str) -> Result<u8, FormulaError> {
    match operator {
        "*" | "/" | "%" => Ok(5),
        "+" | "-" => Ok(4),
        "<<" | ">>" => Ok(3),
        "&" => Ok(2),
        "^" => Ok(1),
        "|" => Ok(0),
        _ => Err(FormulaError::UnknownOperator(operator.to_owned())),
    }
}

fn apply_unary(operator: &str, operand: i64) -> Result<i64, FormulaError> {
    match operator {
        "-" => Ok(operand.wrapping_neg()),
        "+" => Ok(operand),
        "~" => Ok(!operand & 0xFFFF),
        "<" => Ok(operand & 0xFF),
        ">" => Ok((operand >> 8) & 0xFF),
        _ => Err(FormulaError::UnknownOperator(operator.to_owned())),
    }
}

fn apply_binary(operator: &str, lhs: i64, rhs: i64) -> Result<i64, FormulaError> {
    let shift = || u32::try_from(rhs).ok().filter(|bits| *bits < 64);
    match operator {
        "+" => Ok(lhs.wrapping_add(rhs)),
        "-" => Ok(lhs.wrapping_sub(rhs)),
        "*" => Ok(lhs.wrapping_mul(rhs)),
        "/" | "%" if rhs == 0 => Err(FormulaError::DivisionByZero),
        "/" => lhs.checked_div(rhs).ok_or(FormulaError::Overflow),
        "%" => lhs.checked_rem(rhs).ok_or(FormulaError::Overflow),
        "&" => Ok(lhs & rhs),
        "^" => Ok(lhs ^ rhs),
        "|" => Ok(lhs | rhs),
        "<<" => shift()
            .map(|bits| lhs << bits)
            .ok_or(FormulaError::ShiftOutOfRange(rhs)),
        ">>" => shift()
            .map(|bits| lhs >> bits)
            .ok_or(FormulaError::ShiftOutOfRange(rhs)),
        _ => Err(FormulaError::UnknownOperator(operator.to_owned())),
    }
}
