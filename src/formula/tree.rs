use std::collections::HashMap;

use strum_macros::Display;

use super::FormulaError;
use crate::syntax::byte_length_of_number_string;

/// Index of a [`Leaf`] in its [`Tree`].
pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LeafType {
    Root,
    FunctionName,
    Symbol,
    Number,
    Parens,
    Formula,
    FunctionParams,
    Operator,
    Listing,
    MacroParam,
}

impl LeafType {
    /// Leaf types that never get children.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LeafType::Symbol | LeafType::Number | LeafType::Operator | LeafType::MacroParam
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub value: String,
    pub leaf_type: LeafType,
    pub parent: Option<NodeId>,
    pub leaves: Vec<NodeId>,
}

impl Leaf {
    fn new(value: &str, leaf_type: LeafType) -> Self {
        Self {
            value: value.to_owned(),
            leaf_type,
            parent: None,
            leaves: Vec::new(),
        }
    }
}

/// Expression tree stored as an arena.
///
/// Every node but the root has exactly one parent and nodes are never removed, only re-parented
/// or retyped, so every node in the arena is reachable from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    nodes: Vec<Leaf>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub const ROOT: NodeId = 0;

    pub fn new() -> Self {
        Self {
            nodes: vec![Leaf::new("", LeafType::Root)],
        }
    }

    pub fn leaf(&self, id: NodeId) -> &Leaf {
        &self.nodes[id]
    }

    pub fn leaf_type(&self, id: NodeId) -> LeafType {
        self.nodes[id].leaf_type
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].leaves
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].leaves.last().copied()
    }

    pub(super) fn value_mut(&mut self, id: NodeId) -> &mut String {
        &mut self.nodes[id].value
    }

    pub(super) fn set_leaf_type(&mut self, id: NodeId, leaf_type: LeafType) {
        self.nodes[id].leaf_type = leaf_type;
    }

    /// Appends a new node as the last child of `parent`.
    pub(super) fn push(&mut self, parent: NodeId, value: &str, leaf_type: LeafType) -> NodeId {
        let id = self.nodes.len();
        let mut leaf = Leaf::new(value, leaf_type);
        leaf.parent = Some(parent);
        self.nodes.push(leaf);
        self.nodes[parent].leaves.push(id);
        id
    }

    /// Replaces the last child of `parent` with a new node of `leaf_type` that holds it.
    pub(super) fn wrap_last_child(
        &mut self,
        parent: NodeId,
        leaf_type: LeafType,
    ) -> Option<NodeId> {
        let last = self.nodes[parent].leaves.pop()?;

        let id = self.nodes.len();
        let mut wrapper = Leaf::new("", leaf_type);
        wrapper.parent = Some(parent);
        wrapper.leaves.push(last);
        self.nodes.push(wrapper);

        self.nodes[last].parent = Some(id);
        self.nodes[parent].leaves.push(id);
        Some(id)
    }

    fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            found.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        found
    }

    fn any_leaf(&self, leaf_type: LeafType) -> bool {
        self.descendants(Self::ROOT)
            .into_iter()
            .any(|id| self.leaf_type(id) == leaf_type)
    }

    pub fn has_symbols(&self) -> bool {
        self.any_leaf(LeafType::Symbol)
    }

    pub fn has_macro_params(&self) -> bool {
        self.any_leaf(LeafType::MacroParam)
    }

    /// Names of all symbol leaves, in source order.
    pub fn symbols(&self) -> Vec<&str> {
        self.descendants(Self::ROOT)
            .into_iter()
            .filter(|id| self.leaf_type(*id) == LeafType::Symbol)
            .map(|id| self.leaf(id).value.as_str())
            .collect()
    }

    /// Turns every symbol leaf that has a value in `values` into a number leaf holding it.
    pub fn fill_in_symbols(&mut self, values: &HashMap<String, String>) {
        for id in self.descendants(Self::ROOT) {
            let leaf = &mut self.nodes[id];
            if leaf.leaf_type != LeafType::Symbol {
                continue;
            }
            if let Some(value) = values.get(&leaf.value) {
                leaf.value = value.clone();
                leaf.leaf_type = LeafType::Number;
            }
        }
    }

    /// Number of bytes the node stands for, judged by how its literals are written.
    pub fn byte_size_of(&self, id: NodeId) -> Result<usize, FormulaError> {
        let leaf = self.leaf(id);
        match leaf.leaf_type {
            LeafType::Number => Ok(byte_length_of_number_string(&leaf.value)?),
            LeafType::Operator => Ok(0),
            LeafType::Symbol => Err(FormulaError::UnresolvedSymbol(leaf.value.clone())),
            LeafType::MacroParam => Err(FormulaError::UnresolvedMacroParameter(leaf.value.clone())),
            LeafType::Listing => self
                .children(id)
                .iter()
                .map(|child| self.byte_size_of(*child))
                .sum(),
            LeafType::Root
            | LeafType::FunctionName
            | LeafType::Parens
            | LeafType::Formula
            | LeafType::FunctionParams => {
                let mut size = 0;
                for child in self.children(id) {
                    size = size.max(self.byte_size_of(*child)?);
                }
                Ok(size)
            }
        }
    }

    /// Nested `('value', TYPE, l=[..])` rendering of the tree.
    pub fn debug_string(&self) -> String {
        self.debug_string_of(Self::ROOT)
    }

    fn debug_string_of(&self, id: NodeId) -> String {
        let leaf = self.leaf(id);
        let leaves = leaf
            .leaves
            .iter()
            .map(|child| self.debug_string_of(*child))
            .collect::<Vec<String>>()
            .join(", ");

        format!("('{}', {}, l=[{}])", leaf.value, leaf.leaf_type, leaves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn number_listing() -> Tree {
        let mut tree = Tree::new();
        tree.push(Tree::ROOT, "$00", LeafType::Number);
        let listing = tree.wrap_last_child(Tree::ROOT, LeafType::Listing).unwrap();
        tree.push(listing, "$0200", LeafType::Number);
        tree.push(listing, "Label", LeafType::Symbol);
        tree
    }

    #[test]
    fn test_wrap_last_child_keeps_parents_consistent() {
        let tree = number_listing();

        let listing = tree.children(Tree::ROOT)[0];
        assert_eq!(tree.leaf_type(listing), LeafType::Listing);
        assert_eq!(tree.parent(listing), Some(Tree::ROOT));
        for child in tree.children(listing) {
            assert_eq!(tree.parent(*child), Some(listing));
        }
        assert_eq!(
            tree.debug_string(),
            "('', ROOT, l=[('', LISTING, l=[('$00', NUMBER, l=[]), ('$0200', NUMBER, l=[]), \
             ('Label', SYMBOL, l=[])])])"
        );
    }

    #[test]
    fn test_byte_size_of_needs_resolved_symbols() {
        let mut tree = number_listing();
        assert_eq!(
            tree.byte_size_of(Tree::ROOT),
            Err(FormulaError::UnresolvedSymbol("Label".to_owned()))
        );

        let values = HashMap::from([("Label".to_owned(), "$C008".to_owned())]);
        tree.fill_in_symbols(&values);

        assert!(!tree.has_symbols());
        assert_eq!(tree.byte_size_of(Tree::ROOT), Ok(1 + 2 + 2));
    }

    #[test]
    fn test_formula_size_is_largest_operand() {
        let mut tree = Tree::new();
        let formula = tree.push(Tree::ROOT, "", LeafType::Formula);
        tree.push(formula, "$FF", LeafType::Number);
        tree.push(formula, "&", LeafType::Operator);
        tree.push(formula, "$FF00", LeafType::Number);

        assert_eq!(tree.byte_size_of(Tree::ROOT), Ok(2));
    }

    #[test]
    fn test_fill_in_symbols_leaves_unknown_names() {
        let mut tree = Tree::new();
        tree.push(Tree::ROOT, "Unknown", LeafType::Symbol);
        tree.fill_in_symbols(&HashMap::from([("Other".to_owned(), "1".to_owned())]));

        assert_eq!(tree.symbols(), vec!["Unknown"]);
    }
}
