//! Macro expansion.
//!
//! Replaces [`Node::Macro`] references by the IR of their stored definition.
//! Definitions parse lazily the first time a macro is reached and the
//! expanded tree is cached for the rest of the pass, so diamond-shaped
//! references parse once. A dynamic expansion stack catches definitions
//! that reach themselves transitively.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::ast::Node;
use crate::error::SelectError;
use crate::grammar::Grammar;

/// Expand every macro reference in `node` against `grammar`.
pub fn expand(node: Node, grammar: &Grammar) -> Result<Node, SelectError> {
    let mut expander = Expander {
        grammar,
        cache: FxHashMap::default(),
        stack: Vec::new(),
    };
    expander.expand_node(node)
}

struct Expander<'g> {
    grammar: &'g Grammar,
    cache: FxHashMap<String, Node>,
    stack: Vec<String>,
}

impl Expander<'_> {
    fn expand_node(&mut self, node: Node) -> Result<Node, SelectError> {
        Ok(match node {
            Node::Macro(name) => return self.expand_macro(name),
            Node::And(l, r) => Node::And(
                Box::new(self.expand_node(*l)?),
                Box::new(self.expand_node(*r)?),
            ),
            Node::Or(l, r) => Node::Or(
                Box::new(self.expand_node(*l)?),
                Box::new(self.expand_node(*r)?),
            ),
            Node::Xor(l, r) => Node::Xor(
                Box::new(self.expand_node(*l)?),
                Box::new(self.expand_node(*r)?),
            ),
            Node::Not(inner) => Node::Not(Box::new(self.expand_node(*inner)?)),
            Node::Within {
                exclusive,
                distance,
                inner,
            } => Node::Within {
                exclusive,
                distance,
                inner: Box::new(self.expand_node(*inner)?),
            },
            Node::Bonded {
                exclusive,
                hops,
                inner,
            } => Node::Bonded {
                exclusive,
                hops,
                inner: Box::new(self.expand_node(*inner)?),
            },
            Node::Same { group, inner } => Node::Same {
                group,
                inner: Box::new(self.expand_node(*inner)?),
            },
            leaf => leaf,
        })
    }

    fn expand_macro(&mut self, name: String) -> Result<Node, SelectError> {
        if self.stack.contains(&name) {
            return Err(SelectError::MacroCycle(name));
        }
        if let Some(cached) = self.cache.get(&name) {
            return Ok(cached.clone());
        }
        let definition = self
            .grammar
            .macro_definition(&name)
            .ok_or_else(|| SelectError::Catalog(format!("macro `{name}` has no definition")))?
            .to_string();
        trace!(macro_name = %name, "expanding macro");
        let raw = self.grammar.parse_definition(&definition)?;
        self.stack.push(name.clone());
        let expanded = self.expand_node(raw)?;
        self.stack.pop();
        self.cache.insert(name, expanded.clone());
        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MacroDef, Registry};

    fn user_macro(name: &str, definition: &str) -> MacroDef {
        MacroDef {
            name: name.into(),
            definition: definition.into(),
            synonyms: vec![],
            category: "user".into(),
        }
    }

    fn contains_macro(node: &Node) -> bool {
        match node {
            Node::Macro(_) => true,
            Node::And(l, r) | Node::Or(l, r) | Node::Xor(l, r) => {
                contains_macro(l) || contains_macro(r)
            }
            Node::Not(i)
            | Node::Within { inner: i, .. }
            | Node::Bonded { inner: i, .. }
            | Node::Same { inner: i, .. } => contains_macro(i),
            _ => false,
        }
    }

    #[test]
    fn test_expand_simple_macro() {
        let grammar = Grammar::builtin().unwrap();
        let node = grammar.parse_raw("heme").unwrap();
        let expanded = expand(node, &grammar).unwrap();
        match &expanded {
            Node::Property { field, items, .. } => {
                assert_eq!(field.as_field(), Some("resname"));
                assert_eq!(items.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_expand_nested_macros() {
        // protein -> aminoacid -> _std_aa or _nonstd_aa
        let grammar = Grammar::builtin().unwrap();
        let expanded = grammar.parse("protein and name CA").unwrap();
        assert!(!contains_macro(&expanded));
    }

    #[test]
    fn test_expand_all_builtin_macros() {
        let grammar = Grammar::builtin().unwrap();
        let registry = Registry::builtin().unwrap();
        for def in registry.iter_macros().filter(|d| !d.hidden()) {
            let node = grammar
                .parse(&def.name)
                .unwrap_or_else(|e| panic!("macro {} failed: {e}", def.name));
            assert!(!contains_macro(&node), "macro {} left unexpanded", def.name);
        }
    }

    #[test]
    fn test_macro_cycle_detected() {
        let mut registry = Registry::builtin().unwrap();
        registry
            .register_macro(user_macro("ping", "pong or water"))
            .unwrap();
        registry
            .register_macro(user_macro("pong", "ping or ion"))
            .unwrap();
        let grammar = Grammar::assemble(&registry);
        let err = grammar.parse("ping").unwrap_err();
        assert!(matches!(err, SelectError::MacroCycle(_)));
    }

    #[test]
    fn test_self_cycle_detected() {
        let mut registry = Registry::builtin().unwrap();
        registry
            .register_macro(user_macro("loopy", "not loopy"))
            .unwrap();
        let grammar = Grammar::assemble(&registry);
        assert!(matches!(
            grammar.parse("loopy"),
            Err(SelectError::MacroCycle(name)) if name == "loopy"
        ));
    }

    #[test]
    fn test_diamond_reference_is_fine() {
        // Two paths to the same macro is reuse, not a cycle.
        let mut registry = Registry::builtin().unwrap();
        registry
            .register_macro(user_macro("both", "calpha or (calpha and water)"))
            .unwrap();
        let grammar = Grammar::assemble(&registry);
        assert!(grammar.parse("both").is_ok());
    }

    #[test]
    fn test_expansion_inside_operators() {
        let grammar = Grammar::builtin().unwrap();
        for query in [
            "not protein",
            "within 5 of protein",
            "bonded 1 to protein",
            "same residue as protein",
            "protein xor water",
        ] {
            let node = grammar.parse(query).unwrap();
            assert!(!contains_macro(&node), "macro survived in {query}");
        }
    }
}
