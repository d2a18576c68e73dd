//! Atom selection language for molecular structures.
//!
//! Queries like `protein and name CA` or `within 5.0 of resname LIG`
//! evaluate against a read-only [`MolecularContext`] to a boolean mask with
//! one entry per atom. The engine covers VMD-flavored keywords, built-in
//! and user macros, math expressions over per-atom fields, spatial
//! (`within`/`exwithin`), bonded (`bonded`/`exbonded`), residue sequence,
//! and `same ... as` selections.
//!
//! # Examples
//!
//! ```no_run
//! use molselect::MolecularContext;
//!
//! # fn demo(ctx: &MolecularContext) -> Result<(), molselect::SelectError> {
//! let grammar = molselect::builtin_grammar()?;
//! let indices = molselect::select(grammar, ctx, "protein and name CA")?;
//! let mask = molselect::select_mask(grammar, ctx, "within 5.0 of resname LIG")?;
//! # Ok(())
//! # }
//! ```
//!
//! The registry can be extended before assembling a grammar:
//!
//! ```
//! use molselect::{Grammar, MacroDef, Registry};
//!
//! let mut registry = Registry::builtin().unwrap();
//! registry
//!     .register_macro(MacroDef {
//!         name: "site".into(),
//!         definition: "within 6.0 of resname HEM".into(),
//!         synonyms: vec![],
//!         category: "user".into(),
//!     })
//!     .unwrap();
//! let grammar = Grammar::assemble(&registry);
//! assert!(grammar.parse("site and not water").is_ok());
//! ```

pub mod ast;
pub mod bonded;
pub mod catalog;
pub mod context;
pub mod error;
pub mod eval;
pub mod expand;
pub mod grammar;
pub mod parser;
pub mod registry;
pub mod sequence;
pub mod spatial;
pub mod token;

pub use context::{Column, ContextBuilder, GroupKind, MolecularContext, Variable};
pub use error::{ParseError, SelectError};
pub use eval::{evaluate, mask_to_indices};
pub use grammar::{builtin_grammar, Grammar};
pub use registry::{FieldKind, KeywordDef, MacroDef, Registry};

/// Parse, expand, and evaluate a query, returning the mask over atoms.
pub fn select_mask(
    grammar: &Grammar,
    ctx: &MolecularContext,
    query: &str,
) -> Result<Vec<bool>, SelectError> {
    let node = grammar.parse(query)?;
    evaluate(&node, ctx)
}

/// Parse, expand, and evaluate a query, returning sorted atom indices.
pub fn select(
    grammar: &Grammar,
    ctx: &MolecularContext,
    query: &str,
) -> Result<Vec<usize>, SelectError> {
    Ok(mask_to_indices(&select_mask(grammar, ctx, query)?))
}
