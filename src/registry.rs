//! Keyword and macro registry.
//!
//! The registry holds every name the grammar reserves: field keywords with
//! their column type and synonyms, and macros with their unparsed query
//! definitions. Built-in catalogs ship as embedded JSON; callers may add
//! their own entries before a grammar is assembled.

use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::debug;

use crate::catalog;
use crate::error::SelectError;

/// Words claimed by the grammar itself. Registrations must not shadow them.
pub const STRUCTURAL_WORDS: &[&str] = &[
    "and", "or", "xor", "not", "of", "to", "as", "within", "exwithin", "bonded", "exbonded",
    "sequence", "same", "all", "everything", "none", "nothing", "pi", "e", "lt", "le", "gt", "ge",
    "eq", "ne", "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "exp", "log",
    "log10", "sqrt", "sq", "sqr", "square", "abs", "floor", "ceil",
];

/// Column type of a field keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Int,
    Float,
    Str,
}

/// A field keyword: a named per-atom column the engine can look up.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordDef {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub category: String,
}

/// A macro: a named query fragment, stored unparsed and expanded lazily.
#[derive(Debug, Clone, Deserialize)]
pub struct MacroDef {
    #[serde(default)]
    pub name: String,
    pub definition: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub category: String,
}

impl MacroDef {
    /// Hidden macros (leading underscore) expand inside definitions but are
    /// not offered as query-surface flags.
    pub fn hidden(&self) -> bool {
        self.name.starts_with('_')
    }
}

#[derive(Debug, Clone, Copy)]
enum NameId {
    Keyword(usize),
    Macro(usize),
}

/// Resolution result for a single name.
#[derive(Debug)]
pub enum Resolved<'a> {
    Keyword(&'a KeywordDef),
    Macro(&'a MacroDef),
}

/// The keyword and macro catalog a grammar is assembled from.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    keywords: Vec<KeywordDef>,
    macros: Vec<MacroDef>,
    names: FxHashMap<String, NameId>,
}

impl Registry {
    /// An empty registry with no reserved names beyond the structural words.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the shipped keyword and macro catalogs.
    pub fn builtin() -> Result<Self, SelectError> {
        let mut reg = Self::new();
        for def in catalog::builtin_keywords()? {
            reg.register_keyword(def)?;
        }
        for def in catalog::builtin_macros()? {
            reg.register_macro(def)?;
        }
        debug!(
            keywords = reg.keywords.len(),
            macros = reg.macros.len(),
            "loaded built-in catalogs"
        );
        Ok(reg)
    }

    /// All names of an entry must be free before any of them is claimed, so
    /// a collision never leaves a half-registered entry behind.
    fn check_free(&self, name: &str) -> Result<(), SelectError> {
        if STRUCTURAL_WORDS.contains(&name) || self.names.contains_key(name) {
            return Err(SelectError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    pub fn register_keyword(&mut self, def: KeywordDef) -> Result<(), SelectError> {
        self.check_free(&def.name)?;
        for syn in &def.synonyms {
            self.check_free(syn)?;
        }
        let id = NameId::Keyword(self.keywords.len());
        self.names.insert(def.name.clone(), id);
        for syn in &def.synonyms {
            self.names.insert(syn.clone(), id);
        }
        self.keywords.push(def);
        Ok(())
    }

    pub fn register_macro(&mut self, def: MacroDef) -> Result<(), SelectError> {
        self.check_free(&def.name)?;
        for syn in &def.synonyms {
            self.check_free(syn)?;
        }
        let id = NameId::Macro(self.macros.len());
        self.names.insert(def.name.clone(), id);
        for syn in &def.synonyms {
            self.names.insert(syn.clone(), id);
        }
        self.macros.push(def);
        Ok(())
    }

    /// Look up a canonical name or synonym across both namespaces.
    pub fn resolve_name(&self, name: &str) -> Option<Resolved<'_>> {
        match self.names.get(name)? {
            NameId::Keyword(i) => Some(Resolved::Keyword(&self.keywords[*i])),
            NameId::Macro(i) => Some(Resolved::Macro(&self.macros[*i])),
        }
    }

    pub fn iter_keywords(&self) -> impl Iterator<Item = &KeywordDef> {
        self.keywords.iter()
    }

    pub fn iter_macros(&self) -> impl Iterator<Item = &MacroDef> {
        self.macros.iter()
    }
}
