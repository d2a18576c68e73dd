//! Built-in keyword and macro catalogs.
//!
//! The shipped catalogs are JSON documents embedded at compile time,
//! grouped by category with each entry keyed by its canonical name.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::SelectError;
use crate::registry::{KeywordDef, MacroDef};

const KEYWORDS_JSON: &str = include_str!("../data/keywords.json");
const MACROS_JSON: &str = include_str!("../data/macros.json");

#[derive(Deserialize)]
struct KeywordCatalog {
    keywords: BTreeMap<String, BTreeMap<String, KeywordDef>>,
}

#[derive(Deserialize)]
struct MacroCatalog {
    macros: BTreeMap<String, BTreeMap<String, MacroDef>>,
}

/// The shipped keyword definitions, names and categories filled in.
pub fn builtin_keywords() -> Result<Vec<KeywordDef>, SelectError> {
    let catalog: KeywordCatalog = serde_json::from_str(KEYWORDS_JSON)
        .map_err(|e| SelectError::Catalog(format!("keywords.json: {e}")))?;
    let mut defs = Vec::new();
    for (category, entries) in catalog.keywords {
        for (name, mut def) in entries {
            def.name = name;
            def.category = category.clone();
            defs.push(def);
        }
    }
    Ok(defs)
}

/// The shipped macro definitions, names and categories filled in.
pub fn builtin_macros() -> Result<Vec<MacroDef>, SelectError> {
    let catalog: MacroCatalog = serde_json::from_str(MACROS_JSON)
        .map_err(|e| SelectError::Catalog(format!("macros.json: {e}")))?;
    let mut defs = Vec::new();
    for (category, entries) in catalog.macros {
        for (name, mut def) in entries {
            def.name = name;
            def.category = category.clone();
            defs.push(def);
        }
    }
    Ok(defs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldKind;

    #[test]
    fn test_keywords_parse() {
        let defs = builtin_keywords().unwrap();
        assert!(defs.len() >= 45);
        let serial = defs.iter().find(|d| d.name == "serial").unwrap();
        assert_eq!(serial.kind, FieldKind::Int);
        assert_eq!(serial.synonyms, vec!["id".to_string()]);
        assert_eq!(serial.category, "identity");
    }

    #[test]
    fn test_macros_parse() {
        let defs = builtin_macros().unwrap();
        assert!(defs.iter().all(|d| !d.definition.is_empty()));
        let water = defs.iter().find(|d| d.name == "water").unwrap();
        assert!(water.definition.contains("HOH"));
    }

    #[test]
    fn test_hidden_macros_in_catalog() {
        let defs = builtin_macros().unwrap();
        let hidden: Vec<_> = defs.iter().filter(|d| d.hidden()).collect();
        assert!(hidden.iter().any(|d| d.name == "_std_aa"));
        assert!(hidden.iter().any(|d| d.name == "_charmm_ions"));
    }
}
