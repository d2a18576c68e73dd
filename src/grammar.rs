//! Grammar assembly.
//!
//! A [`Grammar`] is an immutable snapshot of a [`Registry`]: the name tables
//! the parser classifies words against, and the reservation guarantee that a
//! registered keyword or macro can never be read as a bare string value.
//! [`Grammar::render`] additionally fills the shipped grammar template with
//! the registry's terminals, producing the concrete grammar text for
//! documentation and debugging.

use std::sync::OnceLock;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ast::Node;
use crate::error::SelectError;
use crate::expand;
use crate::parser::Parser;
use crate::registry::{KeywordDef, MacroDef, Registry, STRUCTURAL_WORDS};
use crate::token;

/// Grammar template with placeholders filled from the registry at assembly.
const GRAMMAR_TEMPLATE: &str = r#"// Selection grammar, generated from the keyword and macro catalogs.

start : expr
?expr : or_expr
?or_expr  : xor_expr (_OR xor_expr)*
?xor_expr : and_expr (_XOR and_expr)*
?and_expr : not_expr (_AND? not_expr)*
?not_expr : _NOT not_expr | predicate

?predicate : bool_flag
           | property_selection
           | comparison_selection
           | regex_selection
           | within_selection
           | bonded_selection
           | sequence_selection
           | same_selection
           | "(" expr ")"

bool_flag : ALL | NONE | macro_name | keyword_name
property_selection : (keyword_name | "(" math_expr ")") item+
comparison_selection : math_expr (CMP_OP math_expr)+
regex_selection : math_expr "=~" REGEX
within_selection : (WITHIN | EXWITHIN) number _OF not_expr
bonded_selection : (BONDED | EXBONDED) INT _TO not_expr
sequence_selection : SEQUENCE (LAST_TOKEN | REGEX | STRING)
same_selection : SAME keyword_name _AS not_expr

?item : number | range | REGEX | STRING | RAW | LAST_TOKEN
range : number _TO number | number ":" number (":" number)?

?math_expr : add_expr
?add_expr : mul_expr (("+" | "-") mul_expr)*
?mul_expr : unary_expr (("*" | "/" | "//" | "%") unary_expr)*
?unary_expr : "-" unary_expr | pow_expr
?pow_expr : math_atom ("**" unary_expr)?
?math_atom : number | CONST | FUNC "(" math_expr ")" | VAR
           | keyword_name | "(" math_expr ")"

// structural terminals
ALL : "all" | "everything"
NONE : "none" | "nothing"
WITHIN : "within"
EXWITHIN : "exwithin"
BONDED : "bonded"
EXBONDED : "exbonded"
SEQUENCE : "sequence"
SAME : "same"
_OF : "of"
_TO : "to"
_AS : "as"
_OR : "or" | "||"
_XOR : "xor"
_AND : "and" | "&&" | "&"
_NOT : "not" | "!"
CMP_OP : "<=" | ">=" | "==" | "=" | "!=" | "<" | ">" | "lt" | "le" | "gt" | "ge" | "eq" | "ne"
CONST : "pi" | "e"
FUNC : "sin" | "cos" | "tan" | "asin" | "acos" | "atan" | "sinh" | "cosh" | "tanh"
     | "exp" | "log" | "log10" | "sqrt" | "sq" | "sqr" | "square" | "abs" | "floor" | "ceil"
VAR : /\$[A-Za-z_][A-Za-z0-9_]*/
REGEX : /"([^"\\]|\\.)*"/
STRING : /'([^'\\]|\\.)*'/
RAW : /`[^`]*`/
INT : /\d+/
FLOAT : /\d+\.\d*([eE][+-]?\d+)?|\d+[eE][+-]?\d+/
?number : INT | FLOAT

<<KEYWORDS>>

<<MACROS>>

?keyword_name : <<KEYWORDS_NAMES>>
?macro_name : <<MACROS_NAMES>>

LAST_TOKEN : <<LAST_TOKEN>>
"#;

/// How the parser should treat a word token.
pub(crate) enum WordClass<'a> {
    Keyword(&'a KeywordDef),
    Macro(&'a MacroDef),
    Unclaimed,
}

/// An assembled, immutable grammar. Cheap to share between threads; queries
/// parsed against it are unaffected by later registry mutation.
#[derive(Debug, Clone)]
pub struct Grammar {
    keywords: Vec<KeywordDef>,
    macros: Vec<MacroDef>,
    names: FxHashMap<String, (bool, usize)>,
    definitions: FxHashMap<String, String>,
}

impl Grammar {
    /// Snapshot the registry's current names into a parse-ready grammar.
    pub fn assemble(registry: &Registry) -> Grammar {
        let keywords: Vec<KeywordDef> = registry.iter_keywords().cloned().collect();
        let macros: Vec<MacroDef> = registry.iter_macros().cloned().collect();
        let mut names = FxHashMap::default();
        for (i, def) in keywords.iter().enumerate() {
            names.insert(def.name.clone(), (true, i));
            for syn in &def.synonyms {
                names.insert(syn.clone(), (true, i));
            }
        }
        let mut definitions = FxHashMap::default();
        for (i, def) in macros.iter().enumerate() {
            names.insert(def.name.clone(), (false, i));
            for syn in &def.synonyms {
                names.insert(syn.clone(), (false, i));
            }
            definitions.insert(def.name.clone(), def.definition.clone());
        }
        debug!(
            keywords = keywords.len(),
            macros = macros.len(),
            "assembled grammar"
        );
        Grammar {
            keywords,
            macros,
            names,
            definitions,
        }
    }

    /// Fresh grammar assembled from the built-in catalogs. Most callers
    /// want the shared [`builtin_grammar`] instead.
    pub fn builtin() -> Result<Grammar, SelectError> {
        Ok(Grammar::assemble(&Registry::builtin()?))
    }

    /// Parse a query into IR with all macros expanded.
    pub fn parse(&self, query: &str) -> Result<Node, SelectError> {
        let node = self.parse_raw(query)?;
        expand::expand(node, self)
    }

    /// Parse a query into IR, leaving macro references in place.
    pub fn parse_raw(&self, query: &str) -> Result<Node, SelectError> {
        let tokens = token::tokenize(query)?;
        Parser::new(tokens, query, self, false).parse()
    }

    /// Parse a macro definition; hidden macro references are allowed here.
    pub(crate) fn parse_definition(&self, definition: &str) -> Result<Node, SelectError> {
        let tokens = token::tokenize(definition)?;
        Parser::new(tokens, definition, self, true).parse()
    }

    pub(crate) fn classify(&self, word: &str) -> WordClass<'_> {
        match self.names.get(word) {
            Some(&(true, i)) => WordClass::Keyword(&self.keywords[i]),
            Some(&(false, i)) => WordClass::Macro(&self.macros[i]),
            None => WordClass::Unclaimed,
        }
    }

    pub(crate) fn keyword(&self, word: &str) -> Option<&KeywordDef> {
        match self.classify(word) {
            WordClass::Keyword(def) => Some(def),
            _ => None,
        }
    }

    pub(crate) fn macro_definition(&self, canonical: &str) -> Option<&str> {
        self.definitions.get(canonical).map(String::as_str)
    }

    /// Whether a word can never be a bare string value.
    pub fn is_reserved(&self, word: &str) -> bool {
        STRUCTURAL_WORDS.contains(&word) || self.names.contains_key(word)
    }

    /// Render the concrete grammar text by filling the template placeholders.
    pub fn render(&self) -> String {
        let (kw_block, kw_names) = terminal_block(
            self.keywords
                .iter()
                .map(|d| (d.category.as_str(), d.name.as_str(), d.synonyms.as_slice())),
            "select",
        );
        let (macro_block, macro_names) = terminal_block(
            self.macros
                .iter()
                .filter(|d| !d.hidden())
                .map(|d| (d.category.as_str(), d.name.as_str(), d.synonyms.as_slice())),
            "bool",
        );
        let interim = GRAMMAR_TEMPLATE
            .replace("<<KEYWORDS>>", &kw_block)
            .replace("<<KEYWORDS_NAMES>>", &kw_names)
            .replace("<<MACROS>>", &macro_block)
            .replace("<<MACROS_NAMES>>", &macro_names);
        let last_token = last_token_pattern(&interim);
        interim.replace("<<LAST_TOKEN>>", &last_token)
    }
}

static BUILTIN_GRAMMAR: OnceLock<Grammar> = OnceLock::new();

/// The process-wide grammar assembled once from the built-in catalogs.
/// Later calls return the same instance, so the common case pays the
/// catalog parse and assembly exactly once.
pub fn builtin_grammar() -> Result<&'static Grammar, SelectError> {
    if let Some(grammar) = BUILTIN_GRAMMAR.get() {
        return Ok(grammar);
    }
    let grammar = Grammar::builtin()?;
    Ok(BUILTIN_GRAMMAR.get_or_init(|| grammar))
}

/// Build terminal declarations grouped by category plus the alternation of
/// the per-category rules, mirroring the catalog layout.
fn terminal_block<'a>(
    entries: impl Iterator<Item = (&'a str, &'a str, &'a [String])>,
    prefix: &str,
) -> (String, String) {
    let mut by_category: Vec<(&str, Vec<(&str, &[String])>)> = Vec::new();
    for (category, name, synonyms) in entries {
        match by_category.iter_mut().find(|(c, _)| *c == category) {
            Some((_, list)) => list.push((name, synonyms)),
            None => by_category.push((category, vec![(name, synonyms)])),
        }
    }
    let mut lines = Vec::new();
    let mut category_rules = Vec::new();
    for (category, list) in &by_category {
        lines.push(String::new());
        lines.push(format!("// {category}"));
        let mut terminals = Vec::new();
        for (name, synonyms) in list {
            let mut rule = format!("{} : \"{}\"", name.to_uppercase(), name);
            for syn in synonyms.iter() {
                rule.push_str(&format!(" | \"{syn}\""));
            }
            lines.push(rule);
            terminals.push(name.to_uppercase());
        }
        let rule_name = format!("{prefix}_{}", category.to_lowercase());
        lines.push(format!("?{rule_name}: {}", terminals.join(" | ")));
        category_rules.push(rule_name);
    }
    (lines.join("\n"), category_rules.join(" | "))
}

/// The lowest-priority fallback terminal: an identifier claimed by no other
/// terminal. Scans the rendered grammar for quoted literals and excludes
/// them with a negative lookahead, the structural words included.
fn last_token_pattern(grammar_text: &str) -> String {
    let mut reserved: Vec<String> = Vec::new();
    for line in grammar_text.lines() {
        let line = line.split("//").next().unwrap_or("");
        let Some((lhs, rhs)) = line.split_once(':') else {
            continue;
        };
        let lhs = lhs.trim();
        if lhs.is_empty()
            || !lhs
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            continue;
        }
        if rhs.trim_start().starts_with('/') {
            continue;
        }
        let mut rest = rhs;
        while let Some(open) = rest.find('"') {
            let Some(len) = rest[open + 1..].find('"') else {
                break;
            };
            reserved.push(regex::escape(&rest[open + 1..open + 1 + len]));
            rest = &rest[open + len + 2..];
        }
    }
    for word in STRUCTURAL_WORDS {
        reserved.push(regex::escape(word));
    }
    let alternation = reserved.join("|");
    format!(
        "/(?!['\"`()-])(?!(?:{alternation})\\b)(?!\\d+(?:\\.\\d*)?(?:[eE][+-]?\\d+)?\\b)(?=[A-Za-z_])[^()'\"`\\s]+/"
    )
}
