//! Recursive descent parser for the selection language.
//!
//! Words are classified against the assembled [`Grammar`], so the same
//! parser serves any registry. Precedence, lowest to highest: `or`, `xor`,
//! `and` (explicit or implied by adjacency), `not`. The parser only builds
//! IR; it never evaluates, but it does reject comparisons whose operands
//! are all plain numbers, since those can never form an atom mask.

use crate::ast::{CmpOp, Item, MathExpr, MathFn, Node, Numeric, ValueKind};
use crate::error::{ParseError, SelectError};
use crate::grammar::{Grammar, WordClass};
use crate::registry::KeywordDef;
use crate::token::{SpannedToken, Token};

pub struct Parser<'a> {
    tokens: Vec<SpannedToken>,
    pos: usize,
    input: &'a str,
    grammar: &'a Grammar,
    allow_hidden: bool,
}

impl<'a> Parser<'a> {
    pub fn new(
        tokens: Vec<SpannedToken>,
        input: &'a str,
        grammar: &'a Grammar,
        allow_hidden: bool,
    ) -> Self {
        Self {
            tokens,
            pos: 0,
            input,
            grammar,
            allow_hidden,
        }
    }

    pub fn parse(mut self) -> Result<Node, SelectError> {
        let node = self.parse_or()?;
        if !self.at_eof() {
            return Err(self.error("end of query"));
        }
        Ok(node)
    }

    fn current(&self) -> &SpannedToken {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self, offset: usize) -> &Token {
        let i = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[i].token
    }

    fn at_eof(&self) -> bool {
        self.current().token == Token::Eof
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn error(&self, expected: impl Into<String>) -> SelectError {
        let tok = self.current();
        ParseError::new(expected, tok.token.describe(), tok.span, self.input).into()
    }

    fn is_word(&self, word: &str) -> bool {
        matches!(&self.current().token, Token::Word(w) if w == word)
    }

    fn expect_rparen(&mut self) -> Result<(), SelectError> {
        if self.current().token == Token::RParen {
            self.advance();
            Ok(())
        } else {
            Err(self.error("`)`"))
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<(), SelectError> {
        if self.is_word(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("`{word}`")))
        }
    }

    // or_expr = xor_expr ("or" xor_expr)*
    fn parse_or(&mut self) -> Result<Node, SelectError> {
        let mut left = self.parse_xor()?;
        while self.is_word("or") || self.current().token == Token::OrOp {
            self.advance();
            let right = self.parse_xor()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // xor_expr = and_expr ("xor" and_expr)*
    fn parse_xor(&mut self) -> Result<Node, SelectError> {
        let mut left = self.parse_and()?;
        while self.is_word("xor") {
            self.advance();
            let right = self.parse_and()?;
            left = Node::Xor(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // and_expr = not_expr (("and" | adjacency) not_expr)*
    fn parse_and(&mut self) -> Result<Node, SelectError> {
        let mut left = self.parse_not()?;
        loop {
            if self.is_word("and") || self.current().token == Token::AndOp {
                self.advance();
            } else if !self.starts_predicate(&self.current().token.clone()) {
                break;
            }
            let right = self.parse_not()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // not_expr = ("not" | "!") not_expr | primary
    fn parse_not(&mut self) -> Result<Node, SelectError> {
        if self.is_word("not") || self.current().token == Token::NotOp {
            self.advance();
            let inner = self.parse_not()?;
            Ok(Node::Not(Box::new(inner)))
        } else {
            self.parse_primary()
        }
    }

    /// Whether a token can begin a predicate, for implied `and`.
    fn starts_predicate(&self, token: &Token) -> bool {
        match token {
            Token::NotOp
            | Token::LParen
            | Token::AtMacro(_)
            | Token::Var(_)
            | Token::Int(_)
            | Token::Float(_)
            | Token::Minus => true,
            Token::Word(w) => match w.as_str() {
                "not" | "all" | "everything" | "none" | "nothing" | "within" | "exwithin"
                | "bonded" | "exbonded" | "sequence" | "same" | "pi" | "e" => true,
                _ => {
                    MathFn::from_name(w).is_some()
                        || match self.grammar.classify(w) {
                            WordClass::Keyword(_) => true,
                            WordClass::Macro(def) => self.allow_hidden || !def.hidden(),
                            WordClass::Unclaimed => false,
                        }
                }
            },
            _ => false,
        }
    }

    fn parse_primary(&mut self) -> Result<Node, SelectError> {
        match self.current().token.clone() {
            Token::LParen => self.parse_paren(),
            Token::AtMacro(name) => {
                let node = self.macro_node(&name)?;
                self.advance();
                Ok(node)
            }
            Token::Var(_) | Token::Int(_) | Token::Float(_) | Token::Minus => {
                let expr = self.parse_math()?;
                self.parse_compare_tail(expr)
            }
            Token::Word(w) => match w.as_str() {
                "all" | "everything" => {
                    self.advance();
                    Ok(Node::All)
                }
                "none" | "nothing" => {
                    self.advance();
                    Ok(Node::None_)
                }
                "within" => self.parse_within(false),
                "exwithin" => self.parse_within(true),
                "bonded" => self.parse_bonded(false),
                "exbonded" => self.parse_bonded(true),
                "sequence" => self.parse_sequence(),
                "same" => self.parse_same(),
                "pi" | "e" => {
                    let expr = self.parse_math()?;
                    self.parse_compare_tail(expr)
                }
                _ => {
                    if MathFn::from_name(&w).is_some() {
                        let expr = self.parse_math()?;
                        return self.parse_compare_tail(expr);
                    }
                    match self.grammar.classify(&w) {
                        WordClass::Keyword(def) => {
                            let def = def.clone();
                            self.parse_keyword_predicate(&def)
                        }
                        WordClass::Macro(_) => {
                            let node = self.macro_node(&w)?;
                            self.advance();
                            Ok(node)
                        }
                        WordClass::Unclaimed => Err(self.error("a selection keyword or macro")),
                    }
                }
            },
            _ => Err(self.error("a selection expression")),
        }
    }

    fn macro_node(&self, name: &str) -> Result<Node, SelectError> {
        match self.grammar.classify(name) {
            WordClass::Macro(def) => {
                if def.hidden() && !self.allow_hidden {
                    Err(self.error("a visible macro name"))
                } else {
                    Ok(Node::Macro(def.name.clone()))
                }
            }
            _ => Err(self.error("a macro name")),
        }
    }

    /// A keyword token starts a property selection, a comparison, or a bare
    /// flag, depending on what follows it.
    fn parse_keyword_predicate(&mut self, def: &KeywordDef) -> Result<Node, SelectError> {
        let next = self.peek(1).clone();
        if cmp_op(&next).is_some() || is_math_continuation(&next) {
            let expr = self.parse_math()?;
            return self.parse_compare_tail(expr);
        }
        if self.is_item_start(&next) {
            self.advance();
            let items = self.parse_items()?;
            return Ok(Node::Property {
                field: MathExpr::field(def.name.clone()),
                items,
                case_insensitive: def.case_insensitive,
            });
        }
        self.advance();
        Ok(Node::Flag(def.name.clone()))
    }

    /// `( ... )` is either a parenthesized selection or a parenthesized math
    /// expression acting as the field of a property selection or comparison.
    /// The math reading is attempted first; on failure or when nothing that
    /// needs a math value follows, the parse restarts as a selection.
    fn parse_paren(&mut self) -> Result<Node, SelectError> {
        let save = self.pos;
        if let Ok(expr) = self.parse_math() {
            let next = self.current().token.clone();
            if cmp_op(&next).is_some() || next == Token::RegexEq {
                return self.parse_compare_tail(expr);
            }
            if self.is_item_start(&next) {
                let case_insensitive = expr
                    .as_field()
                    .and_then(|n| self.grammar.keyword(n))
                    .is_some_and(|d| d.case_insensitive);
                let items = self.parse_items()?;
                return Ok(Node::Property {
                    field: expr,
                    items,
                    case_insensitive,
                });
            }
        }
        self.pos = save;
        self.advance();
        let inner = self.parse_or()?;
        self.expect_rparen()?;
        Ok(inner)
    }

    fn parse_compare_tail(&mut self, first: MathExpr) -> Result<Node, SelectError> {
        if self.current().token == Token::RegexEq {
            self.advance();
            let pattern = match self.current().token.clone() {
                Token::DoubleQuoted(p) => p,
                _ => return Err(self.error("a double-quoted pattern")),
            };
            self.advance();
            return Ok(Node::Match {
                field: first,
                pattern,
            });
        }
        let mut rest = Vec::new();
        while let Some(op) = cmp_op(&self.current().token) {
            self.advance();
            let rhs = self.parse_math()?;
            rest.push((op, rhs));
        }
        if rest.is_empty() {
            return Err(self.error("a comparison operator"));
        }
        let mut prev = &first;
        for (_, rhs) in &rest {
            if prev.kind == ValueKind::Scalar && rhs.kind == ValueKind::Scalar {
                return Err(SelectError::PureNumericMask);
            }
            prev = rhs;
        }
        Ok(Node::Compare { first, rest })
    }

    fn parse_within(&mut self, exclusive: bool) -> Result<Node, SelectError> {
        self.advance();
        let distance = match self.current().token {
            Token::Int(v) => v as f64,
            Token::Float(v) => v,
            _ => return Err(self.error("a distance")),
        };
        self.advance();
        self.expect_word("of")?;
        let inner = self.parse_not()?;
        Ok(Node::Within {
            exclusive,
            distance,
            inner: Box::new(inner),
        })
    }

    fn parse_bonded(&mut self, exclusive: bool) -> Result<Node, SelectError> {
        self.advance();
        let hops = match self.current().token {
            Token::Int(v) if v >= 0 => v as u32,
            _ => return Err(self.error("a bond count")),
        };
        self.advance();
        self.expect_word("to")?;
        let inner = self.parse_not()?;
        Ok(Node::Bonded {
            exclusive,
            hops,
            inner: Box::new(inner),
        })
    }

    fn parse_sequence(&mut self) -> Result<Node, SelectError> {
        self.advance();
        let pattern = match self.current().token.clone() {
            Token::Word(w) => w,
            Token::DoubleQuoted(s) | Token::SingleQuoted(s) | Token::Raw(s) => s,
            _ => return Err(self.error("a sequence pattern")),
        };
        self.advance();
        Ok(Node::Sequence(pattern))
    }

    fn parse_same(&mut self) -> Result<Node, SelectError> {
        self.advance();
        let group = match &self.current().token {
            Token::Word(w) => match self.grammar.keyword(w) {
                Some(def) => def.name.clone(),
                None => return Err(self.error("a grouping keyword")),
            },
            _ => return Err(self.error("a grouping keyword")),
        };
        self.advance();
        self.expect_word("as")?;
        let inner = self.parse_not()?;
        Ok(Node::Same {
            group,
            inner: Box::new(inner),
        })
    }

    fn is_item_start(&self, token: &Token) -> bool {
        match token {
            Token::Int(_)
            | Token::Float(_)
            | Token::SingleQuoted(_)
            | Token::DoubleQuoted(_)
            | Token::Raw(_) => true,
            Token::Word(w) => !self.grammar.is_reserved(w),
            _ => false,
        }
    }

    fn parse_items(&mut self) -> Result<Vec<Item>, SelectError> {
        let mut items = Vec::new();
        loop {
            match self.current().token.clone() {
                Token::Int(_) | Token::Float(_) => {
                    let lo = self.expect_number()?;
                    if self.is_word("to") {
                        self.advance();
                        let hi = self.expect_number()?;
                        items.push(Item::Range { lo, hi, step: None });
                    } else if self.current().token == Token::Colon {
                        self.advance();
                        let hi = self.expect_number()?;
                        let step = if self.current().token == Token::Colon {
                            self.advance();
                            Some(self.expect_number()?)
                        } else {
                            None
                        };
                        items.push(Item::Range { lo, hi, step });
                    } else {
                        items.push(Item::Num(lo));
                    }
                }
                Token::Word(w) if !self.grammar.is_reserved(&w) => {
                    self.advance();
                    items.push(Item::Str {
                        value: w,
                        quoted: false,
                    });
                }
                Token::SingleQuoted(s) => {
                    self.advance();
                    items.push(Item::Str {
                        value: s,
                        quoted: true,
                    });
                }
                Token::DoubleQuoted(s) => {
                    self.advance();
                    items.push(Item::Regex(s));
                }
                Token::Raw(s) => {
                    self.advance();
                    items.push(Item::Raw(s));
                }
                _ => break,
            }
        }
        if items.is_empty() {
            return Err(self.error("a value"));
        }
        Ok(items)
    }

    fn expect_number(&mut self) -> Result<Numeric, SelectError> {
        let value = match self.current().token {
            Token::Int(v) => Numeric::Int(v),
            Token::Float(v) => Numeric::Float(v),
            _ => return Err(self.error("a number")),
        };
        self.advance();
        Ok(value)
    }

    // Math expressions, standard precedence: +- < */ //% < unary - < **.
    fn parse_math(&mut self) -> Result<MathExpr, SelectError> {
        self.parse_add()
    }

    fn parse_add(&mut self) -> Result<MathExpr, SelectError> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.current().token {
                Token::Plus => crate::ast::BinOp::Add,
                Token::Minus => crate::ast::BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_mul()?;
            left = MathExpr::bin(op, left, right);
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> Result<MathExpr, SelectError> {
        let mut left = self.parse_math_unary()?;
        loop {
            let op = match self.current().token {
                Token::Star => crate::ast::BinOp::Mul,
                Token::Slash => crate::ast::BinOp::Div,
                Token::SlashSlash => crate::ast::BinOp::FloorDiv,
                Token::Percent => crate::ast::BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_math_unary()?;
            left = MathExpr::bin(op, left, right);
        }
        Ok(left)
    }

    fn parse_math_unary(&mut self) -> Result<MathExpr, SelectError> {
        if self.current().token == Token::Minus {
            self.advance();
            let inner = self.parse_math_unary()?;
            Ok(MathExpr::neg(inner))
        } else {
            self.parse_pow()
        }
    }

    fn parse_pow(&mut self) -> Result<MathExpr, SelectError> {
        let base = self.parse_math_atom()?;
        if self.current().token == Token::StarStar {
            self.advance();
            let exp = self.parse_math_unary()?;
            Ok(MathExpr::bin(crate::ast::BinOp::Pow, base, exp))
        } else {
            Ok(base)
        }
    }

    fn parse_math_atom(&mut self) -> Result<MathExpr, SelectError> {
        match self.current().token.clone() {
            Token::Int(v) => {
                self.advance();
                Ok(MathExpr::num(Numeric::Int(v)))
            }
            Token::Float(v) => {
                self.advance();
                Ok(MathExpr::num(Numeric::Float(v)))
            }
            Token::Var(name) => {
                self.advance();
                Ok(MathExpr::var(name))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_math()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Token::Word(w) => match w.as_str() {
                "pi" => {
                    self.advance();
                    Ok(MathExpr::pi())
                }
                "e" => {
                    self.advance();
                    Ok(MathExpr::e())
                }
                _ => {
                    if let Some(f) = MathFn::from_name(&w) {
                        self.advance();
                        if self.current().token != Token::LParen {
                            return Err(self.error("`(`"));
                        }
                        self.advance();
                        let arg = self.parse_math()?;
                        self.expect_rparen()?;
                        return Ok(MathExpr::func(f, arg));
                    }
                    match self.grammar.keyword(&w) {
                        Some(def) => {
                            let name = def.name.clone();
                            self.advance();
                            Ok(MathExpr::field(name))
                        }
                        None => Err(self.error("a number, function, or field")),
                    }
                }
            },
            _ => Err(self.error("a math expression")),
        }
    }
}

fn cmp_op(token: &Token) -> Option<CmpOp> {
    match token {
        Token::Lt => Some(CmpOp::Lt),
        Token::Le => Some(CmpOp::Le),
        Token::Gt => Some(CmpOp::Gt),
        Token::Ge => Some(CmpOp::Ge),
        Token::Eq => Some(CmpOp::Eq),
        Token::Ne => Some(CmpOp::Ne),
        Token::Word(w) => CmpOp::from_word(w),
        _ => None,
    }
}

/// Operators that force the keyword before them to be read as a math field.
fn is_math_continuation(token: &Token) -> bool {
    matches!(
        token,
        Token::Plus
            | Token::Minus
            | Token::Star
            | Token::StarStar
            | Token::Slash
            | Token::SlashSlash
            | Token::Percent
            | Token::RegexEq
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinOp;
    use crate::grammar::Grammar;

    fn parse(query: &str) -> Result<Node, SelectError> {
        Grammar::builtin().unwrap().parse_raw(query)
    }

    #[test]
    fn test_parse_property() {
        let node = parse("name CA").unwrap();
        match node {
            Node::Property { field, items, .. } => {
                assert_eq!(field.as_field(), Some("name"));
                assert_eq!(
                    items,
                    vec![Item::Str {
                        value: "CA".into(),
                        quoted: false
                    }]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_synonym_canonicalized() {
        let node = parse("resseq 5").unwrap();
        match node {
            Node::Property { field, .. } => assert_eq!(field.as_field(), Some("resid")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_value_list() {
        let node = parse("name CA CB 'N A' \"O.*\"").unwrap();
        match node {
            Node::Property { items, .. } => {
                assert_eq!(items.len(), 4);
                assert!(matches!(&items[2], Item::Str { value, quoted: true } if value == "N A"));
                assert!(matches!(&items[3], Item::Regex(p) if p == "O.*"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_ranges() {
        for query in ["resid 1 to 10", "resid 1:10"] {
            let node = parse(query).unwrap();
            match node {
                Node::Property { items, .. } => assert_eq!(
                    items,
                    vec![Item::Range {
                        lo: Numeric::Int(1),
                        hi: Numeric::Int(10),
                        step: None
                    }]
                ),
                other => panic!("unexpected {other:?}"),
            }
        }
        let node = parse("resid 1:10:3").unwrap();
        match node {
            Node::Property { items, .. } => {
                assert!(matches!(&items[0], Item::Range { step: Some(Numeric::Int(3)), .. }))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_logical_precedence() {
        // or < xor < and, so this groups as (a or (b xor (c and d))).
        let node = parse("protein or water xor ion and all").unwrap();
        match node {
            Node::Or(_, rhs) => match *rhs {
                Node::Xor(_, rhs) => assert!(matches!(*rhs, Node::And(_, _))),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_implicit_and() {
        let explicit = parse("name CA and resname ALA").unwrap();
        let implicit = parse("name CA resname ALA").unwrap();
        assert_eq!(explicit, implicit);
    }

    #[test]
    fn test_parse_symbolic_operators() {
        assert_eq!(parse("water || ion").unwrap(), parse("water or ion").unwrap());
        assert_eq!(
            parse("water && !ion").unwrap(),
            parse("water and not ion").unwrap()
        );
    }

    #[test]
    fn test_parse_not_chain() {
        let node = parse("not not water").unwrap();
        assert!(matches!(node, Node::Not(inner) if matches!(*inner, Node::Not(_))));
    }

    #[test]
    fn test_parse_parens_override() {
        let node = parse("(water or ion) and name CA").unwrap();
        assert!(matches!(node, Node::And(lhs, _) if matches!(*lhs, Node::Or(_, _))));
    }

    #[test]
    fn test_parse_comparison() {
        let node = parse("mass > 12.5").unwrap();
        match node {
            Node::Compare { first, rest } => {
                assert_eq!(first.as_field(), Some("mass"));
                assert_eq!(rest.len(), 1);
                assert_eq!(rest[0].0, CmpOp::Gt);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_comparison_chain() {
        let node = parse("0 <= resid lt 100").unwrap();
        match node {
            Node::Compare { rest, .. } => {
                assert_eq!(rest.len(), 2);
                assert_eq!(rest[0].0, CmpOp::Le);
                assert_eq!(rest[1].0, CmpOp::Lt);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_math_precedence() {
        let node = parse("mass + 2 * 3 > 0").unwrap();
        match node {
            Node::Compare { first, .. } => match first.node {
                crate::ast::MathNode::Bin(BinOp::Add, _, rhs) => {
                    assert!(matches!(rhs.node, crate::ast::MathNode::Bin(BinOp::Mul, _, _)))
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_function_call() {
        let node = parse("sqrt(x**2 + y**2) < 10").unwrap();
        match node {
            Node::Compare { first, .. } => {
                assert_eq!(first.kind, ValueKind::Vector);
                assert!(matches!(
                    first.node,
                    crate::ast::MathNode::Func(MathFn::Sqrt, _)
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_pure_numeric_comparison_rejected() {
        assert!(matches!(
            parse("sqrt(25) < 10"),
            Err(SelectError::PureNumericMask)
        ));
        assert!(matches!(
            parse("1 < 2 < resid"),
            Err(SelectError::PureNumericMask)
        ));
        // A field anywhere in the expression makes it a vector.
        assert!(parse("sqrt(sq(x)) < 10").is_ok());
    }

    #[test]
    fn test_parse_regex_selection() {
        let node = parse("name =~ \"C.*\"").unwrap();
        match node {
            Node::Match { field, pattern } => {
                assert_eq!(field.as_field(), Some("name"));
                assert_eq!(pattern, "C.*");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_within() {
        let node = parse("within 5 of water").unwrap();
        match node {
            Node::Within {
                exclusive,
                distance,
                inner,
            } => {
                assert!(!exclusive);
                assert_eq!(distance, 5.0);
                assert!(matches!(*inner, Node::Macro(m) if m == "water"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            parse("exwithin 2.5 of index 0").unwrap(),
            Node::Within {
                exclusive: true,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_bonded() {
        let node = parse("bonded 2 to index 0").unwrap();
        assert!(matches!(
            node,
            Node::Bonded {
                exclusive: false,
                hops: 2,
                ..
            }
        ));
        assert!(matches!(
            parse("exbonded 1 to name CA").unwrap(),
            Node::Bonded {
                exclusive: true,
                hops: 1,
                ..
            }
        ));
        assert!(parse("bonded 1.5 to name CA").is_err());
    }

    #[test]
    fn test_parse_sequence() {
        assert_eq!(
            parse("sequence \"MIEIK\"").unwrap(),
            Node::Sequence("MIEIK".into())
        );
        assert_eq!(parse("sequence MIEIK").unwrap(), Node::Sequence("MIEIK".into()));
    }

    #[test]
    fn test_parse_same() {
        let node = parse("same residue as name CA").unwrap();
        match node {
            Node::Same { group, inner } => {
                assert_eq!(group, "residue");
                assert!(matches!(*inner, Node::Property { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse("same banana as name CA").is_err());
    }

    #[test]
    fn test_parse_flags_and_macros() {
        assert_eq!(parse("all").unwrap(), Node::All);
        assert_eq!(parse("nothing").unwrap(), Node::None_);
        assert_eq!(parse("charge").unwrap(), Node::Flag("charge".into()));
        assert_eq!(parse("protein").unwrap(), Node::Macro("protein".into()));
        assert_eq!(parse("@protein").unwrap(), Node::Macro("protein".into()));
        // Synonym addresses the canonical macro.
        assert_eq!(parse("ca").unwrap(), Node::Macro("calpha".into()));
    }

    #[test]
    fn test_hidden_macros_rejected_at_surface() {
        assert!(parse("_std_aa").is_err());
        assert!(parse("@_std_aa").is_err());
        let grammar = Grammar::builtin().unwrap();
        assert!(grammar.parse_definition("_std_aa").is_ok());
    }

    #[test]
    fn test_parse_var() {
        let node = parse("$flex > 0.5").unwrap();
        match node {
            Node::Compare { first, .. } => {
                assert!(matches!(first.node, crate::ast::MathNode::Var(v) if v == "flex"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_paren_math_field() {
        let node = parse("(x + 1) 5 to 10").unwrap();
        match node {
            Node::Property { field, items, .. } => {
                assert_eq!(field.kind, ValueKind::Vector);
                assert_eq!(items.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        let node = parse("(x + y) < 4").unwrap();
        assert!(matches!(node, Node::Compare { .. }));
    }

    #[test]
    fn test_parse_raw_item() {
        let node = parse("resid `-5:10`").unwrap();
        match node {
            Node::Property { items, .. } => {
                assert_eq!(items, vec![Item::Raw("-5:10".into())]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reserved_words_not_items() {
        // `protein` ends the item list and attaches with implied `and`.
        let node = parse("name CA protein").unwrap();
        assert!(matches!(node, Node::And(_, _)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("name").is_ok()); // bare flag
        assert!(parse("garbage_word").is_err());
        assert!(parse("(water").is_err());
        assert!(parse("within of water").is_err());
        assert!(parse("mass >").is_err());
        let err = parse("name CA and and").unwrap_err();
        assert!(err.to_string().contains("expected"));
    }

    #[test]
    fn test_error_span_points_at_offender() {
        let err = parse("name CA and ??").unwrap_err();
        let text = err.to_string();
        assert!(text.contains('^'), "no caret in: {text}");
    }
}
