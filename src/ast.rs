//! Typed IR for the selection language.
//!
//! The tree carries four layers: logical combinators, predicates, math
//! expressions, and property items. Every math expression is tagged
//! [`ValueKind::Scalar`] (a plain number) or [`ValueKind::Vector`] (touches
//! at least one per-atom field or variable); the tag is assigned when the
//! node is built and travels unchanged through macro expansion.

/// Whether a math expression is a plain number or a per-atom vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Scalar,
    Vector,
}

/// A numeric literal that remembers whether it was written as an integer.
/// Integer-ness drives range/step semantics and floor-division behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Numeric::Int(v) => v as f64,
            Numeric::Float(v) => v,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Numeric::Int(_))
    }
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

/// Unary math functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Log,
    Log10,
    Sqrt,
    Sq,
    Abs,
    Floor,
    Ceil,
}

impl MathFn {
    /// Resolve a function name; `sq`, `sqr`, and `square` are synonyms.
    pub fn from_name(name: &str) -> Option<MathFn> {
        Some(match name {
            "sin" => MathFn::Sin,
            "cos" => MathFn::Cos,
            "tan" => MathFn::Tan,
            "asin" => MathFn::Asin,
            "acos" => MathFn::Acos,
            "atan" => MathFn::Atan,
            "sinh" => MathFn::Sinh,
            "cosh" => MathFn::Cosh,
            "tanh" => MathFn::Tanh,
            "exp" => MathFn::Exp,
            "log" => MathFn::Log,
            "log10" => MathFn::Log10,
            "sqrt" => MathFn::Sqrt,
            "sq" | "sqr" | "square" => MathFn::Sq,
            "abs" => MathFn::Abs,
            "floor" => MathFn::Floor,
            "ceil" => MathFn::Ceil,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            MathFn::Sin => "sin",
            MathFn::Cos => "cos",
            MathFn::Tan => "tan",
            MathFn::Asin => "asin",
            MathFn::Acos => "acos",
            MathFn::Atan => "atan",
            MathFn::Sinh => "sinh",
            MathFn::Cosh => "cosh",
            MathFn::Tanh => "tanh",
            MathFn::Exp => "exp",
            MathFn::Log => "log",
            MathFn::Log10 => "log10",
            MathFn::Sqrt => "sqrt",
            MathFn::Sq => "sq",
            MathFn::Abs => "abs",
            MathFn::Floor => "floor",
            MathFn::Ceil => "ceil",
        }
    }
}

/// Comparison operators, including the word spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    pub fn from_word(word: &str) -> Option<CmpOp> {
        Some(match word {
            "lt" => CmpOp::Lt,
            "le" => CmpOp::Le,
            "gt" => CmpOp::Gt,
            "ge" => CmpOp::Ge,
            "eq" => CmpOp::Eq,
            "ne" => CmpOp::Ne,
            _ => return None,
        })
    }

    pub fn compare(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
        }
    }
}

/// A math expression together with its statically-assigned kind.
#[derive(Debug, Clone, PartialEq)]
pub struct MathExpr {
    pub kind: ValueKind,
    pub node: MathNode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MathNode {
    Num(Numeric),
    Pi,
    E,
    Neg(Box<MathExpr>),
    Bin(BinOp, Box<MathExpr>, Box<MathExpr>),
    Func(MathFn, Box<MathExpr>),
    /// A per-atom column, stored by canonical keyword name.
    Field(String),
    /// A caller-supplied `$variable`.
    Var(String),
}

impl MathExpr {
    pub fn num(value: Numeric) -> Self {
        MathExpr {
            kind: ValueKind::Scalar,
            node: MathNode::Num(value),
        }
    }

    pub fn pi() -> Self {
        MathExpr {
            kind: ValueKind::Scalar,
            node: MathNode::Pi,
        }
    }

    pub fn e() -> Self {
        MathExpr {
            kind: ValueKind::Scalar,
            node: MathNode::E,
        }
    }

    pub fn field(name: impl Into<String>) -> Self {
        MathExpr {
            kind: ValueKind::Vector,
            node: MathNode::Field(name.into()),
        }
    }

    /// Variables may be bound to a scalar or a per-atom vector; the static
    /// kind is `Vector` so a comparison against one is always a valid mask.
    pub fn var(name: impl Into<String>) -> Self {
        MathExpr {
            kind: ValueKind::Vector,
            node: MathNode::Var(name.into()),
        }
    }

    pub fn neg(inner: MathExpr) -> Self {
        MathExpr {
            kind: inner.kind,
            node: MathNode::Neg(Box::new(inner)),
        }
    }

    pub fn bin(op: BinOp, left: MathExpr, right: MathExpr) -> Self {
        let kind = if left.kind == ValueKind::Vector || right.kind == ValueKind::Vector {
            ValueKind::Vector
        } else {
            ValueKind::Scalar
        };
        MathExpr {
            kind,
            node: MathNode::Bin(op, Box::new(left), Box::new(right)),
        }
    }

    pub fn func(f: MathFn, arg: MathExpr) -> Self {
        MathExpr {
            kind: arg.kind,
            node: MathNode::Func(f, Box::new(arg)),
        }
    }

    /// The bare field name if this expression is a single column reference.
    pub fn as_field(&self) -> Option<&str> {
        match &self.node {
            MathNode::Field(name) => Some(name),
            _ => None,
        }
    }
}

/// One value in a property selection; values within one selection are ORed.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// Bare or single-quoted string value.
    Str { value: String, quoted: bool },
    /// Backtick-quoted raw text; reinterpreted against numeric fields.
    Raw(String),
    /// Double-quoted regex pattern.
    Regex(String),
    Num(Numeric),
    Range {
        lo: Numeric,
        hi: Numeric,
        step: Option<Numeric>,
    },
}

/// Predicate / logical layer of the IR. Every node evaluates to a mask.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Xor(Box<Node>, Box<Node>),
    Not(Box<Node>),
    /// `all` / `everything`.
    All,
    /// `none` / `nothing`.
    None_,
    /// A bare keyword used as a flag: property exists and is non-zero or
    /// non-empty.
    Flag(String),
    /// A macro reference by canonical name; replaced during expansion.
    Macro(String),
    Property {
        field: MathExpr,
        items: Vec<Item>,
        case_insensitive: bool,
    },
    /// A chain `a op b op c ...`; adjacent comparisons are ANDed.
    Compare {
        first: MathExpr,
        rest: Vec<(CmpOp, MathExpr)>,
    },
    /// `expr =~ "pattern"`.
    Match { field: MathExpr, pattern: String },
    Within {
        exclusive: bool,
        distance: f64,
        inner: Box<Node>,
    },
    Bonded {
        exclusive: bool,
        hops: u32,
        inner: Box<Node>,
    },
    Sequence(String),
    Same {
        group: String,
        inner: Box<Node>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_propagation() {
        let scalar = MathExpr::bin(
            BinOp::Add,
            MathExpr::num(Numeric::Int(1)),
            MathExpr::pi(),
        );
        assert_eq!(scalar.kind, ValueKind::Scalar);

        let vector = MathExpr::bin(BinOp::Mul, MathExpr::field("mass"), scalar);
        assert_eq!(vector.kind, ValueKind::Vector);

        let through_func = MathExpr::func(MathFn::Sqrt, MathExpr::neg(MathExpr::field("x")));
        assert_eq!(through_func.kind, ValueKind::Vector);
    }

    #[test]
    fn test_cmp_words() {
        assert_eq!(CmpOp::from_word("le"), Some(CmpOp::Le));
        assert_eq!(CmpOp::from_word("ne"), Some(CmpOp::Ne));
        assert_eq!(CmpOp::from_word("spam"), None);
        assert!(CmpOp::Le.compare(2.0, 2.0));
        assert!(!CmpOp::Lt.compare(2.0, 2.0));
    }

    #[test]
    fn test_fn_synonyms() {
        assert_eq!(MathFn::from_name("sq"), Some(MathFn::Sq));
        assert_eq!(MathFn::from_name("sqr"), Some(MathFn::Sq));
        assert_eq!(MathFn::from_name("square"), Some(MathFn::Sq));
        assert_eq!(MathFn::from_name("log10"), Some(MathFn::Log10));
    }

    #[test]
    fn test_numeric() {
        assert_eq!(Numeric::Int(3).as_f64(), 3.0);
        assert!(Numeric::Int(3).is_int());
        assert!(!Numeric::Float(3.0).is_int());
    }
}
