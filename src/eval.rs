//! Evaluator: walks the expanded IR against a [`MolecularContext`] and
//! produces a boolean mask over atoms.
//!
//! Evaluation is synchronous and never mutates the context; the one shared
//! structure, the spatial index, is built through the context's lazy
//! initializer so concurrent evaluations on other threads can reuse it.

use std::borrow::Cow;

use rustc_hash::FxHashSet;

use crate::ast::{BinOp, CmpOp, Item, MathExpr, MathFn, MathNode, Node, Numeric};
use crate::bonded;
use crate::context::{Column, GroupKind, MolecularContext, Variable};
use crate::error::SelectError;
use crate::sequence;

/// Evaluate an expanded IR tree to a mask of length `n_atoms`.
pub fn evaluate(node: &Node, ctx: &MolecularContext) -> Result<Vec<bool>, SelectError> {
    Evaluator { ctx }.eval_mask(node)
}

/// Indices of the set bits of a mask, in order.
pub fn mask_to_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &b)| if b { Some(i) } else { None })
        .collect()
}

/// A math expression's value: one number or one number per atom.
enum NumValue {
    Scalar(Numeric),
    Vector(Vec<f64>),
}

/// A resolved field column. `index`, `residue`, and `fragment` may be
/// synthesized from the context when no explicit column was supplied.
enum FieldCol<'a> {
    Int(Cow<'a, [i64]>),
    Float(&'a [f64]),
    Str(&'a [String]),
}

struct Evaluator<'a> {
    ctx: &'a MolecularContext,
}

impl<'a> Evaluator<'a> {
    fn n(&self) -> usize {
        self.ctx.n_atoms()
    }

    fn eval_mask(&self, node: &Node) -> Result<Vec<bool>, SelectError> {
        match node {
            Node::And(l, r) => {
                let a = self.eval_mask(l)?;
                let b = self.eval_mask(r)?;
                Ok(a.iter().zip(&b).map(|(&x, &y)| x && y).collect())
            }
            Node::Or(l, r) => {
                let a = self.eval_mask(l)?;
                let b = self.eval_mask(r)?;
                Ok(a.iter().zip(&b).map(|(&x, &y)| x || y).collect())
            }
            Node::Xor(l, r) => {
                let a = self.eval_mask(l)?;
                let b = self.eval_mask(r)?;
                Ok(a.iter().zip(&b).map(|(&x, &y)| x ^ y).collect())
            }
            Node::Not(inner) => {
                let a = self.eval_mask(inner)?;
                Ok(a.iter().map(|&x| !x).collect())
            }
            Node::All => Ok(vec![true; self.n()]),
            Node::None_ => Ok(vec![false; self.n()]),
            Node::Flag(name) => self.eval_flag(name),
            Node::Macro(name) => Err(SelectError::Type(format!(
                "macro `{name}` was not expanded before evaluation"
            ))),
            Node::Property {
                field,
                items,
                case_insensitive,
            } => self.eval_property(field, items, *case_insensitive),
            Node::Compare { first, rest } => self.eval_compare(first, rest),
            Node::Match { field, pattern } => self.eval_match(field, pattern),
            Node::Within {
                exclusive,
                distance,
                inner,
            } => self.eval_within(*exclusive, *distance, inner),
            Node::Bonded {
                exclusive,
                hops,
                inner,
            } => self.eval_bonded(*exclusive, *hops, inner),
            Node::Sequence(pattern) => self.eval_sequence(pattern),
            Node::Same { group, inner } => self.eval_same(group, inner),
        }
    }

    /// A bare keyword selects atoms whose value is non-zero / non-empty.
    fn eval_flag(&self, name: &str) -> Result<Vec<bool>, SelectError> {
        Ok(match self.field_column(name)? {
            FieldCol::Int(values) => values.iter().map(|&v| v != 0).collect(),
            FieldCol::Float(values) => values.iter().map(|&v| v != 0.0).collect(),
            FieldCol::Str(values) => values.iter().map(|v| !v.is_empty()).collect(),
        })
    }

    fn field_column(&self, name: &str) -> Result<FieldCol<'a>, SelectError> {
        if let Some(col) = self.ctx.column(name) {
            return Ok(match col {
                Column::Int(v) => FieldCol::Int(Cow::Borrowed(v)),
                Column::Float(v) => FieldCol::Float(v),
                Column::Str(v) => FieldCol::Str(v),
            });
        }
        let synthesized = match name {
            "index" => Some((0..self.n() as i64).collect::<Vec<_>>()),
            "residue" => self
                .ctx
                .group_ids(GroupKind::Residue)
                .map(|g| g.iter().map(|&v| v as i64).collect()),
            "fragment" => self
                .ctx
                .group_ids(GroupKind::Fragment)
                .map(|g| g.iter().map(|&v| v as i64).collect()),
            _ => None,
        };
        match synthesized {
            Some(values) => Ok(FieldCol::Int(Cow::Owned(values))),
            None => Err(SelectError::UnknownField(name.to_string())),
        }
    }

    fn eval_property(
        &self,
        field: &MathExpr,
        items: &[Item],
        case_insensitive: bool,
    ) -> Result<Vec<bool>, SelectError> {
        if let Some(name) = field.as_field() {
            match self.field_column(name)? {
                FieldCol::Str(values) => {
                    return self.match_str_items(name, values, items, case_insensitive)
                }
                FieldCol::Int(values) => return self.match_int_items(name, &values, items),
                FieldCol::Float(values) => return self.match_float_items(name, values, items),
            }
        }
        let values = self.eval_vector(field)?;
        self.match_float_items("expression", &values, items)
    }

    fn match_str_items(
        &self,
        name: &str,
        values: &[String],
        items: &[Item],
        case_insensitive: bool,
    ) -> Result<Vec<bool>, SelectError> {
        let mut mask = vec![false; self.n()];
        for item in items {
            match item {
                Item::Str { value, .. } | Item::Raw(value) => {
                    for (m, v) in mask.iter_mut().zip(values) {
                        *m |= if case_insensitive {
                            v.eq_ignore_ascii_case(value)
                        } else {
                            v == value
                        };
                    }
                }
                Item::Regex(pattern) => {
                    let re = compile(pattern)?;
                    for (m, v) in mask.iter_mut().zip(values) {
                        *m |= re.is_match(v);
                    }
                }
                Item::Num(_) | Item::Range { .. } => {
                    return Err(SelectError::Type(format!(
                        "numeric value against string field `{name}`"
                    )))
                }
            }
        }
        Ok(mask)
    }

    fn match_int_items(
        &self,
        name: &str,
        values: &[i64],
        items: &[Item],
    ) -> Result<Vec<bool>, SelectError> {
        let mut mask = vec![false; self.n()];
        for item in items {
            match item {
                Item::Num(n) => {
                    let target = n.as_f64();
                    for (m, &v) in mask.iter_mut().zip(values) {
                        *m |= v as f64 == target;
                    }
                }
                Item::Range { lo, hi, step } => {
                    check_step(step)?;
                    if lo.is_int() && hi.is_int() && step.map_or(true, |s| s.is_int()) {
                        let (lo, hi) = (as_int(lo), as_int(hi));
                        let step = step.map(|s| as_int(&s));
                        for (m, &v) in mask.iter_mut().zip(values) {
                            *m |= int_range_contains(v, lo, hi, step);
                        }
                    } else {
                        let step = step.map(|s| s.as_f64());
                        for (m, &v) in mask.iter_mut().zip(values) {
                            *m |= real_range_contains(v as f64, lo.as_f64(), hi.as_f64(), step);
                        }
                    }
                }
                Item::Regex(pattern) => {
                    let re = compile(pattern)?;
                    for (m, &v) in mask.iter_mut().zip(values) {
                        *m |= re.is_match(&v.to_string());
                    }
                }
                Item::Raw(text) => {
                    let reparsed = parse_raw_numeric(name, text)?;
                    let sub = self.match_int_items(name, values, &reparsed)?;
                    for (m, s) in mask.iter_mut().zip(sub) {
                        *m |= s;
                    }
                }
                Item::Str { .. } => {
                    return Err(SelectError::Type(format!(
                        "string value against integer field `{name}`"
                    )))
                }
            }
        }
        Ok(mask)
    }

    fn match_float_items(
        &self,
        name: &str,
        values: &[f64],
        items: &[Item],
    ) -> Result<Vec<bool>, SelectError> {
        let mut mask = vec![false; self.n()];
        for item in items {
            match item {
                Item::Num(n) => {
                    let target = n.as_f64();
                    for (m, &v) in mask.iter_mut().zip(values) {
                        *m |= v == target;
                    }
                }
                Item::Range { lo, hi, step } => {
                    check_step(step)?;
                    let step = step.map(|s| s.as_f64());
                    for (m, &v) in mask.iter_mut().zip(values) {
                        *m |= real_range_contains(v, lo.as_f64(), hi.as_f64(), step);
                    }
                }
                Item::Regex(pattern) => {
                    let re = compile(pattern)?;
                    for (m, &v) in mask.iter_mut().zip(values) {
                        *m |= re.is_match(&v.to_string());
                    }
                }
                Item::Raw(text) => {
                    let reparsed = parse_raw_numeric(name, text)?;
                    let sub = self.match_float_items(name, values, &reparsed)?;
                    for (m, s) in mask.iter_mut().zip(sub) {
                        *m |= s;
                    }
                }
                Item::Str { .. } => {
                    return Err(SelectError::Type(format!(
                        "string value against numeric field `{name}`"
                    )))
                }
            }
        }
        Ok(mask)
    }

    fn eval_compare(
        &self,
        first: &MathExpr,
        rest: &[(CmpOp, MathExpr)],
    ) -> Result<Vec<bool>, SelectError> {
        let mut operands = Vec::with_capacity(rest.len() + 1);
        operands.push(self.eval_math(first)?);
        for (_, expr) in rest {
            operands.push(self.eval_math(expr)?);
        }
        let mut mask = vec![true; self.n()];
        for (k, (op, _)) in rest.iter().enumerate() {
            let pair = self.compare_pair(&operands[k], *op, &operands[k + 1]);
            for (m, p) in mask.iter_mut().zip(pair) {
                *m &= p;
            }
        }
        Ok(mask)
    }

    /// Elementwise comparison with scalar broadcast.
    fn compare_pair(&self, left: &NumValue, op: CmpOp, right: &NumValue) -> Vec<bool> {
        let n = self.n();
        match (left, right) {
            (NumValue::Scalar(a), NumValue::Scalar(b)) => {
                vec![op.compare(a.as_f64(), b.as_f64()); n]
            }
            (NumValue::Scalar(a), NumValue::Vector(b)) => {
                b.iter().map(|&v| op.compare(a.as_f64(), v)).collect()
            }
            (NumValue::Vector(a), NumValue::Scalar(b)) => {
                a.iter().map(|&v| op.compare(v, b.as_f64())).collect()
            }
            (NumValue::Vector(a), NumValue::Vector(b)) => a
                .iter()
                .zip(b)
                .map(|(&x, &y)| op.compare(x, y))
                .collect(),
        }
    }

    fn eval_match(&self, field: &MathExpr, pattern: &str) -> Result<Vec<bool>, SelectError> {
        let name = field.as_field().ok_or_else(|| {
            SelectError::Type("regex selection needs a plain field on the left".to_string())
        })?;
        match self.field_column(name)? {
            FieldCol::Str(values) => {
                let re = compile(pattern)?;
                Ok(values.iter().map(|v| re.is_match(v)).collect())
            }
            _ => Err(SelectError::Type(format!(
                "regex against numeric field `{name}`"
            ))),
        }
    }

    fn eval_within(
        &self,
        exclusive: bool,
        distance: f64,
        inner: &Node,
    ) -> Result<Vec<bool>, SelectError> {
        let inner_mask = self.eval_mask(inner)?;
        let tree = self.ctx.kdtree()?;
        let mut mask = vec![false; self.n()];
        for source in mask_to_indices(&inner_mask) {
            let center = *tree.point(source);
            tree.for_each_within(&center, distance, &mut |j| mask[j] = true);
        }
        if exclusive {
            for (m, &was_inner) in mask.iter_mut().zip(&inner_mask) {
                *m &= !was_inner;
            }
        }
        Ok(mask)
    }

    fn eval_bonded(
        &self,
        exclusive: bool,
        hops: u32,
        inner: &Node,
    ) -> Result<Vec<bool>, SelectError> {
        let neighbors = self.ctx.neighbors().ok_or(SelectError::NoTopology)?;
        let inner_mask = self.eval_mask(inner)?;
        let counts = bonded::hop_counts(neighbors, mask_to_indices(&inner_mask), hops.max(1));
        let mut mask: Vec<bool> = counts.iter().map(|&h| h == hops).collect();
        if exclusive {
            for (m, &h) in mask.iter_mut().zip(&counts) {
                *m &= h != 1;
            }
        }
        Ok(mask)
    }

    fn eval_sequence(&self, pattern: &str) -> Result<Vec<bool>, SelectError> {
        let chains = self.ctx.chains().ok_or_else(|| {
            SelectError::Context("sequence selection requires resid and resname columns".into())
        })?;
        let selected = sequence::matching_residues(chains, pattern)?;
        let groups = self.ctx.group_ids(GroupKind::Residue).ok_or_else(|| {
            SelectError::Context("sequence selection requires resid and resname columns".into())
        })?;
        Ok(groups.iter().map(|g| selected.contains(g)).collect())
    }

    fn eval_same(&self, group: &str, inner: &Node) -> Result<Vec<bool>, SelectError> {
        let inner_mask = self.eval_mask(inner)?;
        if let Some(kind) = GroupKind::from_keyword(group) {
            let ids = self
                .ctx
                .group_ids(kind)
                .ok_or_else(|| SelectError::UnknownField(group.to_string()))?;
            let selected: FxHashSet<usize> = ids
                .iter()
                .zip(&inner_mask)
                .filter(|(_, &m)| m)
                .map(|(&g, _)| g)
                .collect();
            return Ok(ids.iter().map(|g| selected.contains(g)).collect());
        }
        // Any other keyword groups atoms by equal column values.
        match self.field_column(group)? {
            FieldCol::Str(values) => {
                let selected: FxHashSet<&str> = values
                    .iter()
                    .zip(&inner_mask)
                    .filter(|(_, &m)| m)
                    .map(|(v, _)| v.as_str())
                    .collect();
                Ok(values.iter().map(|v| selected.contains(v.as_str())).collect())
            }
            FieldCol::Int(values) => {
                let selected: FxHashSet<i64> = values
                    .iter()
                    .zip(&inner_mask)
                    .filter(|(_, &m)| m)
                    .map(|(&v, _)| v)
                    .collect();
                Ok(values.iter().map(|v| selected.contains(v)).collect())
            }
            FieldCol::Float(values) => {
                let selected: FxHashSet<u64> = values
                    .iter()
                    .zip(&inner_mask)
                    .filter(|(_, &m)| m)
                    .map(|(v, _)| v.to_bits())
                    .collect();
                Ok(values.iter().map(|v| selected.contains(&v.to_bits())).collect())
            }
        }
    }

    fn eval_math(&self, expr: &MathExpr) -> Result<NumValue, SelectError> {
        match &expr.node {
            MathNode::Num(n) => Ok(NumValue::Scalar(*n)),
            MathNode::Pi => Ok(NumValue::Scalar(Numeric::Float(std::f64::consts::PI))),
            MathNode::E => Ok(NumValue::Scalar(Numeric::Float(std::f64::consts::E))),
            MathNode::Field(name) => match self.field_column(name)? {
                FieldCol::Int(values) => {
                    Ok(NumValue::Vector(values.iter().map(|&v| v as f64).collect()))
                }
                FieldCol::Float(values) => Ok(NumValue::Vector(values.to_vec())),
                FieldCol::Str(_) => Err(SelectError::Type(format!(
                    "arithmetic on string field `{name}`"
                ))),
            },
            MathNode::Var(name) => match self.ctx.variable(name) {
                Some(Variable::Scalar(v)) => Ok(NumValue::Scalar(Numeric::Float(*v))),
                Some(Variable::Vector(v)) => Ok(NumValue::Vector(v.clone())),
                None => Err(SelectError::UnknownVariable(name.clone())),
            },
            MathNode::Neg(inner) => match self.eval_math(inner)? {
                NumValue::Scalar(Numeric::Int(v)) => Ok(NumValue::Scalar(Numeric::Int(-v))),
                NumValue::Scalar(Numeric::Float(v)) => Ok(NumValue::Scalar(Numeric::Float(-v))),
                NumValue::Vector(v) => Ok(NumValue::Vector(v.into_iter().map(|x| -x).collect())),
            },
            MathNode::Bin(op, l, r) => {
                let left = self.eval_math(l)?;
                let right = self.eval_math(r)?;
                self.eval_bin(*op, left, right)
            }
            MathNode::Func(f, arg) => match self.eval_math(arg)? {
                NumValue::Scalar(v) => Ok(NumValue::Scalar(apply_fn_scalar(*f, v)?)),
                NumValue::Vector(v) => {
                    let mut out = Vec::with_capacity(v.len());
                    for x in v {
                        out.push(apply_fn(*f, x)?);
                    }
                    Ok(NumValue::Vector(out))
                }
            },
        }
    }

    fn eval_bin(&self, op: BinOp, left: NumValue, right: NumValue) -> Result<NumValue, SelectError> {
        match (left, right) {
            (NumValue::Scalar(a), NumValue::Scalar(b)) => {
                Ok(NumValue::Scalar(scalar_bin(op, a, b)?))
            }
            (left, right) => {
                let a = self.broadcast(left);
                let b = self.broadcast(right);
                let mut out = Vec::with_capacity(a.len());
                for (x, y) in a.into_iter().zip(b) {
                    out.push(float_bin(op, x, y)?);
                }
                Ok(NumValue::Vector(out))
            }
        }
    }

    fn broadcast(&self, value: NumValue) -> Vec<f64> {
        match value {
            NumValue::Scalar(s) => vec![s.as_f64(); self.n()],
            NumValue::Vector(v) => v,
        }
    }

    fn eval_vector(&self, expr: &MathExpr) -> Result<Vec<f64>, SelectError> {
        let value = self.eval_math(expr)?;
        Ok(self.broadcast(value))
    }
}

fn compile(pattern: &str) -> Result<regex::Regex, SelectError> {
    regex::Regex::new(pattern).map_err(|source| SelectError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn as_int(n: &Numeric) -> i64 {
    match n {
        Numeric::Int(v) => *v,
        Numeric::Float(v) => *v as i64,
    }
}

fn check_step(step: &Option<Numeric>) -> Result<(), SelectError> {
    if let Some(s) = step {
        if s.as_f64() <= 0.0 {
            return Err(SelectError::Domain("range step must be positive".into()));
        }
    }
    Ok(())
}

fn int_range_contains(v: i64, lo: i64, hi: i64, step: Option<i64>) -> bool {
    if v < lo || v > hi {
        return false;
    }
    match step {
        Some(s) => (v - lo) % s == 0,
        None => true,
    }
}

/// Real ranges are inclusive; with a step, membership allows a small
/// relative tolerance so accumulated float error does not drop endpoints.
fn real_range_contains(v: f64, lo: f64, hi: f64, step: Option<f64>) -> bool {
    if v < lo || v > hi {
        return false;
    }
    match step {
        Some(s) => {
            let k = ((v - lo) / s).round();
            k >= 0.0 && (v - (lo + k * s)).abs() <= 1e-9 * v.abs().max(1.0)
        }
        None => true,
    }
}

/// Reinterpret a backtick-quoted item against a numeric field: whitespace
/// separated numbers and `lo:hi[:step]` ranges, negatives allowed.
fn parse_raw_numeric(name: &str, text: &str) -> Result<Vec<Item>, SelectError> {
    let bad = || {
        SelectError::Type(format!(
            "cannot read `{text}` as numbers for field `{name}`"
        ))
    };
    let number = |piece: &str| -> Result<Numeric, SelectError> {
        if let Ok(v) = piece.parse::<i64>() {
            return Ok(Numeric::Int(v));
        }
        piece.parse::<f64>().map(Numeric::Float).map_err(|_| bad())
    };
    let mut items = Vec::new();
    for piece in text.split_whitespace() {
        let parts: Vec<&str> = piece.split(':').collect();
        match parts.as_slice() {
            [single] => items.push(Item::Num(number(single)?)),
            [lo, hi] => items.push(Item::Range {
                lo: number(lo)?,
                hi: number(hi)?,
                step: None,
            }),
            [lo, hi, step] => items.push(Item::Range {
                lo: number(lo)?,
                hi: number(hi)?,
                step: Some(number(step)?),
            }),
            _ => return Err(bad()),
        }
    }
    if items.is_empty() {
        return Err(bad());
    }
    Ok(items)
}

fn scalar_bin(op: BinOp, a: Numeric, b: Numeric) -> Result<Numeric, SelectError> {
    use Numeric::{Float, Int};
    if let (Int(x), Int(y)) = (a, b) {
        return Ok(match op {
            BinOp::Add => Int(x + y),
            BinOp::Sub => Int(x - y),
            BinOp::Mul => Int(x * y),
            BinOp::Div => Float(float_bin(op, x as f64, y as f64)?),
            BinOp::FloorDiv => {
                if y == 0 {
                    return Err(SelectError::DivByZero);
                }
                Int(x.div_euclid(y))
            }
            BinOp::Mod => {
                if y == 0 {
                    return Err(SelectError::DivByZero);
                }
                Int(x.rem_euclid(y))
            }
            BinOp::Pow => {
                if y >= 0 {
                    match u32::try_from(y).ok().and_then(|e| x.checked_pow(e)) {
                        Some(v) => Int(v),
                        None => Float((x as f64).powf(y as f64)),
                    }
                } else {
                    Float((x as f64).powf(y as f64))
                }
            }
        });
    }
    Ok(Float(float_bin(op, a.as_f64(), b.as_f64())?))
}

fn float_bin(op: BinOp, a: f64, b: f64) -> Result<f64, SelectError> {
    Ok(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                f64::NAN
            } else {
                a / b
            }
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(SelectError::DivByZero);
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(SelectError::DivByZero);
            }
            a - b * (a / b).floor()
        }
        BinOp::Pow => a.powf(b),
    })
}

/// Integer-preserving functions stay integer; everything else promotes.
fn apply_fn_scalar(f: MathFn, v: Numeric) -> Result<Numeric, SelectError> {
    if let Numeric::Int(x) = v {
        match f {
            MathFn::Abs => return Ok(Numeric::Int(x.abs())),
            MathFn::Sq => return Ok(Numeric::Int(x * x)),
            MathFn::Floor | MathFn::Ceil => return Ok(Numeric::Int(x)),
            _ => {}
        }
    }
    Ok(Numeric::Float(apply_fn(f, v.as_f64())?))
}

fn apply_fn(f: MathFn, x: f64) -> Result<f64, SelectError> {
    Ok(match f {
        MathFn::Sin => x.sin(),
        MathFn::Cos => x.cos(),
        MathFn::Tan => x.tan(),
        MathFn::Asin => {
            if !(-1.0..=1.0).contains(&x) {
                return Err(SelectError::Domain(format!("asin({x})")));
            }
            x.asin()
        }
        MathFn::Acos => {
            if !(-1.0..=1.0).contains(&x) {
                return Err(SelectError::Domain(format!("acos({x})")));
            }
            x.acos()
        }
        MathFn::Atan => x.atan(),
        MathFn::Sinh => x.sinh(),
        MathFn::Cosh => x.cosh(),
        MathFn::Tanh => x.tanh(),
        MathFn::Exp => x.exp(),
        MathFn::Log => {
            if x <= 0.0 {
                return Err(SelectError::Domain(format!("log({x})")));
            }
            x.ln()
        }
        MathFn::Log10 => {
            if x <= 0.0 {
                return Err(SelectError::Domain(format!("log10({x})")));
            }
            x.log10()
        }
        MathFn::Sqrt => {
            if x < 0.0 {
                return Err(SelectError::Domain(format!("sqrt({x})")));
            }
            x.sqrt()
        }
        MathFn::Sq => x * x,
        MathFn::Abs => x.abs(),
        MathFn::Floor => x.floor(),
        MathFn::Ceil => x.ceil(),
    })
}
