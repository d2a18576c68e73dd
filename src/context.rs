//! Read-only molecular snapshot the evaluator runs against.
//!
//! A [`MolecularContext`] bundles typed per-atom columns, optional bond
//! topology, derived group ids (residue/chain/segment/fragment/model),
//! per-chain residue sequences, and caller-supplied `$variables`. It is
//! immutable during evaluation; the only interior state is the lazily-built
//! spatial index, initialized once behind a lock so concurrent evaluations
//! can share it.

use std::sync::OnceLock;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::error::SelectError;
use crate::spatial::KdTree;

/// A typed per-atom column.
#[derive(Debug, Clone)]
pub enum Column {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A caller-supplied query variable, referenced as `$name`.
#[derive(Debug, Clone)]
pub enum Variable {
    Scalar(f64),
    Vector(Vec<f64>),
}

/// The grouping dimensions understood by `same ... as`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Residue,
    Chain,
    Segment,
    Fragment,
    Model,
}

impl GroupKind {
    pub fn from_keyword(name: &str) -> Option<GroupKind> {
        Some(match name {
            "residue" => GroupKind::Residue,
            "chain" => GroupKind::Chain,
            "segment" => GroupKind::Segment,
            "fragment" => GroupKind::Fragment,
            "model" => GroupKind::Model,
            _ => return None,
        })
    }
}

/// One chain's residues in order, with their one-letter sequence codes.
#[derive(Debug, Clone)]
pub struct ChainSequence {
    pub chain: String,
    /// One code per residue, in chain order.
    pub codes: String,
    /// Residue group id per position in `codes`.
    pub residues: Vec<usize>,
}

/// One-letter code for a residue name; unknown residues map to `X`.
pub fn one_letter_code(resname: &str) -> char {
    match resname.trim() {
        "ALA" => 'A',
        "ARG" => 'R',
        "ASN" => 'N',
        "ASP" => 'D',
        "CYS" => 'C',
        "GLN" => 'Q',
        "GLU" => 'E',
        "GLY" => 'G',
        "HIS" => 'H',
        "ILE" => 'I',
        "LEU" => 'L',
        "LYS" => 'K',
        "MET" => 'M',
        "PHE" => 'F',
        "PRO" => 'P',
        "SER" => 'S',
        "THR" => 'T',
        "TRP" => 'W',
        "TYR" => 'Y',
        "VAL" => 'V',
        _ => 'X',
    }
}

/// Read-only bundle of atom columns, topology, groupings, and variables.
#[derive(Debug)]
pub struct MolecularContext {
    n_atoms: usize,
    columns: FxHashMap<String, Column>,
    neighbors: Option<Vec<Vec<usize>>>,
    residue_group: Option<Vec<usize>>,
    chain_group: Option<Vec<usize>>,
    segment_group: Option<Vec<usize>>,
    fragment_group: Option<Vec<usize>>,
    model_group: Option<Vec<usize>>,
    chains: Option<Vec<ChainSequence>>,
    variables: FxHashMap<String, Variable>,
    kdtree: OnceLock<KdTree>,
}

impl MolecularContext {
    pub fn builder(n_atoms: usize) -> ContextBuilder {
        ContextBuilder {
            n_atoms,
            columns: FxHashMap::default(),
            bonds: None,
        }
    }

    pub fn n_atoms(&self) -> usize {
        self.n_atoms
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn neighbors(&self) -> Option<&[Vec<usize>]> {
        self.neighbors.as_deref()
    }

    /// Per-atom group ids for a grouping dimension, if derivable from the
    /// supplied columns (and bonds, for fragments).
    pub fn group_ids(&self, kind: GroupKind) -> Option<&[usize]> {
        match kind {
            GroupKind::Residue => self.residue_group.as_deref(),
            GroupKind::Chain => self.chain_group.as_deref(),
            GroupKind::Segment => self.segment_group.as_deref(),
            GroupKind::Fragment => self.fragment_group.as_deref(),
            GroupKind::Model => self.model_group.as_deref(),
        }
    }

    /// Per-chain residue sequences; `None` when resid or resname are absent.
    pub fn chains(&self) -> Option<&[ChainSequence]> {
        self.chains.as_deref()
    }

    /// Bind a `$variable` for subsequent evaluations. A vector variable must
    /// have one entry per atom.
    pub fn set_variable(
        &mut self,
        name: impl Into<String>,
        value: Variable,
    ) -> Result<(), SelectError> {
        if let Variable::Vector(v) = &value {
            if v.len() != self.n_atoms {
                return Err(SelectError::Context(format!(
                    "variable vector length {} does not match atom count {}",
                    v.len(),
                    self.n_atoms
                )));
            }
        }
        self.variables.insert(name.into(), value);
        Ok(())
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// The spatial index over `(x, y, z)`, built on first use and shared by
    /// every later query against this context.
    pub fn kdtree(&self) -> Result<&KdTree, SelectError> {
        for axis in ["x", "y", "z"] {
            match self.columns.get(axis) {
                Some(Column::Float(_)) | Some(Column::Int(_)) => {}
                _ => return Err(SelectError::UnknownField(axis.to_string())),
            }
        }
        Ok(self.kdtree.get_or_init(|| {
            let points: Vec<[f64; 3]> = (0..self.n_atoms)
                .map(|i| [self.coord("x", i), self.coord("y", i), self.coord("z", i)])
                .collect();
            debug!(atoms = self.n_atoms, "building spatial index");
            KdTree::build(points)
        }))
    }

    fn coord(&self, axis: &str, i: usize) -> f64 {
        match &self.columns[axis] {
            Column::Float(v) => v[i],
            Column::Int(v) => v[i] as f64,
            Column::Str(_) => unreachable!(),
        }
    }
}

/// Builder that validates the snapshot invariants and derives groupings.
pub struct ContextBuilder {
    n_atoms: usize,
    columns: FxHashMap<String, Column>,
    bonds: Option<Vec<(usize, usize)>>,
}

impl ContextBuilder {
    pub fn column(mut self, name: impl Into<String>, column: Column) -> Self {
        self.columns.insert(name.into(), column);
        self
    }

    pub fn int_column(self, name: impl Into<String>, values: &[i64]) -> Self {
        self.column(name, Column::Int(values.to_vec()))
    }

    pub fn float_column(self, name: impl Into<String>, values: &[f64]) -> Self {
        self.column(name, Column::Float(values.to_vec()))
    }

    pub fn str_column(self, name: impl Into<String>, values: &[&str]) -> Self {
        self.column(
            name,
            Column::Str(values.iter().map(|s| s.to_string()).collect()),
        )
    }

    /// Set the `x`, `y`, `z` columns from packed coordinates.
    pub fn coords(self, coords: &[[f64; 3]]) -> Self {
        let xs: Vec<f64> = coords.iter().map(|c| c[0]).collect();
        let ys: Vec<f64> = coords.iter().map(|c| c[1]).collect();
        let zs: Vec<f64> = coords.iter().map(|c| c[2]).collect();
        self.column("x", Column::Float(xs))
            .column("y", Column::Float(ys))
            .column("z", Column::Float(zs))
    }

    /// Undirected bond pairs; the symmetric neighbor lists are built here.
    pub fn bonds(mut self, pairs: &[(usize, usize)]) -> Self {
        self.bonds = Some(pairs.to_vec());
        self
    }

    pub fn build(self) -> Result<MolecularContext, SelectError> {
        let n = self.n_atoms;
        for (name, col) in &self.columns {
            if col.len() != n {
                return Err(SelectError::Context(format!(
                    "column `{name}` has length {} but the context has {n} atoms",
                    col.len()
                )));
            }
        }

        let neighbors = match &self.bonds {
            None => None,
            Some(pairs) => {
                let mut lists: Vec<Vec<usize>> = vec![Vec::new(); n];
                for &(i, j) in pairs {
                    if i >= n || j >= n {
                        return Err(SelectError::Context(format!(
                            "bond ({i}, {j}) is out of range for {n} atoms"
                        )));
                    }
                    if i == j {
                        return Err(SelectError::Context(format!("atom {i} bonded to itself")));
                    }
                    if !lists[i].contains(&j) {
                        lists[i].push(j);
                        lists[j].push(i);
                    }
                }
                Some(lists)
            }
        };

        let chain_group = group_by_column(self.columns.get("chain"), n);
        let segment_group = group_by_column(self.columns.get("segment"), n);
        let model_group = group_by_column(self.columns.get("model"), n);

        let residue_group = self.derive_residue_groups(n);
        let fragment_group = match group_by_column(self.columns.get("fragment"), n) {
            Some(groups) => Some(groups),
            None => neighbors.as_ref().map(|lists| connected_components(lists)),
        };

        let chains = self.derive_chains(n, residue_group.as_deref());

        Ok(MolecularContext {
            n_atoms: n,
            columns: self.columns,
            neighbors,
            residue_group,
            chain_group,
            segment_group,
            fragment_group,
            model_group,
            chains,
            variables: FxHashMap::default(),
            kdtree: OnceLock::new(),
        })
    }

    /// Residues are runs of atoms sharing a (chain, resid, icode) triple;
    /// group ids follow first appearance in atom order.
    fn derive_residue_groups(&self, n: usize) -> Option<Vec<usize>> {
        let resid = match self.columns.get("resid") {
            Some(Column::Int(v)) => v,
            _ => return None,
        };
        let chain = match self.columns.get("chain") {
            Some(Column::Str(v)) => Some(v),
            _ => None,
        };
        let icode = match self.columns.get("icode") {
            Some(Column::Str(v)) => Some(v),
            _ => None,
        };
        let mut seen: FxHashMap<(Option<&str>, i64, Option<&str>), usize> = FxHashMap::default();
        let mut groups = Vec::with_capacity(n);
        for i in 0..n {
            let key = (
                chain.map(|c| c[i].as_str()),
                resid[i],
                icode.map(|c| c[i].as_str()),
            );
            let next = seen.len();
            groups.push(*seen.entry(key).or_insert(next));
        }
        Some(groups)
    }

    fn derive_chains(&self, n: usize, residue_group: Option<&[usize]>) -> Option<Vec<ChainSequence>> {
        let residue_group = residue_group?;
        let resname = match self.columns.get("resname") {
            Some(Column::Str(v)) => v,
            _ => return None,
        };
        let chain = match self.columns.get("chain") {
            Some(Column::Str(v)) => Some(v),
            _ => None,
        };
        let mut chains: Vec<ChainSequence> = Vec::new();
        let mut seen_residues: FxHashSet<usize> = FxHashSet::default();
        for i in 0..n {
            let chain_id = chain.map_or("", |c| c[i].as_str());
            if chains.last().map(|c| c.chain.as_str()) != Some(chain_id) {
                chains.push(ChainSequence {
                    chain: chain_id.to_string(),
                    codes: String::new(),
                    residues: Vec::new(),
                });
            }
            let group = residue_group[i];
            if seen_residues.insert(group) {
                let current = chains.last_mut().unwrap();
                current.codes.push(one_letter_code(&resname[i]));
                current.residues.push(group);
            }
        }
        Some(chains)
    }
}

/// Group atoms by equal column values, ids in first-appearance order.
fn group_by_column(column: Option<&Column>, n: usize) -> Option<Vec<usize>> {
    let column = column?;
    let mut groups = Vec::with_capacity(n);
    match column {
        Column::Str(values) => {
            let mut seen: FxHashMap<&str, usize> = FxHashMap::default();
            for v in values {
                let next = seen.len();
                groups.push(*seen.entry(v.as_str()).or_insert(next));
            }
        }
        Column::Int(values) => {
            let mut seen: FxHashMap<i64, usize> = FxHashMap::default();
            for &v in values {
                let next = seen.len();
                groups.push(*seen.entry(v).or_insert(next));
            }
        }
        Column::Float(_) => return None,
    }
    Some(groups)
}

/// Connected components of the bond graph, for fragment ids.
fn connected_components(neighbors: &[Vec<usize>]) -> Vec<usize> {
    let n = neighbors.len();
    let mut component = vec![usize::MAX; n];
    let mut next = 0;
    let mut queue = std::collections::VecDeque::new();
    for start in 0..n {
        if component[start] != usize::MAX {
            continue;
        }
        component[start] = next;
        queue.push_back(start);
        while let Some(i) = queue.pop_front() {
            for &j in &neighbors[i] {
                if component[j] == usize::MAX {
                    component[j] = next;
                    queue.push_back(j);
                }
            }
        }
        next += 1;
    }
    component
}
