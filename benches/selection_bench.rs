//! Criterion benchmarks for query parsing and evaluation.
//!
//! Uses a synthetic solvated-peptide context to benchmark the parser, macro
//! expansion, and each evaluator sub-engine independently.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use molselect::MolecularContext;

/// Build a synthetic context: `n_residues` five-atom peptide residues on a
/// loose helix, then one water for every two peptide residues scattered
/// around it. Bonds chain the peptide atoms so bonded selections work.
fn build_context(n_residues: usize) -> MolecularContext {
    let atoms_per_res = 5;
    let names = ["N", "CA", "C", "O", "CB"];
    let resnames = ["ALA", "LEU", "GLY", "LYS", "SER"];
    let n_peptide = n_residues * atoms_per_res;
    let n_waters = n_residues / 2;
    let n_atoms = n_peptide + n_waters * 3;

    let mut name = Vec::with_capacity(n_atoms);
    let mut resname = Vec::with_capacity(n_atoms);
    let mut resid = Vec::with_capacity(n_atoms);
    let mut chain = Vec::with_capacity(n_atoms);
    let mut mass = Vec::with_capacity(n_atoms);
    let mut coords = Vec::with_capacity(n_atoms);
    let mut bonds = Vec::new();

    for res in 0..n_residues {
        for a in 0..atoms_per_res {
            let i = res * atoms_per_res + a;
            name.push(names[a]);
            resname.push(resnames[res % resnames.len()]);
            resid.push(res as i64 + 1);
            chain.push("A");
            mass.push(if a == 3 { 16.0 } else { 12.0 });
            let t = i as f64;
            let angle = t * 0.4;
            coords.push([5.0 * angle.cos(), 5.0 * angle.sin(), t * 1.5]);
            if a > 0 {
                bonds.push((i - 1, i));
            }
        }
        if res + 1 < n_residues {
            bonds.push((res * atoms_per_res + 2, (res + 1) * atoms_per_res));
        }
    }
    for w in 0..n_waters {
        for a in 0..3 {
            let i = n_peptide + w * 3 + a;
            name.push(if a == 0 { "OH2" } else { "H1" });
            resname.push("HOH");
            resid.push(w as i64 + 1);
            chain.push("W");
            mass.push(if a == 0 { 16.0 } else { 1.0 });
            let t = i as f64;
            coords.push([12.0 * (t * 0.7).cos(), 12.0 * (t * 0.7).sin(), (w as f64) * 3.0]);
            if a > 0 {
                bonds.push((n_peptide + w * 3, i));
            }
        }
    }

    MolecularContext::builder(n_atoms)
        .str_column("name", &name)
        .str_column("resname", &resname)
        .int_column("resid", &resid)
        .str_column("chain", &chain)
        .float_column("mass", &mass)
        .coords(&coords)
        .bonds(&bonds)
        .build()
        .unwrap()
}

fn bench_parse(c: &mut Criterion) {
    let grammar = molselect::builtin_grammar().unwrap();
    let mut group = c.benchmark_group("parse");
    for (label, query) in [
        ("simple", "name CA"),
        ("macro", "protein and not backbone"),
        ("math", "sqrt(x**2 + y**2 + z**2) < 15"),
        ("mixed", "(water or protein) and mass > 12 and resid 1 to 50"),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(label), query, |b, q| {
            b.iter(|| grammar.parse(black_box(q)).unwrap());
        });
    }
    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let grammar = molselect::builtin_grammar().unwrap();
    let mut group = c.benchmark_group("evaluate");
    for &n_residues in &[100usize, 1000] {
        let ctx = build_context(n_residues);
        let label = format!("{}atoms", ctx.n_atoms());
        for (kind, query) in [
            ("property", "name CA"),
            ("macro", "protein and name CA"),
            ("compare", "mass > 12 and x < 0"),
            ("within", "within 5.0 of water"),
            ("bonded", "bonded 2 to name CA"),
            ("same", "same residue as name O"),
        ] {
            let node = grammar.parse(query).unwrap();
            group.bench_with_input(
                BenchmarkId::new(kind, &label),
                &(&node, &ctx),
                |b, (node, ctx)| {
                    b.iter(|| molselect::evaluate(black_box(node), ctx).unwrap());
                },
            );
        }
    }
    group.finish();
}

fn bench_spatial_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("spatial_index");
    for &n_residues in &[100usize, 1000] {
        let grammar = molselect::builtin_grammar().unwrap();
        let node = grammar.parse("within 5.0 of water").unwrap();
        let label = format!("{}atoms", build_context(n_residues).n_atoms());
        group.bench_with_input(
            BenchmarkId::new("first_within", &label),
            &n_residues,
            |b, &n| {
                // Rebuild the context each iteration so the lazy index build
                // is included in the measurement.
                b.iter(|| {
                    let ctx = build_context(n);
                    molselect::evaluate(black_box(&node), &ctx).unwrap()
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_evaluate, bench_spatial_index_build);
criterion_main!(benches);
