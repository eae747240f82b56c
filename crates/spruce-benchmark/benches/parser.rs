use std::hint::black_box;

use codspeed_criterion_compat::{
    BenchmarkId, Criterion, Throughput, criterion_group, criterion_main,
};
use spruce_grammars::{arithmetic, template_with_expressions};
use spruce_tree::{ChangedRange, Parser as _, TreeFragment};

fn sum(terms: usize) -> String {
    (0..terms).map(|n| format!("{n} * \"s{n}\"")).collect::<Vec<_>>().join(" + ")
}

fn benchmark_parser(c: &mut Criterion) {
    let parser = arithmetic().unwrap();
    let broken = sum(500).replace('*', "**");
    let inputs = [("Small", sum(10)), ("Large", sum(2_000)), ("Broken", broken)];

    let mut group = c.benchmark_group("Parser Benchmark");
    for (name, text) in &inputs {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("parse", name), text, |b, text| {
            b.iter(|| black_box(parser.parse(text, &[], None).unwrap()));
        });
    }
    group.finish();
}

fn benchmark_incremental(c: &mut Criterion) {
    let parser = arithmetic().unwrap();
    let text = sum(2_000);
    let tree = parser.parse(&text, &[], None).unwrap();
    let middle = (text.len() / 2) as u32;
    let edited = format!("{}7{}", &text[..middle as usize], &text[middle as usize..]);
    let change = ChangedRange { from_a: middle, to_a: middle, from_b: middle, to_b: middle + 1 };
    let fragments = TreeFragment::add_tree(&tree, &[], false);
    let fragments = TreeFragment::apply_changes(&fragments, &[change], 128);

    let mut group = c.benchmark_group("Incremental Benchmark");
    group.throughput(Throughput::Bytes(edited.len() as u64));
    group.bench_function("reparse_after_insert", |b| {
        b.iter(|| black_box(parser.parse(&edited, &fragments, None).unwrap()));
    });
    group.finish();
}

fn benchmark_mixed(c: &mut Criterion) {
    let parser = template_with_expressions().unwrap();
    let text = (0..500).map(|n| format!("item {n} costs {{{n} * 3 + 1}} ")).collect::<String>();

    let mut group = c.benchmark_group("Mixed Benchmark");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("template", |b| {
        b.iter(|| black_box(parser.parse(&text, &[], None).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, benchmark_parser, benchmark_incremental, benchmark_mixed);
criterion_main!(benches);
