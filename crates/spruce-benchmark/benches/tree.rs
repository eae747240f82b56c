use codspeed_criterion_compat::{
    Criterion, Throughput, black_box, criterion_group, criterion_main,
};
use spruce_grammars::arithmetic;
use spruce_tree::{IterMode, Parser as _, TreeCursor};

fn benchmark_tree(c: &mut Criterion) {
    let text = (0..2_000).map(|n| n.to_string()).collect::<Vec<_>>().join("*");
    let tree = arithmetic().unwrap().parse(&text, &[], None).unwrap();

    let mut group = c.benchmark_group("Tree Benchmark");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("cursor_walk", |b| {
        b.iter(|| {
            let mut cursor = tree.cursor();
            let mut count = 0;
            while cursor.next(true) {
                count += 1;
            }
            black_box(count)
        });
    });
    group.bench_function("iterate", |b| {
        b.iter(|| {
            let mut count = 0;
            let enter = |_: &TreeCursor| {
                count += 1;
                true
            };
            tree.iterate(IterMode::empty(), 0, tree.len(), enter, |_| {});
            black_box(count)
        });
    });
    group.bench_function("resolve", |b| {
        b.iter(|| {
            for pos in (0..tree.len()).step_by(97) {
                black_box(tree.resolve_inner(pos, 1));
            }
        });
    });
    group.finish();
}

criterion_group!(benches, benchmark_tree);
criterion_main!(benches);
