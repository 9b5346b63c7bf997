use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modloader::{CompletionOrder, Loader, ScriptHost};
use std::rc::Rc;

/// Register `count` leaf scripts `m0.js` .. `m{count-1}.js`.
fn leaf_scripts(host: &ScriptHost<u64>, count: usize) {
    for i in 0..count {
        let name = format!("m{}", i);
        host.register(format!("{}.js", name), move |loader: &Loader<u64>| {
            let _ = loader.define(&name, Vec::<String>::new(), move |_| Ok(Some(i as u64)));
        });
    }
}

/// Register a chain where `m{i}` depends on `m{i+1}` and the last is a leaf.
fn chain_scripts(host: &ScriptHost<u64>, depth: usize) {
    for i in 0..depth {
        let name = format!("m{}", i);
        let deps: Vec<String> = if i + 1 < depth {
            vec![format!("m{}", i + 1)]
        } else {
            Vec::new()
        };
        host.register(format!("{}.js", name), move |loader: &Loader<u64>| {
            let _ = loader.define(&name, deps.clone(), |args: Vec<u64>| {
                Ok(Some(args.first().copied().unwrap_or(0) + 1))
            });
        });
    }
}

/// One task requiring N independent modules, fetched in both orders.
fn bench_wide_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("wide_graph");

    for width in [10usize, 100, 1000].iter() {
        let names: Vec<String> = (0..*width).map(|i| format!("m{}", i)).collect();

        for order in [CompletionOrder::Fifo, CompletionOrder::Lifo] {
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", order).to_lowercase(), width),
                width,
                |b, &width| {
                    b.iter(|| {
                        let host: Rc<ScriptHost<u64>> = Rc::new(ScriptHost::new());
                        leaf_scripts(&host, width);
                        let loader = Loader::new("", host.clone());
                        loader.require(names.clone(), |values| {
                            black_box(values);
                        });
                        host.run_to_idle(order);
                        black_box(loader.module_count());
                    });
                },
            );
        }
    }

    group.finish();
}

/// A single chain of N modules, each waiting on the next.
fn bench_deep_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_graph");

    for depth in [10usize, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("chain", depth), depth, |b, &depth| {
            b.iter(|| {
                let host: Rc<ScriptHost<u64>> = Rc::new(ScriptHost::new());
                chain_scripts(&host, depth);
                let loader = Loader::new("", host.clone());
                loader.require(["m0"], |values| {
                    black_box(values);
                });
                host.run_to_idle(CompletionOrder::Lifo);
                black_box(loader.export("m0"));
            });
        });
    }

    group.finish();
}

/// Zero-dependency definitions that resolve without any fetch.
fn bench_local_definitions(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_definitions");

    for count in [100usize, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("define", count), count, |b, &count| {
            b.iter(|| {
                let loader: Loader<u64> = Loader::new("", ScriptHost::new());
                for i in 0..count {
                    let _ = loader.define(&format!("m{}", i), Vec::<String>::new(), move |_| {
                        Ok(Some(i as u64))
                    });
                }
                black_box(loader.module_count());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_wide_graph,
    bench_deep_graph,
    bench_local_definitions
);
criterion_main!(benches);
