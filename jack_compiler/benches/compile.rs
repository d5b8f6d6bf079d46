use criterion::{black_box, criterion_group, criterion_main, Criterion};

use jack_compiler::{compile_to, lex::Lexer, CompileConf};

const SOURCE: &str = include_str!("../tests/Point.jack");

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("point lex", |b| {
        b.iter(|| black_box(Lexer::new(black_box(SOURCE)).into_iter().count()))
    });

    {
        let mut out = Vec::with_capacity(4096);

        c.bench_function("point compile", |b| {
            b.iter(|| {
                out.clear();
                out = compile_to(black_box(SOURCE), std::mem::take(&mut out), CompileConf::default())
                    .unwrap();
                black_box(out.len())
            })
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
