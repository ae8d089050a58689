use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mython::runtime::StringContext;
use mython::{interpreter, lexer, parser};

const WORKLOADS: [(&str, &str); 2] = [
    ("fib", "tests/programs/bench_fib/program.my"),
    ("factorial", "tests/programs/recursion/program.my"),
];

fn bench_interpreter(c: &mut Criterion) {
    for (label, path) in WORKLOADS {
        let source =
            std::fs::read_to_string(path).unwrap_or_else(|err| panic!("read {path}: {err}"));
        let tokens = lexer::tokenize(&source).expect("tokenize");
        let program = parser::parse_tokens(tokens.clone()).expect("parse");

        c.bench_function(&format!("tokenize_{label}"), |b| {
            b.iter(|| {
                let out = lexer::tokenize(black_box(&source)).expect("tokenize");
                black_box(out);
            })
        });

        c.bench_function(&format!("parse_{label}"), |b| {
            b.iter(|| {
                let out = parser::parse_tokens(black_box(tokens.clone())).expect("parse");
                black_box(out);
            })
        });

        c.bench_function(&format!("run_{label}"), |b| {
            b.iter(|| {
                let mut context = StringContext::new();
                interpreter::run_program(black_box(&program), &mut context).expect("run");
                black_box(context.into_output());
            })
        });
    }
}

criterion_group!(benches, bench_interpreter);
criterion_main!(benches);
