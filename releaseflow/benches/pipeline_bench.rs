//! Benchmarks for graph construction and execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use releaseflow::engine::PipelineEngine;
use releaseflow::testing::{noop_registry, release_config, release_pipeline};

fn pipeline_benchmark(c: &mut Criterion) {
    let config = release_config();

    c.bench_function("build_reference_topology", |b| {
        b.iter(|| black_box(release_pipeline(&config)))
    });

    c.bench_function("topological_order", |b| {
        let graph = release_pipeline(&config);
        b.iter(|| black_box(graph.topological_order().unwrap()))
    });

    c.bench_function("run_linear_pipeline", |b| {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        b.iter(|| {
            runtime.block_on(async {
                use releaseflow::core::{ActionSpec, StageKind};
                use releaseflow::pipeline::{PipelineBuilder, StageSpec};

                let graph = PipelineBuilder::new("bench")
                    .stage(
                        StageSpec::new("Source", StageKind::Source).with_action(
                            ActionSpec::new("Pull", "source").with_output("sourceOut"),
                        ),
                    )
                    .unwrap()
                    .stage(
                        StageSpec::new("Build", StageKind::Build).with_action(
                            ActionSpec::new("Compile", "codebuild")
                                .with_input("sourceOut")
                                .with_output("buildOut"),
                        ),
                    )
                    .unwrap()
                    .build()
                    .unwrap();

                let engine =
                    PipelineEngine::new(graph).with_executors(noop_registry());
                black_box(engine.run().await.unwrap())
            })
        })
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
