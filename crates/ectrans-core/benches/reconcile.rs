use std::path::Path;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ectrans_core::{ReconcileInput, derive_pre_provenance, generate_pre_placement, reconcile};
use ectrans_solver::SequentialSolver;
use ectrans_types::{ClusterSettings, CodingParams, TransitionApproach};

const NUM_NODES: u16 = 32;
const WORKER_AXIS: [usize; 3] = [1, 2, 4];

fn stripe_axis() -> &'static [u32] {
    let smoke = std::env::var("ECTRANS_BENCH_SMOKE")
        .ok()
        .is_some_and(|value| value != "0");
    if smoke || std::env::var("CI").is_ok() {
        &[1_200]
    } else {
        &[1_200, 12_000]
    }
}

fn bench_reconcile(c: &mut Criterion) {
    let code = CodingParams::new(6, 3, 12, 3);
    let data_dir = Path::new("/data");
    let mut group = c.benchmark_group("reconcile");

    for &num_stripes in stripe_axis() {
        let settings = ClusterSettings::new(NUM_NODES, num_stripes);
        let pre_placement =
            generate_pre_placement(&code, &settings, 0x5EED).expect("pre placement");
        let pre = derive_pre_provenance(&pre_placement, data_dir).expect("pre provenance");
        let (post, groups) = SequentialSolver::plan(
            &code,
            NUM_NODES,
            TransitionApproach::Balanced,
            &pre_placement,
        )
        .expect("plan");
        group.throughput(Throughput::Elements(
            groups.len() as u64 * u64::from(code.n_post()),
        ));

        for workers in WORKER_AXIS {
            let input = ReconcileInput {
                code,
                settings,
                pre: &pre,
                post_placement: &post,
                stripe_groups: &groups,
                data_dir,
                managed_fs: false,
                workers,
            };
            group.bench_with_input(
                BenchmarkId::new(format!("workers_{workers}"), num_stripes),
                &input,
                |b, input| b.iter(|| reconcile(black_box(input)).expect("reconcile")),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_reconcile);
criterion_main!(benches);
