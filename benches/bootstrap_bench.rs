/*
 * ALPHA SOVEREIGN - PINNED THREAD BOOTSTRAP BENCHMARK
 * =================================================================
 * Component Name: benches/bootstrap_bench.rs
 * Core Responsibility: قياس كلفة دورة الحياة الكاملة للخيط المثبت (إنشاء، إقلاع، تخلص).
 * Design Pattern: Latency Measurement
 * Forensic Impact: يثبت أن الانتظار الدوار لا يضيف كلفة ملحوظة فوق إنشاء خيط النظام نفسه.
 * =================================================================
 */

use std::sync::Arc;
use std::time::Duration;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use alpha_affinity::affinity::AffinityMask;
use alpha_affinity::hardware::simulated::SimulatedBackend;
use alpha_affinity::lifecycle::CancellationSignal;
use alpha_affinity::{Affinity, PinnedThread};

fn bench_bootstrap(c: &mut Criterion) {
    let mut group = c.benchmark_group("PinnedThread");
    let backend = Arc::new(SimulatedBackend::with_cpu_count(128));

    // =================================================================
    // 1. دورة كاملة: start حتى الإقلاع ثم dispose حتى التأكيد
    // =================================================================
    group.bench_function("start_dispose_cycle", |b| {
        b.iter(|| {
            let handle: PinnedThread<()> = PinnedThread::with_backend(
                Affinity::from_cores(&[1, 2]),
                Duration::from_millis(250),
                None,
                backend.clone(),
            );
            handle
                .start((), |_, _, signal| {
                    while !signal.is_cancelled() {
                        std::thread::yield_now();
                    }
                    Ok(())
                })
                .unwrap();
            handle.dispose();
            handle.wait_disposed(Some(Duration::from_secs(5))).unwrap();
        })
    });

    // =================================================================
    // 2. رفض القناع الفارغ (يجب ألا يلمس النواة أبداً)
    // =================================================================
    group.bench_function("validation_reject", |b| {
        b.iter_batched(
            || PinnedThread::<()>::with_backend(Affinity::from_words(vec![0, 0]), Duration::from_millis(50), None, backend.clone()),
            |handle| black_box(handle.start((), |_, _, _| Ok(()))).is_err(),
            BatchSize::SmallInput,
        )
    });

    // =================================================================
    // 3. العمليات الصغيرة على المسار الحرج
    // =================================================================
    group.bench_function("mask_mismatch_scan_128_cores", |b| {
        let requested = AffinityMask::from_cores(&(0..128).collect::<Vec<_>>());
        let applied = requested.clone();
        b.iter(|| black_box(requested.first_mismatch(black_box(&applied))))
    });

    group.bench_function("linked_signal_check_depth_3", |b| {
        let root = CancellationSignal::new();
        let leaf = root.child().child();
        b.iter(|| black_box(leaf.is_cancelled()))
    });

    group.finish();
}

criterion_group!(benches, bench_bootstrap);
criterion_main!(benches);
