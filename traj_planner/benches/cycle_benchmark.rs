//! Hot-path benchmark: one control cycle of the planner with a queued
//! program, including blended corners.

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use traj_planner::{EnableFlags, MotionClass, MotionIo, TermCond, TrajectoryPlanner};
use traj_posemath::{Cart, Pose};

struct NullIo;

impl MotionIo for NullIo {
    fn dio_write(&mut self, _index: usize, _value: bool) {}
    fn aio_write(&mut self, _index: usize, _value: f64) {}
    fn set_rotary_unlock(&mut self, _axis: i32, _unlock: bool) {}
    fn rotary_is_unlocked(&self, _axis: i32) -> bool {
        true
    }
}

fn xyz(x: f64, y: f64, z: f64) -> Pose {
    Pose::from_triplets(Cart::new(x, y, z), Cart::zeros(), Cart::zeros())
}

fn build_planner() -> TrajectoryPlanner {
    let mut tp: TrajectoryPlanner = TrajectoryPlanner::new();
    tp.set_cycle_time(0.001).unwrap();
    tp.set_vmax(50.0, 50.0).unwrap();
    tp.set_vlimit(100.0);
    tp.set_amax(500.0).unwrap();
    tp.set_term_cond(TermCond::Parabolic, 0.1);
    tp.set_pos(Pose::ZERO);

    // Zigzag with blendable corners.
    for i in 0..10 {
        let x = (i + 1) as f64 * 10.0;
        let y = if i % 2 == 0 { 10.0 } else { 0.0 };
        tp.add_line(
            xyz(x, y, 0.0),
            MotionClass::Feed,
            40.0,
            50.0,
            500.0,
            EnableFlags::default(),
            false,
            -1,
        )
        .unwrap();
    }
    tp
}

fn bench_run_cycle(c: &mut Criterion) {
    c.bench_function("run_cycle_1000", |b| {
        b.iter_batched(
            build_planner,
            |mut tp| {
                let mut io = NullIo;
                for _ in 0..1000 {
                    tp.run_cycle(&mut io);
                }
                black_box(tp.pos());
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_enqueue_with_blend(c: &mut Criterion) {
    c.bench_function("add_line_with_blend", |b| {
        b.iter_batched(
            || {
                let mut tp: TrajectoryPlanner = TrajectoryPlanner::new();
                tp.set_cycle_time(0.001).unwrap();
                tp.set_vmax(50.0, 50.0).unwrap();
                tp.set_amax(500.0).unwrap();
                tp.set_term_cond(TermCond::Parabolic, 0.1);
                tp.set_pos(Pose::ZERO);
                tp.add_line(
                    xyz(10.0, 0.0, 0.0),
                    MotionClass::Feed,
                    40.0,
                    50.0,
                    500.0,
                    EnableFlags::default(),
                    false,
                    -1,
                )
                .unwrap();
                tp
            },
            |mut tp| {
                tp.add_line(
                    xyz(10.0, 10.0, 0.0),
                    MotionClass::Feed,
                    40.0,
                    50.0,
                    500.0,
                    EnableFlags::default(),
                    false,
                    -1,
                )
                .unwrap();
                black_box(tp.queue_depth());
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_run_cycle, bench_enqueue_with_blend);
criterion_main!(benches);
