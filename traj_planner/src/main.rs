//! Offline demonstration harness.
//!
//! Runs a canned rectangular program through the planner at the configured
//! feed and prints a motion summary. Useful for eyeballing blend behavior
//! and cycle counts without a motion controller attached; turn on
//! `RUST_LOG=traj_planner=debug` to watch segment lifecycle events.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use traj_planner::{EnableFlags, MotionClass, MotionIo, TermCond, TpError, TrajectoryPlanner};
use traj_posemath::{Cart, Pose};

#[derive(Parser, Debug)]
#[command(name = "traj_planner", about = "Run a canned program through the trajectory planner")]
struct Args {
    /// Control period [s].
    #[arg(long, default_value_t = 0.001)]
    cycle_time: f64,

    /// Feed velocity [user units/s].
    #[arg(long, default_value_t = 20.0)]
    vel: f64,

    /// Acceleration limit [user units/s²].
    #[arg(long, default_value_t = 200.0)]
    accel: f64,

    /// Blend tolerance [user units].
    #[arg(long, default_value_t = 0.1)]
    tolerance: f64,

    /// Side length of the rectangle [user units].
    #[arg(long, default_value_t = 50.0)]
    side: f64,

    /// Print a pose sample every N cycles (0 = summary only).
    #[arg(long, default_value_t = 0)]
    sample_every: u64,
}

/// Host stub: logs synchronized outputs, keeps rotary axes unlocked.
struct LogIo;

impl MotionIo for LogIo {
    fn dio_write(&mut self, index: usize, value: bool) {
        tracing::info!(index, value, "synced digital output");
    }
    fn aio_write(&mut self, index: usize, value: f64) {
        tracing::info!(index, value, "synced analog output");
    }
    fn set_rotary_unlock(&mut self, _axis: i32, _unlock: bool) {}
    fn rotary_is_unlocked(&self, _axis: i32) -> bool {
        true
    }
}

fn xyz(x: f64, y: f64, z: f64) -> Pose {
    Pose::from_triplets(Cart::new(x, y, z), Cart::zeros(), Cart::zeros())
}

fn main() -> Result<(), TpError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let mut tp: TrajectoryPlanner = TrajectoryPlanner::new();
    tp.set_cycle_time(args.cycle_time)?;
    tp.set_vmax(args.vel, args.vel)?;
    tp.set_vlimit(args.vel * 2.0);
    tp.set_amax(args.accel)?;
    tp.set_term_cond(TermCond::Parabolic, args.tolerance);
    tp.set_pos(Pose::ZERO);

    let s = args.side;
    for corner in [
        xyz(s, 0.0, 0.0),
        xyz(s, s, 0.0),
        xyz(0.0, s, 0.0),
        xyz(0.0, 0.0, 0.0),
    ] {
        tp.add_line(
            corner,
            MotionClass::Feed,
            args.vel,
            args.vel,
            args.accel,
            EnableFlags::default(),
            false,
            -1,
        )?;
    }
    tracing::info!(depth = tp.queue_depth(), "program queued");

    let mut io = LogIo;
    let mut cycles: u64 = 0;
    let mut peak_vel: f64 = 0.0;
    while !tp.is_done() {
        tp.run_cycle(&mut io);
        cycles += 1;
        peak_vel = peak_vel.max(tp.status().current_vel);

        if args.sample_every > 0 && cycles % args.sample_every == 0 {
            let p = tp.pos();
            println!(
                "t={:8.3}s  x={:9.4}  y={:9.4}  v={:7.3}  seg={}",
                cycles as f64 * args.cycle_time,
                p.tran.x,
                p.tran.y,
                tp.status().current_vel,
                tp.exec_id(),
            );
        }
        if cycles > 100_000_000 {
            eprintln!("giving up, planner did not finish");
            break;
        }
    }

    let p = tp.pos();
    println!(
        "finished in {cycles} cycles ({:.3} s): pos = ({:.6}, {:.6}, {:.6}), peak vel = {:.3}",
        cycles as f64 * args.cycle_time,
        p.tran.x,
        p.tran.y,
        p.tran.z,
        peak_vel
    );
    Ok(())
}
