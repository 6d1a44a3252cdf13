//! Motion segment data model.
//!
//! A segment is one geometric primitive in the queue: a coordinated line
//! across the xyz/abc/uvw subspaces, a circular or helical arc, or a
//! rigid-tapping cycle. All per-segment profile state (progress along the
//! path, current velocity, blend bookkeeping) lives here; the executor
//! mutates it in place each cycle.

use traj_posemath::{Cart, Circle, Line, Pose};

use crate::state::{EnableFlags, MotionClass, SyncMode, TapState, TermCond};
use crate::sync_io::SyncIo;

/// Motion id assigned at enqueue time. Non-negative for queued segments.
pub type SegmentId = i32;

/// Subspace lines of a coordinated linear move, sharing one length
/// parameter.
#[derive(Debug, Clone, Copy)]
pub struct LineCoords {
    pub xyz: Line,
    pub abc: Line,
    pub uvw: Line,
}

/// Circular/helical xyz motion with linearly interpolated abc/uvw.
#[derive(Debug, Clone, Copy)]
pub struct CircleCoords {
    pub xyz: Circle,
    pub abc: Line,
    pub uvw: Line,
}

/// Rigid-tap geometry and reversal bookkeeping.
///
/// The primary line runs from the start point to the programmed depth; the
/// auxiliary line is rebuilt at each spindle reversal to point back at the
/// start. The abc/uvw axes hold still for the whole cycle.
#[derive(Debug, Clone, Copy)]
pub struct RigidTapCoords {
    pub xyz: Line,
    pub aux_xyz: Line,
    pub abc: Cart,
    pub uvw: Cart,
    pub state: TapState,
    /// Progress at which the next spindle reversal is commanded.
    pub reversal_target: f64,
    /// Spindle position when the retract began [rev].
    pub spindle_revs_at_reversal: f64,
    /// Last signed spindle position sample [rev].
    pub last_spindle_pos: f64,
    /// Consecutive monotonic samples seen while waiting for a reversal.
    pub reversal_samples: u8,
}

/// Geometry payload, discriminated by motion type.
#[derive(Debug, Clone, Copy)]
pub enum SegmentGeometry {
    Line(LineCoords),
    Circular(CircleCoords),
    RigidTap(RigidTapCoords),
}

/// One queued motion primitive.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub id: SegmentId,
    /// Classification reported upward while this segment executes.
    pub motion_class: MotionClass,
    pub geometry: SegmentGeometry,

    // Kinematic limits.
    /// Velocity ceiling [user units/s].
    pub max_vel: f64,
    /// Acceleration ceiling [user units/s²].
    pub max_accel: f64,
    /// Derates `max_accel` when acceleration is reserved for blending.
    pub accel_scale: f64,

    // Profile state.
    /// Host-requested velocity [user units/s]; rewritten by spindle sync.
    pub req_vel: f64,
    /// Allowed velocity at the end of the segment [user units/s].
    pub final_vel: f64,
    /// Velocity at the last cycle [user units/s].
    pub current_vel: f64,
    /// Total path length [user units].
    pub target: f64,
    /// Path length traversed so far [user units].
    pub progress: f64,
    /// Control period [s].
    pub cycle_time: f64,
    /// Velocity when the final deceleration began; the parabolic overlap
    /// complements against this.
    pub vel_at_blend_start: f64,
    /// Velocity below which the parabolic overlap may start.
    pub blend_vel: f64,

    // Flags.
    pub active: bool,
    pub blending: bool,
    /// Rising-tide pass found this segment velocity-limited.
    pub at_peak: bool,
    /// Wait for the spindle to reach commanded speed before starting.
    pub at_speed: bool,
    /// The last cycle was on the deceleration ramp to `final_vel`.
    pub on_final_decel: bool,
    /// Cycle counter while catching up to the spindle at sync start;
    /// zero once locked.
    pub sync_accel: u32,

    // Termination.
    pub term_cond: TermCond,
    pub tolerance: f64,

    // Spindle sync.
    pub synchronized: SyncMode,
    /// Feed per spindle revolution [user units/rev].
    pub uu_per_rev: f64,

    // Synchronized I/O.
    pub sync_io: SyncIo,
    pub enables: EnableFlags,
    /// Rotary axis to unlock for this move, or -1.
    pub index_rotary: i32,
}

impl Segment {
    /// Common initialization shared by all motion types.
    ///
    /// The requested velocity is capped by `ini_maxvel` here once, since
    /// `max_vel` never grows for a given segment.
    fn new_common(
        cycle_time: f64,
        vel: f64,
        ini_maxvel: f64,
        acc: f64,
        enables: EnableFlags,
        geometry: SegmentGeometry,
    ) -> Self {
        Self {
            id: -1,
            motion_class: MotionClass::None,
            geometry,
            max_vel: ini_maxvel,
            max_accel: acc,
            accel_scale: 1.0,
            req_vel: vel.min(ini_maxvel),
            final_vel: 0.0,
            current_vel: 0.0,
            target: 0.0,
            progress: 0.0,
            cycle_time,
            vel_at_blend_start: 0.0,
            blend_vel: 0.0,
            active: false,
            blending: false,
            at_peak: false,
            at_speed: false,
            on_final_decel: false,
            sync_accel: 0,
            term_cond: TermCond::Stop,
            tolerance: 0.0,
            synchronized: SyncMode::None,
            uu_per_rev: 0.0,
            sync_io: SyncIo::default(),
            enables,
            index_rotary: -1,
        }
    }

    /// Build a coordinated linear segment from `start` to `end`.
    ///
    /// The shared length parameter is the longest non-zero subspace
    /// magnitude; xyz is preferred, then uvw, then abc.
    pub fn line(
        cycle_time: f64,
        start: &Pose,
        end: &Pose,
        vel: f64,
        ini_maxvel: f64,
        acc: f64,
        enables: EnableFlags,
    ) -> Self {
        let xyz = Line::new(start.xyz(), end.xyz());
        let abc = Line::new(start.abc(), end.abc());
        let uvw = Line::new(start.uvw(), end.uvw());

        let target = if !xyz.is_zero() {
            xyz.tmag
        } else if !uvw.is_zero() {
            uvw.tmag
        } else {
            abc.tmag
        };

        let mut tc = Self::new_common(
            cycle_time,
            vel,
            ini_maxvel,
            acc,
            enables,
            SegmentGeometry::Line(LineCoords { xyz, abc, uvw }),
        );
        tc.target = target;
        tc
    }

    /// Build a circular/helical segment. Returns `None` for degenerate
    /// circle geometry (zero radius or axis).
    #[allow(clippy::too_many_arguments)]
    pub fn circle(
        cycle_time: f64,
        start: &Pose,
        end: &Pose,
        center: Cart,
        normal: Cart,
        turn: u32,
        vel: f64,
        ini_maxvel: f64,
        acc: f64,
        enables: EnableFlags,
    ) -> Option<Self> {
        let xyz = Circle::new(start.xyz(), end.xyz(), center, normal, turn)?;
        let abc = Line::new(start.abc(), end.abc());
        let uvw = Line::new(start.uvw(), end.uvw());

        // Total length of the helix, not just its circular projection.
        let target = ((xyz.angle * xyz.radius).powi(2) + xyz.helix_mag().powi(2)).sqrt();

        let mut tc = Self::new_common(
            cycle_time,
            vel,
            ini_maxvel,
            acc,
            enables,
            SegmentGeometry::Circular(CircleCoords { xyz, abc, uvw }),
        );
        tc.target = target;
        Some(tc)
    }

    /// Build a rigid-tap segment plunging from `start` to `end`.
    ///
    /// The target includes ten spindle revolutions of margin past the
    /// programmed depth so the axis can follow the spindle while it spins
    /// down to the reversal.
    pub fn rigid_tap(
        cycle_time: f64,
        start: &Pose,
        end: &Pose,
        vel: f64,
        ini_maxvel: f64,
        acc: f64,
        enables: EnableFlags,
        uu_per_rev: f64,
    ) -> Self {
        let xyz = Line::new(start.xyz(), end.xyz());
        let coords = RigidTapCoords {
            xyz,
            aux_xyz: xyz,
            abc: start.abc(),
            uvw: start.uvw(),
            state: TapState::Tapping,
            reversal_target: xyz.tmag,
            spindle_revs_at_reversal: 0.0,
            last_spindle_pos: 0.0,
            reversal_samples: 0,
        };

        let mut tc = Self::new_common(
            cycle_time,
            vel,
            ini_maxvel,
            acc,
            enables,
            SegmentGeometry::RigidTap(coords),
        );
        tc.target = xyz.tmag + 10.0 * uu_per_rev;
        tc.at_speed = true;
        tc.uu_per_rev = uu_per_rev;
        tc
    }

    /// Build the tangent arc inserted between two lines.
    ///
    /// The arc is an extension of the predecessor: it inherits its
    /// velocity ceiling, enables, at-speed requirement and spindle sync.
    /// Half the acceleration budget is reserved for the normal direction.
    pub(crate) fn blend_arc(
        cycle_time: f64,
        prev: &Segment,
        circle: Circle,
        vel: f64,
        a_max: f64,
    ) -> Option<Self> {
        let SegmentGeometry::Line(pl) = &prev.geometry else {
            return None;
        };
        let abc = Line::new(pl.abc.end, pl.abc.end);
        let uvw = Line::new(pl.uvw.end, pl.uvw.end);

        let mut tc = Self::new_common(
            cycle_time,
            vel,
            prev.max_vel,
            a_max,
            prev.enables,
            SegmentGeometry::Circular(CircleCoords { xyz: circle, abc, uvw }),
        );
        tc.motion_class = MotionClass::Arc;
        tc.target = circle.angle * circle.radius;
        tc.req_vel = vel;
        tc.term_cond = TermCond::Tangent;
        tc.tolerance = 0.0;
        tc.at_speed = prev.at_speed;
        tc.synchronized = prev.synchronized;
        tc.uu_per_rev = prev.uu_per_rev;
        tc.accel_scale = std::f64::consts::FRAC_1_SQRT_2;
        Some(tc)
    }

    /// Acceleration ceiling after derating [user units/s²].
    #[inline]
    pub fn scaled_accel(&self) -> f64 {
        if self.accel_scale < 0.0 {
            0.0
        } else {
            self.max_accel * self.accel_scale
        }
    }

    /// Path length remaining [user units].
    #[inline]
    pub fn distance_to_go(&self) -> f64 {
        self.target - self.progress
    }

    /// Machine pose at an arbitrary progress value along the path.
    pub fn point_at(&self, progress: f64) -> Pose {
        match &self.geometry {
            SegmentGeometry::Line(l) => {
                if self.target <= 0.0 {
                    return Pose::from_triplets(l.xyz.start, l.abc.start, l.uvw.start);
                }
                let f = progress / self.target;
                Pose::from_triplets(
                    l.xyz.point(f * l.xyz.tmag),
                    l.abc.point(f * l.abc.tmag),
                    l.uvw.point(f * l.uvw.tmag),
                )
            }
            SegmentGeometry::Circular(c) => {
                if self.target <= 0.0 {
                    return Pose::from_triplets(c.xyz.point(0.0), c.abc.start, c.uvw.start);
                }
                let f = progress / self.target;
                Pose::from_triplets(
                    c.xyz.point(f * c.xyz.angle),
                    c.abc.point(f * c.abc.tmag),
                    c.uvw.point(f * c.uvw.tmag),
                )
            }
            SegmentGeometry::RigidTap(rt) => {
                let xyz = match rt.state {
                    TapState::Tapping | TapState::Reversing => rt.xyz.point(progress),
                    _ => rt.aux_xyz.point(progress),
                };
                Pose::from_triplets(xyz, rt.abc, rt.uvw)
            }
        }
    }

    /// Current machine pose.
    #[inline]
    pub fn pos(&self) -> Pose {
        self.point_at(self.progress)
    }

    /// Pose at the end of the segment.
    #[inline]
    pub fn endpoint(&self) -> Pose {
        self.point_at(self.target)
    }

    /// Unit tangent at the start of the path.
    pub fn starting_tangent(&self) -> Cart {
        match &self.geometry {
            SegmentGeometry::Line(l) => {
                if !l.xyz.is_zero() {
                    l.xyz.uvec
                } else if !l.uvw.is_zero() {
                    l.uvw.uvec
                } else {
                    l.abc.uvec
                }
            }
            SegmentGeometry::Circular(c) => c.xyz.tangent(0.0),
            SegmentGeometry::RigidTap(rt) => rt.xyz.uvec,
        }
    }

    /// Unit tangent at the end of the path.
    pub fn ending_tangent(&self) -> Cart {
        match &self.geometry {
            SegmentGeometry::Line(l) => {
                if !l.xyz.is_zero() {
                    l.xyz.uvec
                } else if !l.uvw.is_zero() {
                    l.uvw.uvec
                } else {
                    l.abc.uvec
                }
            }
            SegmentGeometry::Circular(c) => c.xyz.tangent(c.xyz.angle),
            SegmentGeometry::RigidTap(rt) => rt.xyz.uvec,
        }
    }

    /// True for motion confined to the rotary axes, which is measured in
    /// angular units and exempt from the tool-tip velocity limit.
    #[inline]
    pub fn is_pure_rotary(&self) -> bool {
        match &self.geometry {
            SegmentGeometry::Line(l) => l.xyz.is_zero() && l.uvw.is_zero(),
            _ => false,
        }
    }

    /// Consume the staged synchronized I/O record into this segment.
    pub(crate) fn consume_staged_io(&mut self, staging: &mut SyncIo) {
        if staging.any_changed {
            self.sync_io = staging.take();
        } else {
            self.sync_io.any_changed = false;
        }
    }
}
