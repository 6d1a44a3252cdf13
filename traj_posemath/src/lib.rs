//! Pose math for the trajectory planner.
//!
//! The minimal geometric layer the planner core consumes: 9-axis machine
//! poses, Cartesian vector helpers, and the line/circle parameterizations
//! motion segments are built from. Everything here is allocation-free and
//! `Copy` so segments can live in a fixed-capacity queue.

pub mod cart;
pub mod circle;
pub mod line;
pub mod pose;

pub use cart::{Cart, CART_FUZZ, unit, unit_angle};
pub use circle::Circle;
pub use line::Line;
pub use pose::Pose;
