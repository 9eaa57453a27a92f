//! Real-time progressive path tracer: a procedurally generated sphere scene
//! is ray traced by a GPU compute kernel whose noisy per-frame samples are
//! accumulated into a converged image while the inputs hold still.

pub mod accumulation;
pub mod application;
pub mod camera;
pub mod change;
pub mod config;
pub mod driver;
pub mod kernel;
pub mod renderer;
pub mod scene;
