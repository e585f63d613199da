//! # GHOSTWIRE Core
//!
//! The simulated world shared by the authoritative server, client prediction
//! and prediction replay.
//!
//! ## Architecture
//!
//! ```text
//!   Move (input sample)
//!        |
//!        v
//!   World::integrate(id, path) ---> Ship / Item / Projectile rules
//!        |
//!        v
//!   World::advance(id, dt, state) --- swept circle vs polygons & circles
//!        |                             (up to 8 sub-steps)
//!        v
//!   MoveState[Actual] ---- update_interpolation ----> MoveState[Render]
//! ```
//!
//! Every object lives in a [`World`] keyed by [`ObjectId`]. Iteration is in
//! ascending id order so two worlds fed the same inputs stay bit-identical.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod barrier;
pub mod geometry;
pub mod integrator;
pub mod item;
pub mod moves;
pub mod object;
pub mod projectile;
pub mod ship;
pub mod world;

pub use barrier::{Barrier, GoalZone};
pub use integrator::{MoveObject, MoveState, StateIndex};
pub use item::Item;
pub use moves::Move;
pub use object::{GameObject, IdleCallPath, Movable, ObjectId, ObjectKind, TypeMask, UpdateMask};
pub use projectile::Projectile;
pub use ship::Ship;
pub use world::{SpatialQuery, World};

pub use ghostwire_shared::{BitStream, Point, Rect};
