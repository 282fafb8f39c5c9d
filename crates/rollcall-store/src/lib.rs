//! rollcall-store — Flat-CSV persistence.
//!
//! Two surfaces: the roster file of registered students (rewritten on every
//! registration) and the per-day attendance file (rewritten on every status
//! change). No indexing, no locking; the whole file is the unit of write.

pub mod attendance;
pub mod roster;

pub use attendance::{AttendanceError, AttendanceWriter};
pub use roster::{NewStudent, RosterError, RosterStore};
