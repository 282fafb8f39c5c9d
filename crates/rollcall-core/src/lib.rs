//! rollcall-core — Face detection, encoding, and attendance tracking.
//!
//! Detection and encoding run as external ONNX models through ONNX Runtime;
//! matching is a nearest-neighbor scan over the in-memory roster. The
//! attendance state machine is pure and performs no I/O.

pub mod attendance;
pub mod detector;
pub mod encoder;
pub mod types;

pub use attendance::{AttendanceSession, AttendanceStatus, ObserveOutcome};
pub use detector::FaceDetector;
pub use encoder::FaceEncoder;
pub use types::{BoundingBox, Encoding, MatchResult, Matcher, NearestMatcher, Roster, RosterEntry, Student};
