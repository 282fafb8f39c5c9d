use serde::{Deserialize, Serialize};

/// Label reported for a face whose nearest roster entry is too far away.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Bounding box for a detected face.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Face encoding vector (128-dimensional for the bundled encoder model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encoding {
    pub values: Vec<f32>,
}

impl Encoding {
    /// Compute Euclidean distance to another encoding.
    ///
    /// Lower = more similar. Always processes all dimensions.
    pub fn distance(&self, other: &Encoding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// A registered student, as persisted in the roster CSV.
///
/// One schema for both registration and roster loading; the serde renames
/// are the CSV column headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Course")]
    pub course: String,
    #[serde(rename = "Cohort")]
    pub cohort: String,
    #[serde(rename = "PhotoPath")]
    pub photo_path: String,
}

/// A student together with the encoding extracted from their roster photo.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub student: Student,
    pub encoding: Encoding,
}

/// The in-memory roster: every student whose photo yielded an encoding.
///
/// Student names are unique within a roster; they key the attendance session.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Returns `false` (and drops the entry) if a student with
    /// the same name is already enrolled.
    pub fn push(&mut self, entry: RosterEntry) -> bool {
        if self.student_by_name(&entry.student.name).is_some() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn student_by_name(&self, name: &str) -> Option<&Student> {
        self.entries
            .iter()
            .map(|e| &e.student)
            .find(|s| s.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.student.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of matching a probe encoding against the roster.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Euclidean distance of the nearest entry (infinite for an empty roster).
    pub distance: f32,
    /// Name of the matched student (if any).
    pub name: Option<String>,
}

impl MatchResult {
    /// Display label: the matched name, or [`UNKNOWN_LABEL`].
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_LABEL)
    }
}

/// Strategy for matching a probe encoding against the roster.
pub trait Matcher {
    fn nearest(&self, probe: &Encoding, roster: &Roster, threshold: f32) -> MatchResult;
}

/// Nearest-neighbor matcher over Euclidean distance.
///
/// Scans every roster entry; ties resolve to the first minimal index. A probe
/// matches only when the minimum distance is strictly below the threshold —
/// a distance exactly at the threshold reports [`UNKNOWN_LABEL`].
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn nearest(&self, probe: &Encoding, roster: &Roster, threshold: f32) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in roster.entries().iter().enumerate() {
            let dist = probe.distance(&entry.encoding);
            // Strict `<`: the first minimal index wins on ties.
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist < threshold => MatchResult {
                matched: true,
                distance: best_dist,
                name: Some(roster.entries()[idx].student.name.clone()),
            },
            _ => MatchResult {
                matched: false,
                distance: best_dist,
                name: None,
            },
        }
    }
}
