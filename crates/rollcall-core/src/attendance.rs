//! Attendance state machine.
//!
//! Pure in-memory state, no I/O: the recognition loop feeds it match results
//! and the attendance writer serializes the resulting statuses. Keyed by
//! student name, which is unique within a loaded roster.

use chrono::{DateTime, Local};
use std::collections::BTreeMap;

/// Per-student attendance record for the current session.
#[derive(Debug, Clone, Default)]
pub struct AttendanceStatus {
    /// Set (and refreshed) every time the student is recognized.
    pub entry_time: Option<DateTime<Local>>,
    /// Set once the student has gone unrecognized for the configured number
    /// of consecutive ticks. A student with an exit time stays exited.
    pub exit_time: Option<DateTime<Local>>,
    /// Timestamp of the most recent recognition.
    pub last_marked: Option<DateTime<Local>>,
}

impl AttendanceStatus {
    /// Entered and not yet exited.
    pub fn is_present(&self) -> bool {
        self.entry_time.is_some() && self.exit_time.is_none()
    }

    /// Never recognized this session.
    pub fn is_not_present(&self) -> bool {
        self.entry_time.is_none()
    }

    /// Marked as having left.
    pub fn is_absent(&self) -> bool {
        self.exit_time.is_some()
    }
}

/// What a recognition tick changed.
#[derive(Debug, Clone, Default)]
pub struct ObserveOutcome {
    /// True when the day's attendance file must be rewritten. Every
    /// successful present-mark counts, including refreshes of an already
    /// present student.
    pub rewrite_needed: bool,
    /// Students whose entry time was set for the first time this tick.
    pub entered: Vec<String>,
    /// Students whose exit time was set this tick.
    pub exited: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct SessionSlot {
    status: AttendanceStatus,
    /// Consecutive recognition ticks without a match, counted only while
    /// the student is present.
    misses: u32,
}

/// Attendance for one session: one slot per enrolled student.
#[derive(Debug, Clone, Default)]
pub struct AttendanceSession {
    slots: BTreeMap<String, SessionSlot>,
    /// After this many consecutive missed ticks a present student is marked
    /// exited. Zero disables the exit transition entirely.
    exit_after_misses: u32,
}

impl AttendanceSession {
    pub fn new(exit_after_misses: u32) -> Self {
        Self {
            slots: BTreeMap::new(),
            exit_after_misses,
        }
    }

    /// Enroll a student, initially all-absent. Returns `false` if the name
    /// is already enrolled.
    pub fn add_student(&mut self, name: &str) -> bool {
        if self.slots.contains_key(name) {
            return false;
        }
        self.slots.insert(name.to_string(), SessionSlot::default());
        true
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn status(&self, name: &str) -> Option<&AttendanceStatus> {
        self.slots.get(name).map(|s| &s.status)
    }

    /// Iterate all statuses in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttendanceStatus)> {
        self.slots.iter().map(|(name, slot)| (name.as_str(), &slot.status))
    }

    /// Mark a student present.
    ///
    /// Only known students without an exit time are marked; the entry and
    /// last-marked times are refreshed on every call. Returns whether the
    /// mark took effect (and the day file therefore needs rewriting).
    pub fn mark_present(&mut self, name: &str, now: DateTime<Local>) -> bool {
        let Some(slot) = self.slots.get_mut(name) else {
            return false;
        };
        if slot.status.exit_time.is_some() {
            return false;
        }
        slot.status.entry_time = Some(now);
        slot.status.last_marked = Some(now);
        slot.misses = 0;
        true
    }

    /// Mark a student as having left.
    ///
    /// Only a currently present student can exit. Returns whether the exit
    /// took effect.
    pub fn mark_exit(&mut self, name: &str, now: DateTime<Local>) -> bool {
        let Some(slot) = self.slots.get_mut(name) else {
            return false;
        };
        if !slot.status.is_present() {
            return false;
        }
        slot.status.exit_time = Some(now);
        true
    }

    /// Record one recognition tick: `matched` holds every roster name seen
    /// in the current frame.
    ///
    /// Matched students are marked present; present students missing from
    /// the frame accumulate misses and exit after `exit_after_misses`
    /// consecutive ones (never, when configured as zero).
    pub fn observe<'a, I>(&mut self, matched: I, now: DateTime<Local>) -> ObserveOutcome
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut outcome = ObserveOutcome::default();

        let matched: Vec<&str> = matched.into_iter().collect();

        for name in &matched {
            let newly = self
                .slots
                .get(*name)
                .map(|s| s.status.entry_time.is_none())
                .unwrap_or(false);
            if self.mark_present(name, now) {
                outcome.rewrite_needed = true;
                if newly {
                    outcome.entered.push((*name).to_string());
                }
            }
        }

        let mut to_exit = Vec::new();
        for (name, slot) in self.slots.iter_mut() {
            if matched.contains(&name.as_str()) || !slot.status.is_present() {
                continue;
            }
            slot.misses += 1;
            if self.exit_after_misses > 0 && slot.misses >= self.exit_after_misses {
                to_exit.push(name.clone());
            }
        }
        for name in to_exit {
            if self.mark_exit(&name, now) {
                outcome.rewrite_needed = true;
                outcome.exited.push(name);
            }
        }

        outcome
    }

    /// Students currently present (entered, not exited).
    pub fn present(&self) -> Vec<String> {
        self.collect(|s| s.is_present())
    }

    /// Students never recognized this session.
    pub fn not_present(&self) -> Vec<String> {
        self.collect(|s| s.is_not_present())
    }

    /// Students marked as having left.
    pub fn absent(&self) -> Vec<String> {
        self.collect(|s| s.is_absent())
    }

    fn collect(&self, pred: impl Fn(&AttendanceStatus) -> bool) -> Vec<String> {
        self.slots
            .iter()
            .filter(|(_, slot)| pred(&slot.status))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(n: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 6, 9, n / 60, n % 60).unwrap()
    }

    fn session(names: &[&str], exit_after: u32) -> AttendanceSession {
        let mut s = AttendanceSession::new(exit_after);
        for name in names {
            assert!(s.add_student(name));
        }
        s
    }

    #[test]
    fn test_mark_present_sets_entry_leaves_exit_unset() {
        let mut s = session(&["ALICE"], 0);
        assert!(s.mark_present("ALICE", t(0)));
        let status = s.status("ALICE").unwrap();
        assert_eq!(status.entry_time, Some(t(0)));
        assert!(status.exit_time.is_none());
        assert_eq!(status.last_marked, Some(t(0)));
    }

    #[test]
    fn test_mark_present_unknown_student_is_ignored() {
        let mut s = session(&["ALICE"], 0);
        assert!(!s.mark_present("MALLORY", t(0)));
        assert!(s.status("MALLORY").is_none());
    }

    #[test]
    fn test_repeated_marks_refresh_entry_time() {
        let mut s = session(&["ALICE"], 0);
        assert!(s.mark_present("ALICE", t(0)));
        assert!(s.mark_present("ALICE", t(5)));
        assert_eq!(s.status("ALICE").unwrap().entry_time, Some(t(5)));
    }

    #[test]
    fn test_exited_student_cannot_reenter() {
        let mut s = session(&["ALICE"], 0);
        s.mark_present("ALICE", t(0));
        assert!(s.mark_exit("ALICE", t(1)));
        assert!(!s.mark_present("ALICE", t(2)));
        let status = s.status("ALICE").unwrap();
        assert_eq!(status.entry_time, Some(t(0)));
        assert_eq!(status.exit_time, Some(t(1)));
    }

    #[test]
    fn test_exit_requires_presence() {
        let mut s = session(&["ALICE"], 0);
        assert!(!s.mark_exit("ALICE", t(0)));
        assert!(s.status("ALICE").unwrap().exit_time.is_none());
    }

    #[test]
    fn test_observe_marks_and_reports_new_entries() {
        let mut s = session(&["ALICE", "BOB"], 0);
        let outcome = s.observe(["ALICE"], t(0));
        assert!(outcome.rewrite_needed);
        assert_eq!(outcome.entered, vec!["ALICE"]);
        assert!(outcome.exited.is_empty());

        // A refresh still requires a rewrite but is not a new entry.
        let outcome = s.observe(["ALICE"], t(1));
        assert!(outcome.rewrite_needed);
        assert!(outcome.entered.is_empty());
    }

    #[test]
    fn test_observe_without_matches_changes_nothing_when_exits_disabled() {
        let mut s = session(&["ALICE"], 0);
        s.mark_present("ALICE", t(0));
        for i in 1..100 {
            let outcome = s.observe([], t(i));
            assert!(!outcome.rewrite_needed);
        }
        assert!(s.status("ALICE").unwrap().exit_time.is_none());
    }

    #[test]
    fn test_consecutive_misses_mark_exit() {
        let mut s = session(&["ALICE"], 3);
        s.observe(["ALICE"], t(0));
        s.observe([], t(1));
        s.observe([], t(2));
        let outcome = s.observe([], t(3));
        assert!(outcome.rewrite_needed);
        assert_eq!(outcome.exited, vec!["ALICE"]);
        assert_eq!(s.status("ALICE").unwrap().exit_time, Some(t(3)));
    }

    #[test]
    fn test_match_resets_miss_count() {
        let mut s = session(&["ALICE"], 3);
        s.observe(["ALICE"], t(0));
        s.observe([], t(1));
        s.observe([], t(2));
        s.observe(["ALICE"], t(3)); // reset
        s.observe([], t(4));
        s.observe([], t(5));
        assert!(s.status("ALICE").unwrap().exit_time.is_none());
        let outcome = s.observe([], t(6));
        assert_eq!(outcome.exited, vec!["ALICE"]);
    }

    #[test]
    fn test_misses_only_counted_while_present() {
        let mut s = session(&["ALICE"], 2);
        // Never entered: misses never accumulate, no exit.
        for i in 0..10 {
            let outcome = s.observe([], t(i));
            assert!(!outcome.rewrite_needed);
        }
        assert!(s.status("ALICE").unwrap().is_not_present());
    }

    #[test]
    fn test_queries_partition_the_roster() {
        let mut s = session(&["ALICE", "BOB", "CAROL"], 1);
        s.observe(["ALICE", "BOB"], t(0));
        s.observe(["ALICE"], t(1)); // BOB misses once -> exits

        assert_eq!(s.present(), vec!["ALICE"]);
        assert_eq!(s.not_present(), vec!["CAROL"]);
        assert_eq!(s.absent(), vec!["BOB"]);
    }

    #[test]
    fn test_duplicate_enrollment_rejected() {
        let mut s = AttendanceSession::new(0);
        assert!(s.add_student("ALICE"));
        assert!(!s.add_student("ALICE"));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_iter_is_name_ordered() {
        let s = session(&["CAROL", "ALICE", "BOB"], 0);
        let names: Vec<&str> = s.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["ALICE", "BOB", "CAROL"]);
    }
}
