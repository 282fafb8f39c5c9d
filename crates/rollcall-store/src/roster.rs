//! Roster CSV repository.
//!
//! Owns the registered-students file (`ID,Name,Course,Cohort,PhotoPath`).
//! Registration validates the form fields, assigns the next id, and
//! rewrites the whole file; there is no append path.

use rollcall_core::Student;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
    #[error("name may only contain letters and spaces: {0:?}")]
    InvalidName(String),
    #[error("cohort must be a number: {0:?}")]
    CohortNotNumeric(String),
    #[error("student with the same name, course, and cohort already exists: {name} / {course} / {cohort}")]
    DuplicateStudent {
        name: String,
        course: String,
        cohort: String,
    },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
}

/// Form input for a registration.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub name: String,
    pub course: String,
    pub cohort: String,
    pub photo_path: String,
}

/// Repository over the roster CSV file.
pub struct RosterStore {
    path: PathBuf,
    students: Vec<Student>,
}

impl RosterStore {
    /// Load the roster from `path`. A missing file is an empty roster, not
    /// an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RosterError> {
        let path = path.into();
        let mut students = Vec::new();

        if path.exists() {
            let mut reader = csv::Reader::from_path(&path)?;
            for row in reader.deserialize() {
                let student: Student = row?;
                students.push(student);
            }
        }

        tracing::debug!(path = %path.display(), count = students.len(), "roster loaded");
        Ok(Self { path, students })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registered students in file order.
    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    /// Next id to assign: one past the current maximum, 1 for an empty
    /// roster.
    pub fn next_id(&self) -> u32 {
        self.students.iter().map(|s| s.id).max().unwrap_or(0) + 1
    }

    /// Validate and register a new student, rewriting the roster file.
    ///
    /// Nothing is persisted when validation fails.
    pub fn register(&mut self, new: NewStudent) -> Result<&Student, RosterError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(RosterError::EmptyField { field: "name" });
        }
        if !name.chars().all(|c| c.is_alphabetic() || c == ' ') {
            return Err(RosterError::InvalidName(name.to_string()));
        }
        // The registration form uppercases names as they are typed.
        let name = name.to_uppercase();

        let course = new.course.trim().to_string();
        if course.is_empty() {
            return Err(RosterError::EmptyField { field: "course" });
        }

        let cohort = new.cohort.trim().to_string();
        if cohort.is_empty() {
            return Err(RosterError::EmptyField { field: "cohort" });
        }
        if !cohort.chars().all(|c| c.is_ascii_digit()) {
            return Err(RosterError::CohortNotNumeric(cohort));
        }

        if new.photo_path.trim().is_empty() {
            return Err(RosterError::EmptyField { field: "photo path" });
        }

        if self
            .students
            .iter()
            .any(|s| s.name == name && s.course == course && s.cohort == cohort)
        {
            return Err(RosterError::DuplicateStudent { name, course, cohort });
        }

        let student = Student {
            id: self.next_id(),
            name,
            course,
            cohort,
            photo_path: new.photo_path.trim().to_string(),
        };
        self.students.push(student);
        self.save()?;

        let student = &self.students[self.students.len() - 1];
        tracing::info!(id = student.id, name = %student.name, "student registered");
        Ok(student)
    }

    /// Rewrite the whole roster file, rows sorted by id.
    pub fn save(&self) -> Result<(), RosterError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut rows: Vec<&Student> = self.students.iter().collect();
        rows.sort_by_key(|s| s.id);

        let mut writer = csv::Writer::from_path(&self.path)?;
        for student in rows {
            writer.serialize(student)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_student(name: &str) -> NewStudent {
        NewStudent {
            name: name.to_string(),
            course: "RDA".to_string(),
            cohort: "4".to_string(),
            photo_path: format!("photos/{name}.jpg"),
        }
    }

    fn roster_path(dir: &TempDir) -> PathBuf {
        dir.path().join("RegisteredStudents.csv")
    }

    fn file_rows(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = RosterStore::load(roster_path(&dir)).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.next_id(), 1);
    }

    #[test]
    fn test_register_writes_header_and_row() {
        let dir = TempDir::new().unwrap();
        let path = roster_path(&dir);
        let mut store = RosterStore::load(&path).unwrap();

        let student = store.register(new_student("Alice")).unwrap();
        assert_eq!(student.id, 1);
        assert_eq!(student.name, "ALICE");

        let rows = file_rows(&path);
        assert_eq!(rows[0], "ID,Name,Course,Cohort,PhotoPath");
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_register_increments_row_count_by_one() {
        let dir = TempDir::new().unwrap();
        let path = roster_path(&dir);
        let mut store = RosterStore::load(&path).unwrap();
        store.register(new_student("Alice")).unwrap();
        let before = file_rows(&path).len();

        store.register(new_student("Bob")).unwrap();
        assert_eq!(file_rows(&path).len(), before + 1);
    }

    #[test]
    fn test_id_is_one_past_the_maximum() {
        let dir = TempDir::new().unwrap();
        let path = roster_path(&dir);
        let mut store = RosterStore::load(&path).unwrap();
        store.register(new_student("Alice")).unwrap();
        store.register(new_student("Bob")).unwrap();

        // Reload and register once more: ids keep climbing.
        let mut store = RosterStore::load(&path).unwrap();
        let student = store.register(new_student("Carol")).unwrap();
        assert_eq!(student.id, 3);
    }

    #[test]
    fn test_id_skips_gaps_from_hand_edited_files() {
        let dir = TempDir::new().unwrap();
        let path = roster_path(&dir);
        std::fs::write(
            &path,
            "ID,Name,Course,Cohort,PhotoPath\n2,ALICE,RDA,4,a.jpg\n7,BOB,AIML,5,b.jpg\n",
        )
        .unwrap();

        let mut store = RosterStore::load(&path).unwrap();
        assert_eq!(store.next_id(), 8);
        let student = store.register(new_student("Carol")).unwrap();
        assert_eq!(student.id, 8);
    }

    #[test]
    fn test_duplicate_registration_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = roster_path(&dir);
        let mut store = RosterStore::load(&path).unwrap();
        store.register(new_student("Alice")).unwrap();
        let before = file_rows(&path);

        let result = store.register(new_student("alice")); // uppercased to the same tuple
        assert!(matches!(result, Err(RosterError::DuplicateStudent { .. })));
        assert_eq!(store.len(), 1);
        assert_eq!(file_rows(&path), before);
    }

    #[test]
    fn test_same_name_different_course_is_allowed() {
        let dir = TempDir::new().unwrap();
        let mut store = RosterStore::load(roster_path(&dir)).unwrap();
        store.register(new_student("Alice")).unwrap();

        let mut other = new_student("Alice");
        other.course = "AIML".to_string();
        assert!(store.register(other).is_ok());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_empty_fields_rejected() {
        let dir = TempDir::new().unwrap();
        let path = roster_path(&dir);
        let mut store = RosterStore::load(&path).unwrap();

        for (field, wreck) in [
            ("name", Box::new(|s: &mut NewStudent| s.name.clear()) as Box<dyn Fn(&mut NewStudent)>),
            ("course", Box::new(|s: &mut NewStudent| s.course.clear())),
            ("cohort", Box::new(|s: &mut NewStudent| s.cohort.clear())),
            ("photo path", Box::new(|s: &mut NewStudent| s.photo_path.clear())),
        ] {
            let mut input = new_student("Alice");
            wreck(&mut input);
            let result = store.register(input);
            match result {
                Err(RosterError::EmptyField { field: f }) => assert_eq!(f, field),
                other => panic!("expected EmptyField for {field}, got {other:?}"),
            }
        }
        assert!(store.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_non_numeric_cohort_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = RosterStore::load(roster_path(&dir)).unwrap();
        let mut input = new_student("Alice");
        input.cohort = "4b".to_string();
        assert!(matches!(
            store.register(input),
            Err(RosterError::CohortNotNumeric(_))
        ));
    }

    #[test]
    fn test_name_with_digits_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = RosterStore::load(roster_path(&dir)).unwrap();
        let mut input = new_student("Alice");
        input.name = "Alice2".to_string();
        assert!(matches!(store.register(input), Err(RosterError::InvalidName(_))));
    }

    #[test]
    fn test_name_with_spaces_accepted_and_uppercased() {
        let dir = TempDir::new().unwrap();
        let mut store = RosterStore::load(roster_path(&dir)).unwrap();
        let student = store.register(new_student("Mary Jane")).unwrap();
        assert_eq!(student.name, "MARY JANE");
    }

    #[test]
    fn test_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = roster_path(&dir);
        let mut store = RosterStore::load(&path).unwrap();
        store.register(new_student("Alice")).unwrap();
        store.register(new_student("Bob")).unwrap();

        let reloaded = RosterStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.students()[0].name, "ALICE");
        assert_eq!(reloaded.students()[1].name, "BOB");
        assert_eq!(reloaded.students()[1].photo_path, "photos/Bob.jpg");
    }
}
