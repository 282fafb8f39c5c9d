//! Roster loader: turn registered students into face encodings.
//!
//! Every student row is independent — a missing photo or an undetectable
//! face logs a warning and skips that student, never aborting the load.

use rollcall_core::detector::DetectorError;
use rollcall_core::encoder::EncoderError;
use rollcall_core::{Encoding, FaceDetector, FaceEncoder, Roster, RosterEntry, Student};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("photo unreadable: {path}: {source}")]
    Unreadable {
        path: String,
        source: image::ImageError,
    },
    #[error("no face found in photo")]
    NoFaceFound,
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
}

/// Load a student's photo and extract the encoding of the most confident
/// face in it.
pub fn encode_photo(
    detector: &mut FaceDetector,
    encoder: &mut FaceEncoder,
    student: &Student,
) -> Result<Encoding, PhotoError> {
    let img = image::open(&student.photo_path)
        .map_err(|source| PhotoError::Unreadable {
            path: student.photo_path.clone(),
            source,
        })?
        .to_rgb8();
    let (width, height) = img.dimensions();

    let faces = detector.detect(img.as_raw(), width, height)?;
    let face = faces.first().ok_or(PhotoError::NoFaceFound)?;

    Ok(encoder.extract(img.as_raw(), width, height, face)?)
}

/// Build the in-memory roster from registered students.
///
/// `encode` is the photo-to-encoding step (detector + encoder in
/// production); it is injected so the skip logic is testable without
/// models or image files.
pub fn build_roster<F>(students: &[Student], mut encode: F) -> Roster
where
    F: FnMut(&Student) -> Result<Encoding, PhotoError>,
{
    let mut roster = Roster::new();

    for student in students {
        match encode(student) {
            Ok(encoding) => {
                if !roster.push(RosterEntry {
                    student: student.clone(),
                    encoding,
                }) {
                    tracing::warn!(
                        name = %student.name,
                        "duplicate student name in roster file; keeping the first entry"
                    );
                }
            }
            Err(error) => {
                tracing::warn!(
                    name = %student.name,
                    photo = %student.photo_path,
                    %error,
                    "skipping student"
                );
            }
        }
    }

    roster
}
