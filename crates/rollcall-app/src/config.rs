use std::path::PathBuf;

/// Application configuration, loaded from environment variables.
pub struct Config {
    /// System camera index (default: 0, i.e. /dev/video0).
    pub camera_index: u32,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the registered-students CSV.
    pub roster_path: PathBuf,
    /// Root directory for per-day attendance files.
    pub attendance_dir: PathBuf,
    /// Directory where captured registration photos are saved.
    pub photo_dir: PathBuf,
    /// Maximum encoding distance for a positive match.
    pub match_threshold: f32,
    /// Recognition tick interval in milliseconds.
    pub tick_ms: u64,
    /// Consecutive missed ticks after which a present student is marked
    /// exited. Zero disables the exit transition.
    pub exit_after_misses: u32,
    /// When set, annotated frames with detections are saved here as JPEGs.
    pub frame_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            camera_index: env_u32("ROLLCALL_CAMERA_INDEX", 0),
            model_dir: env_path("ROLLCALL_MODEL_DIR", "models"),
            roster_path: env_path("ROLLCALL_ROSTER_PATH", "RegisteredStudents.csv"),
            attendance_dir: env_path("ROLLCALL_ATTENDANCE_DIR", "attendance"),
            photo_dir: env_path("ROLLCALL_PHOTO_DIR", "student_photos"),
            match_threshold: env_f32("ROLLCALL_MATCH_THRESHOLD", 0.3),
            tick_ms: env_u64("ROLLCALL_TICK_MS", 250),
            exit_after_misses: env_u32("ROLLCALL_EXIT_AFTER_MISSES", 0),
            frame_dir: std::env::var("ROLLCALL_FRAME_DIR").ok().map(PathBuf::from),
        }
    }

    /// V4L2 device path for the configured camera index.
    pub fn camera_device(&self) -> String {
        format!("/dev/video{}", self.camera_index)
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("version-RFB-320.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the face encoder model.
    pub fn encoder_model_path(&self) -> String {
        self.model_dir
            .join("mobilefacenet.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
