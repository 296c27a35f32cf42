use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Path to the descriptor encryption key file.
    pub key_path: PathBuf,
    /// Similarity threshold for a positive match.
    pub similarity_threshold: f32,
    /// Descriptor distance that maps to similarity 0.
    pub max_distance: f32,
    /// Number of warmup frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Number of frames to capture per verify attempt.
    pub frames_per_verify: usize,
    /// Number of frames to capture per enroll attempt.
    pub frames_per_enroll: usize,
    /// Base URL of the attendance service.
    pub api_base_url: String,
    /// Bearer credential for the attendance service.
    pub api_token: String,
    /// Timeout in seconds for attendance service calls.
    pub api_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("rollcall.db"));

        let key_path = std::env::var("ROLLCALL_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("descriptor.key"));

        Self {
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            db_path,
            key_path,
            similarity_threshold: env_f32(
                "ROLLCALL_SIMILARITY_THRESHOLD",
                rollcall_core::DEFAULT_MATCH_THRESHOLD,
            ),
            max_distance: env_f32("ROLLCALL_MAX_DISTANCE", rollcall_core::DEFAULT_MAX_DISTANCE),
            warmup_frames: env_usize("ROLLCALL_WARMUP_FRAMES", 4),
            frames_per_verify: env_usize("ROLLCALL_FRAMES_PER_VERIFY", 3),
            frames_per_enroll: env_usize("ROLLCALL_FRAMES_PER_ENROLL", 5),
            api_base_url: std::env::var("ROLLCALL_API_URL")
                .unwrap_or_else(|_| "http://localhost:5000".to_string()),
            api_token: std::env::var("ROLLCALL_API_TOKEN").unwrap_or_default(),
            api_timeout_secs: env_u64("ROLLCALL_API_TIMEOUT_SECS", 10),
        }
    }

    /// Path to the UltraFace detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("version-RFB-320.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the descriptor encoder model.
    pub fn encoder_model_path(&self) -> String {
        self.model_dir
            .join("slimface-128.onnx")
            .to_string_lossy()
            .into_owned()
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
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

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
