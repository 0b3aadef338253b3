use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub model: String,
    pub api_base: Option<String>,
    pub request_timeout: Duration,
    /// Transcripts shorter than this are refused before any model call.
    pub min_transcript_len: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(".triage/triage.db"),
            model: "claude-sonnet-4-20250514".to_string(),
            api_base: None,
            request_timeout: Duration::from_secs(60),
            min_transcript_len: 10,
        }
    }
}
