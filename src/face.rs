//! Face-lab and wan-analysis panels
//!
//! Both tools are single request/response calls to the backend. The
//! panel only tracks what to show: a status line and the last result.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::client::FaceSwapResult;
use crate::error::ToolError;

/// Target extensions the backend treats as video
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];

pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// `<source> <target>` from the face-lab input line
pub fn parse_swap_args(input: &str) -> Result<(PathBuf, PathBuf), String> {
    let mut parts = input.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(source), Some(target), None) => Ok((PathBuf::from(source), PathBuf::from(target))),
        _ => Err("Please provide both source and target images.".into()),
    }
}

// ═══════════════════════════════════════════════════════════════
// ANALYSIS REPORT
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PoseAngles {
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub yaw: f64,
    #[serde(default)]
    pub roll: f64,
}

/// Scores returned by `/face/analyze`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FaceAnalysis {
    pub realness_score: f64,
    pub deepfake_probability: f64,
    pub face_quality: f64,
    pub liveness_score: f64,
    pub lighting_quality: f64,
    pub blur_amount: f64,
    pub age: serde_json::Value,
    pub gender: serde_json::Value,
    pub pose_angles: PoseAngles,
}

impl FaceAnalysis {
    /// Parse the `analysis` field. The model reports "no face" as an
    /// `error` key inside it.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ToolError> {
        if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
            return Err(ToolError::Backend(error.to_string()));
        }
        serde_json::from_value(value)
            .map_err(|e| ToolError::Backend(format!("unexpected analysis format: {}", e)))
    }

    /// Realness above 80% is considered a real face
    pub fn looks_real(&self) -> bool {
        self.realness_score > 80.0
    }

    pub fn report(&self) -> Vec<String> {
        vec![
            format!(
                "Realness Score: {:.1}% {}",
                self.realness_score,
                if self.looks_real() { "(real)" } else { "(suspicious)" }
            ),
            format!("Deepfake Prob:  {:.1}%", self.deepfake_probability),
            format!("Face Quality:   {:.1}", self.face_quality),
            format!("Liveness:       {}%", self.liveness_score),
            format!("Lighting:       {:.1}", self.lighting_quality),
            format!("Blur:           {:.1}", self.blur_amount),
            format!("Age/Gender:     {} / {}", plain(&self.age), plain(&self.gender)),
            format!(
                "Pose:           pitch {:.1}°  yaw {:.1}°  roll {:.1}°",
                self.pose_angles.pitch, self.pose_angles.yaw, self.pose_angles.roll
            ),
        ]
    }
}

fn plain(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "?".into(),
        other => other.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════
// PANEL STATE
// ═══════════════════════════════════════════════════════════════

/// Finished tool call, delivered back to the UI task
#[derive(Debug)]
pub enum ToolOutcome {
    Swap(Result<FaceSwapResult, ToolError>),
    Analysis(Result<FaceAnalysis, ToolError>),
}

/// What a tool panel shows
#[derive(Debug, Default)]
pub struct ToolPanel {
    pub status: String,
    pub lines: Vec<String>,
    pub busy: bool,
}

impl ToolPanel {
    pub fn begin(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.lines.clear();
        self.busy = true;
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        self.status = reason.into();
        self.busy = false;
    }

    pub fn finish(&mut self, outcome: ToolOutcome) {
        self.busy = false;
        match outcome {
            ToolOutcome::Swap(Ok(result)) => {
                self.status = "Success!".into();
                self.lines = vec![format!("Output: {}", result.output_url)];
                if let Some(message) = result.message {
                    self.lines.push(message);
                }
            }
            ToolOutcome::Analysis(Ok(analysis)) => {
                self.status = "Analysis complete.".into();
                self.lines = analysis.report();
            }
            ToolOutcome::Swap(Err(e)) | ToolOutcome::Analysis(Err(e)) => {
                tracing::warn!(error = %e, "tool request failed");
                self.status = "Failed.".into();
                self.lines = vec![format!("Error: {}", e)];
            }
        }
    }
}
