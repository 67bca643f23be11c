use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Result, VisualiserError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub render: RenderConfig,
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Reads a JSON config file. Missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => VisualiserError::FileNotFound(path.to_path_buf()),
            _ => VisualiserError::Io(err),
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Settings for the feedback renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Colour used to prime both feedback buffers.
    pub clear_color: [f32; 4],
    /// Texture unit the previous frame is bound to while drawing.
    pub feedback_texture_unit: u32,
    /// Initial size of the vertex store in bytes.
    pub vertex_capacity: u32,
    /// Shader sources to use instead of the built-in effect.
    pub vertex_shader: Option<PathBuf>,
    pub geometry_shader: Option<PathBuf>,
    pub fragment_shader: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            feedback_texture_unit: 0,
            vertex_capacity: 256,
            vertex_shader: None,
            geometry_shader: None,
            fragment_shader: None,
        }
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    /// Weight given to the previous spectrum when smoothing, in `[0, 1)`.
    pub smoothing: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 1024,
            smoothing: 0.6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = AppConfig::from_json(r#"{ "render": { "feedback_texture_unit": 2 } }"#)
            .expect("config should parse");

        assert_eq!(config.render.feedback_texture_unit, 2);
        assert_eq!(config.render.vertex_capacity, 256);
        assert_eq!(config.audio.sample_rate, 48_000);
        assert!(config.render.fragment_shader.is_none());
    }

    #[test]
    fn missing_file_is_reported_as_not_found() {
        let err = AppConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, VisualiserError::FileNotFound(_)));
    }
}
