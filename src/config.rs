use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{
    CONTENT_MARGIN, DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH, EDGE_HIT_SAMPLES,
    EDGE_HIT_STROKE_WIDTH, EDGE_LABEL_PUSH, EMPTY_CANVAS_EXTENT, GROUP_MIN_HEIGHT, GROUP_MIN_WIDTH,
    GROUP_RESIZE_HANDLE, PARALLEL_EDGE_STEP, SCROLLBAR_MIN_THUMB, SCROLLBAR_THICKNESS, Size,
};

const CONFIG_FILE_NAME: &str = "config.json";

/// Tunables shared by layout, hit testing and gestures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanvasConfig {
    pub parallel_edge_step: f32,
    pub label_push: f32,
    pub hit_stroke_width: f32,
    pub hit_samples: usize,
    pub content_margin: f32,
    pub empty_canvas_extent: f32,
    pub scrollbar_min_thumb: f32,
    pub scrollbar_thickness: f32,
    pub group_min_width: f32,
    pub group_min_height: f32,
    pub resize_handle: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            parallel_edge_step: PARALLEL_EDGE_STEP,
            label_push: EDGE_LABEL_PUSH,
            hit_stroke_width: EDGE_HIT_STROKE_WIDTH,
            hit_samples: EDGE_HIT_SAMPLES,
            content_margin: CONTENT_MARGIN,
            empty_canvas_extent: EMPTY_CANVAS_EXTENT,
            scrollbar_min_thumb: SCROLLBAR_MIN_THUMB,
            scrollbar_thickness: SCROLLBAR_THICKNESS,
            group_min_width: GROUP_MIN_WIDTH,
            group_min_height: GROUP_MIN_HEIGHT,
            resize_handle: GROUP_RESIZE_HANDLE,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
        }
    }
}

fn env_override<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Some(value) = std::env::var(name).ok().and_then(|raw| raw.trim().parse().ok()) {
        *target = value;
    }
}

impl CanvasConfig {
    pub fn viewport_size(&self) -> Size {
        Size::new(self.viewport_width, self.viewport_height)
    }

    pub fn min_group_size(&self) -> Size {
        Size::new(self.group_min_width, self.group_min_height)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config '{}'", path.display()))
    }

    /// Defaults, then the config file (explicit path or the user config dir),
    /// then `OPSCANVAS_*` environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match ProjectDirs::from("", "", "opscanvas") {
                Some(dirs) => {
                    let candidate = dirs.config_dir().join(CONFIG_FILE_NAME);
                    if candidate.is_file() {
                        Self::from_file(&candidate)?
                    } else {
                        Self::default()
                    }
                }
                None => Self::default(),
            },
        };
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        env_override("OPSCANVAS_EDGE_STEP", &mut self.parallel_edge_step);
        env_override("OPSCANVAS_LABEL_PUSH", &mut self.label_push);
        env_override("OPSCANVAS_HIT_STROKE", &mut self.hit_stroke_width);
        env_override("OPSCANVAS_CONTENT_MARGIN", &mut self.content_margin);
        env_override("OPSCANVAS_MIN_THUMB", &mut self.scrollbar_min_thumb);
        env_override("OPSCANVAS_GROUP_MIN_WIDTH", &mut self.group_min_width);
        env_override("OPSCANVAS_GROUP_MIN_HEIGHT", &mut self.group_min_height);
        env_override("OPSCANVAS_VIEWPORT_WIDTH", &mut self.viewport_width);
        env_override("OPSCANVAS_VIEWPORT_HEIGHT", &mut self.viewport_height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_remaining_defaults() {
        let config: CanvasConfig =
            serde_json::from_str(r#"{"parallelEdgeStep": 44, "viewportWidth": 900}"#).unwrap();
        assert_eq!(config.parallel_edge_step, 44.0);
        assert_eq!(config.viewport_size(), Size::new(900.0, DEFAULT_VIEWPORT_HEIGHT));
        assert_eq!(config.content_margin, CONTENT_MARGIN);
        assert_eq!(config.min_group_size(), Size::new(200.0, 150.0));
    }
}
