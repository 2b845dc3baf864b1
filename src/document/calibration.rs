use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::data::model::EntityGraph;
use crate::error::Result;

/// Physical calibration and size of the image the spots were detected in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Calibration {
    pub image_file_name: String,
    pub image_folder: String,
    pub width: u32,
    pub height: u32,
    pub n_slices: u32,
    /// 0 means "derive from the data".
    pub n_frames: u32,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub voxel_depth: f64,
    /// Time between two frames, in `time_units`.
    pub frame_interval: f64,
    pub space_units: String,
    pub time_units: String,
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration {
            image_file_name: String::new(),
            image_folder: String::new(),
            width: 0,
            height: 0,
            n_slices: 1,
            n_frames: 0,
            pixel_width: 1.0,
            pixel_height: 1.0,
            voxel_depth: 1.0,
            frame_interval: 1.0,
            space_units: "pixel".to_string(),
            time_units: "frame".to_string(),
        }
    }
}

impl Calibration {
    /// Read the image size from the header of `path`. Physical sizes keep
    /// their defaults; PNG and TIFF headers carry no calibration we rely on.
    pub fn from_image(path: &Path) -> Result<Self> {
        let (width, height) = image::image_dimensions(path)?;
        info!(
            "Image {}: {width} x {height} pixels",
            path.display()
        );
        Ok(Calibration {
            image_file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            image_folder: path
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            width,
            height,
            ..Default::default()
        })
    }

    /// Fill `n_frames` from the last frame of `graph` when it is unset.
    pub fn with_frames_from(mut self, graph: &EntityGraph) -> Self {
        if self.n_frames == 0 {
            self.n_frames = graph.last_frame().map_or(0, |f| f + 1);
        }
        self
    }

    /// Physical time of a frame.
    pub fn time_of(&self, frame: u32) -> f64 {
        frame as f64 * self.frame_interval
    }
}
