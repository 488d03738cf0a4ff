//! Run configuration.

use geo::{coord, Rect};
use std::path::PathBuf;

/// Configuration for one retiling run.
///
/// Tolerances are in the units of the input coordinate reference system
/// (meters for the projected land-cover datasets this was built for).
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Name of the import batch. Reruns with the same name resume.
    pub source_name: String,
    /// Area of interest to partition.
    pub aoi: Rect<f64>,
    /// The AOI is split into `partition_count` x `partition_count` tiles.
    pub partition_count: usize,
    /// Upper bound on concurrently processed tiles / merge pairs.
    pub degree_of_parallelism: usize,
    /// How far past its rectangle a tile reads and keeps geometry.
    pub buffer_distance: f64,
    /// Endpoint snap tolerance against the baseline layer.
    pub snap_tolerance: f64,
    /// Douglas-Peucker simplification tolerance.
    pub simplify_tolerance: f64,
    /// Chaikin corner-cutting ratio.
    pub smooth_ratio: f64,
    /// Coordinates are noded on a grid of `1 / precision_scale` spacing.
    pub precision_scale: f64,
    /// Polygons below this area are merged into a neighbor.
    pub elimination_threshold: f64,
    pub baseline_path: PathBuf,
    pub hardbone_path: PathBuf,
    pub backbone_path: PathBuf,
    /// Optional outer border to clip the final output against.
    pub border_path: Option<PathBuf>,
    pub output_path: PathBuf,
    /// When set, every processed tile also writes its clipped polygons to
    /// `<dir>/tile_<east>_<north>.json` for inspection.
    pub tile_output_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source_name: "default".to_string(),
            aoi: Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 0.0, y: 0.0 }),
            partition_count: 2,
            degree_of_parallelism: 4,
            buffer_distance: 1000.0,
            snap_tolerance: 20.0,
            simplify_tolerance: 15.0,
            smooth_ratio: 0.25,
            precision_scale: 10_000.0,
            elimination_threshold: 5000.0,
            baseline_path: PathBuf::new(),
            hardbone_path: PathBuf::new(),
            backbone_path: PathBuf::new(),
            border_path: None,
            output_path: PathBuf::new(),
            tile_output_dir: None,
        }
    }
}

impl RunConfig {
    pub fn new(source_name: impl Into<String>, aoi: Rect<f64>) -> Self {
        Self {
            source_name: source_name.into(),
            aoi,
            ..Self::default()
        }
    }

    pub fn with_partition_count(mut self, count: usize) -> Self {
        self.partition_count = count.max(1);
        self
    }

    pub fn with_degree_of_parallelism(mut self, degree: usize) -> Self {
        self.degree_of_parallelism = degree.max(1);
        self
    }

    pub fn with_buffer_distance(mut self, distance: f64) -> Self {
        self.buffer_distance = distance;
        self
    }

    pub fn with_snap_tolerance(mut self, tolerance: f64) -> Self {
        self.snap_tolerance = tolerance;
        self
    }

    pub fn with_simplify_tolerance(mut self, tolerance: f64) -> Self {
        self.simplify_tolerance = tolerance;
        self
    }

    pub fn with_smooth_ratio(mut self, ratio: f64) -> Self {
        self.smooth_ratio = ratio;
        self
    }

    pub fn with_precision_scale(mut self, scale: f64) -> Self {
        self.precision_scale = scale;
        self
    }

    pub fn with_elimination_threshold(mut self, threshold: f64) -> Self {
        self.elimination_threshold = threshold;
        self
    }

    pub fn with_baseline_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.baseline_path = path.into();
        self
    }

    pub fn with_hardbone_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.hardbone_path = path.into();
        self
    }

    pub fn with_backbone_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backbone_path = path.into();
        self
    }

    pub fn with_border_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.border_path = Some(path.into());
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_tile_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tile_output_dir = Some(dir.into());
        self
    }
}
