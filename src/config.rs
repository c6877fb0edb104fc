use serde::{Deserialize, Serialize};

/// Everything tunable in the pipeline. Missing JSON fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub features: FeatureConfig,
    pub matcher: MatcherConfig,
    pub pose: PoseConfig,
    pub render: RenderConfig,
    pub pump: PumpConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Number of pyramid levels searched for keypoints.
    pub octaves: usize,
    /// FAST-9 intensity threshold on the blurred level.
    pub fast_threshold: u8,
    /// Keep at most this many keypoints (strongest first), 0 keeps all.
    pub max_features: usize,
    pub blur_sigma: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            octaves: 3,
            fast_threshold: 20,
            max_features: 0,
            blur_sigma: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    #[default]
    KdForest,
    BruteForce,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub kind: MatcherKind,
    /// Randomized kd-trees in the forest.
    pub trees: usize,
    /// Leaves examined per query before the search gives up.
    pub checks: usize,
    /// Lowe ratio: best must be closer than `ratio * second_best`.
    pub ratio: f32,
    pub min_match_count: usize,
    pub seed: u64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            kind: MatcherKind::KdForest,
            trees: 5,
            checks: 50,
            ratio: 0.7,
            min_match_count: 10,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Max reprojection error in frame pixels for a pair to count as inlier.
    pub ransac_threshold: f64,
    pub max_iterations: usize,
    pub confidence: f64,
    pub seed: u64,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            ransac_threshold: 5.0,
            max_iterations: 2000,
            confidence: 0.995,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchColoring {
    /// Every match line uses `match_color`.
    #[default]
    Uniform,
    /// Lines are coloured by descriptor distance.
    ByDistance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub match_color: [u8; 3],
    pub match_coloring: MatchColoring,
    pub boundary_color: [u8; 3],
    pub boundary_thickness: u32,
    /// Templates wider than this are downscaled before feature extraction.
    pub template_max_width: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            viewport_width: 800,
            viewport_height: 600,
            match_color: [0, 255, 0],
            match_coloring: MatchColoring::Uniform,
            boundary_color: [0, 255, 0],
            boundary_thickness: 3,
            template_max_width: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpConfig {
    /// Delay between two ticks of the frame pump.
    pub tick_ms: u64,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self { tick_ms: 15 }
    }
}
