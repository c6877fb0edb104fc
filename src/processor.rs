//! Per-frame template detection: features, ratio-tested matches, a robust
//! homography and the annotated side-by-side output.

use std::fmt;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use nalgebra as na;

use crate::config::TrackerConfig;
use crate::features::{FeatureExtractor, FeatureSet, GradientHistogramExtractor};
use crate::matching::{DMatch, Matcher, build_matcher, ratio_test};
use crate::optimization::{find_homography, image_corners, perspective_transform};
use crate::visualization::{draw_matches, draw_polygon};

/// Reference image and its features. Replaced wholesale on reload.
#[derive(Debug, Clone)]
pub struct Template {
    pub image: GrayImage,
    pub features: FeatureSet,
}

impl Template {
    pub fn new(image: GrayImage, extractor: &dyn FeatureExtractor) -> Template {
        let features = extractor.detect_and_compute(&image);
        log::debug!(
            "template {}x{}: {} keypoints",
            image.width(),
            image.height(),
            features.len()
        );
        Template { image, features }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn has_features(&self) -> bool {
        !self.features.is_empty()
    }
}

/// Grayscale copy of `image`, shrunk to `max_width` if it is wider.
pub fn prepare_template_image(image: &DynamicImage, max_width: u32) -> GrayImage {
    let gray = image.to_luma8();
    let (w, h) = gray.dimensions();
    if max_width == 0 || w <= max_width {
        return gray;
    }
    let new_h = ((h as f64 * max_width as f64 / w as f64).round() as u32).max(1);
    imageops::resize(&gray, max_width, new_h, FilterType::Triangle)
}

/// What the pipeline concluded about one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    NoTemplate,
    TemplateWithoutFeatures,
    NoFeatures,
    InsufficientMatches {
        found: usize,
        required: usize,
    },
    ProjectionFailed {
        matches: usize,
    },
    Found {
        matches: usize,
        /// Template corners mapped into the frame.
        corners: [glam::Vec2; 4],
        homography: na::Matrix3<f64>,
    },
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Detection::NoTemplate => write!(f, "no template loaded"),
            Detection::TemplateWithoutFeatures => write!(f, "template has no features"),
            Detection::NoFeatures => write!(f, "no features in frame"),
            Detection::InsufficientMatches { found, required } => {
                write!(f, "insufficient matches: {}/{}", found, required)
            }
            Detection::ProjectionFailed { matches } => {
                write!(f, "projection failed: {} matches", matches)
            }
            Detection::Found { matches, .. } => write!(f, "object found: {} matches", matches),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Side-by-side rendering, or the untouched frame when matching was skipped.
    pub image: RgbImage,
    pub match_count: usize,
    pub detection: Detection,
}

impl FrameReport {
    fn passthrough(frame: &RgbImage, detection: Detection) -> FrameReport {
        FrameReport {
            image: frame.clone(),
            match_count: 0,
            detection,
        }
    }

    pub fn pose_found(&self) -> bool {
        matches!(self.detection, Detection::Found { .. })
    }

    pub fn status(&self) -> String {
        self.detection.to_string()
    }
}

pub struct FrameProcessor {
    config: TrackerConfig,
    extractor: Box<dyn FeatureExtractor>,
    matcher: Box<dyn Matcher>,
}

impl FrameProcessor {
    pub fn new(config: TrackerConfig) -> FrameProcessor {
        let extractor = Box::new(GradientHistogramExtractor::new(config.features.clone()));
        let matcher = build_matcher(&config.matcher);
        FrameProcessor {
            config,
            extractor,
            matcher,
        }
    }

    pub fn with_components(
        config: TrackerConfig,
        extractor: Box<dyn FeatureExtractor>,
        matcher: Box<dyn Matcher>,
    ) -> FrameProcessor {
        FrameProcessor {
            config,
            extractor,
            matcher,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn extractor(&self) -> &dyn FeatureExtractor {
        self.extractor.as_ref()
    }

    /// Downscales `image` to the configured width and extracts its features.
    pub fn build_template(&self, image: &DynamicImage) -> Template {
        let gray = prepare_template_image(image, self.config.render.template_max_width);
        Template::new(gray, self.extractor())
    }

    pub fn process(&self, template: Option<&Template>, frame: &RgbImage) -> FrameReport {
        let Some(template) = template else {
            return FrameReport::passthrough(frame, Detection::NoTemplate);
        };
        if !template.has_features() {
            return FrameReport::passthrough(frame, Detection::TemplateWithoutFeatures);
        }

        let gray = imageops::grayscale(frame);
        let frame_features = self.extractor.detect_and_compute(&gray);
        if frame_features.is_empty() {
            log::debug!("frame without descriptors, passing through");
            return FrameReport::passthrough(frame, Detection::NoFeatures);
        }

        let knn = self.matcher.knn_match(
            &template.features.descriptors,
            &frame_features.descriptors,
            2,
        );
        let good = ratio_test(&knn, self.config.matcher.ratio);
        let found = good.len();
        let required = self.config.matcher.min_match_count;

        let mut annotated = frame.clone();
        let detection = if found < required {
            Detection::InsufficientMatches { found, required }
        } else {
            self.locate(template, &frame_features, &good, &mut annotated)
        };
        log::debug!("{}", detection);

        let image = draw_matches(
            &template.image,
            &template.features.keypoints,
            &annotated,
            &frame_features.keypoints,
            &good,
            &self.config.render,
        );
        FrameReport {
            image,
            match_count: found,
            detection,
        }
    }

    fn locate(
        &self,
        template: &Template,
        frame_features: &FeatureSet,
        good: &[DMatch],
        annotated: &mut RgbImage,
    ) -> Detection {
        let (src, dst): (Vec<glam::Vec2>, Vec<glam::Vec2>) = good
            .iter()
            .filter_map(|m| {
                let q = template.features.keypoints.get(m.query_idx)?;
                let t = frame_features.keypoints.get(m.train_idx)?;
                Some((q.p2d, t.p2d))
            })
            .unzip();
        let matches = good.len();

        let Some(estimate) = find_homography(&src, &dst, &self.config.pose) else {
            return Detection::ProjectionFailed { matches };
        };
        let corners = image_corners(template.width(), template.height());
        let Some(projected) = perspective_transform(&estimate.matrix, &corners) else {
            return Detection::ProjectionFailed { matches };
        };
        let corners = [projected[0], projected[1], projected[2], projected[3]];
        let render = &self.config.render;
        draw_polygon(
            annotated,
            &corners,
            Rgb(render.boundary_color),
            render.boundary_thickness,
        );
        log::trace!(
            "homography with {}/{} inliers",
            estimate.inlier_count(),
            matches
        );
        Detection::Found {
            matches,
            corners,
            homography: estimate.matrix,
        }
    }
}
