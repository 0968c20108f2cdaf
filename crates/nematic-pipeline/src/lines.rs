//! Line segment extraction from a binary edge map.
//!
//! Hough voting is delegated to [`imageproc::hough::detect_lines`], which
//! returns infinite lines in polar form. Each polar line is then clipped
//! to the image and walked at unit steps inside a three-pixel band
//! (the line itself plus one pixel on either side along its normal).
//! Consecutive hits form runs; a run is closed once more than
//! `max_gap` samples in a row miss. Runs long enough along x or y
//! become [`LineSegment`]s and claim every edge pixel within
//! [`CLAIM_RADIUS`] of the segment itself, so a later, weaker line
//! cannot report the same edge again. Claiming along the segment
//! rather than the sampled band matters for oblique lines, whose
//! rasterisation drifts away from the quantised polar line.
//!
//! Lines are visited in descending order of support (the number of
//! samples that hit an edge pixel), ties broken by angle then radius.

use image::GrayImage;
use imageproc::hough::{LineDetectionOptions, PolarLine, detect_lines};

use crate::types::{LineSegment, PipelineError};

/// Stage name reported in [`PipelineError::StageFailure`].
pub const STAGE: &str = "lines";

/// Default minimum extent along x or y for a run to become a segment.
pub const DEFAULT_MIN_SEGMENT_LENGTH: u32 = 2;

/// Default number of consecutive missed samples tolerated inside a run.
pub const DEFAULT_MAX_LINE_GAP: u32 = 2;

/// Non-maximum suppression radius in the Hough accumulator.
pub const SUPPRESSION_RADIUS: u32 = 2;

/// Offsets along the line normal sampled at each step.
const BAND_OFFSETS: [f64; 3] = [0.0, -1.0, 1.0];

/// Minor-axis distance, in pixels, within which an accepted segment
/// claims edge pixels.
pub const CLAIM_RADIUS: u32 = 2;

/// Run-splitting parameters for [`extract_segments_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentParams {
    /// Minimum `max(|dx|, |dy|)` of an accepted segment, in pixels.
    pub min_length: u32,
    /// Consecutive misses allowed before a run is closed.
    pub max_gap: u32,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_SEGMENT_LENGTH,
            max_gap: DEFAULT_MAX_LINE_GAP,
        }
    }
}

/// Extract line segments with the default [`SegmentParams`].
///
/// # Errors
///
/// See [`extract_segments_with`].
pub fn extract_segments(
    edges: &GrayImage,
    vote_threshold: u32,
) -> Result<Vec<LineSegment>, PipelineError> {
    extract_segments_with(edges, vote_threshold, SegmentParams::default())
}

/// Extract line segments from `edges` (non-zero pixels are edges).
///
/// `vote_threshold` is the minimum Hough accumulator count for a
/// candidate line. An edge map without any edge pixel yields an empty
/// vector.
///
/// # Errors
///
/// Returns [`PipelineError::StageFailure`] for stage [`STAGE`] if the
/// image diagonal cannot be represented by the Hough accumulator.
pub fn extract_segments_with(
    edges: &GrayImage,
    vote_threshold: u32,
    params: SegmentParams,
) -> Result<Vec<LineSegment>, PipelineError> {
    let (width, height) = edges.dimensions();
    check_accumulator_geometry(width, height)?;

    let mut grid = EdgeGrid::new(edges);
    if grid.edge_count == 0 {
        tracing::debug!("no edge pixels, skipping line detection");
        return Ok(Vec::new());
    }

    let options = LineDetectionOptions {
        vote_threshold,
        suppression_radius: SUPPRESSION_RADIUS,
    };
    let polar = detect_lines(edges, options);

    let mut candidates: Vec<Candidate> = polar
        .into_iter()
        .map(|line| {
            let samples = band_samples(line, width, height);
            let support = samples
                .iter()
                .filter(|sample| sample.iter().any(|&(x, y)| grid.is_edge(x, y)))
                .count();
            Candidate {
                line,
                samples,
                support,
            }
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.support
            .cmp(&a.support)
            .then(a.line.angle_in_degrees.cmp(&b.line.angle_in_degrees))
            .then(a.line.r.total_cmp(&b.line.r))
    });

    let mut segments = Vec::new();
    for candidate in &candidates {
        walk_runs(&candidate.samples, &mut grid, params, &mut segments);
    }

    tracing::debug!(
        edge_pixels = grid.edge_count,
        polar_lines = candidates.len(),
        segments = segments.len(),
        "line extraction complete",
    );
    Ok(segments)
}

/// Reject images whose squared diagonal overflows `u32`, the type the
/// accumulator geometry is computed in.
fn check_accumulator_geometry(width: u32, height: u32) -> Result<(), PipelineError> {
    width
        .checked_mul(width)
        .zip(height.checked_mul(height))
        .and_then(|(w2, h2)| w2.checked_add(h2))
        .map(|_| ())
        .ok_or_else(|| PipelineError::StageFailure {
            stage: STAGE,
            reason: format!("image diagonal of {width}x{height} overflows the Hough accumulator"),
        })
}

struct Candidate {
    line: PolarLine,
    samples: Vec<Vec<(u32, u32)>>,
    support: usize,
}

/// Edge membership plus the pixels already claimed by accepted segments.
struct EdgeGrid {
    width: u32,
    edge: Vec<bool>,
    claimed: Vec<bool>,
    edge_count: usize,
}

impl EdgeGrid {
    fn new(edges: &GrayImage) -> Self {
        let edge: Vec<bool> = edges.pixels().map(|p| p.0[0] > 0).collect();
        let edge_count = edge.iter().filter(|&&e| e).count();
        let claimed = vec![false; edge.len()];
        Self {
            width: edges.width(),
            edge,
            claimed,
            edge_count,
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn is_edge(&self, x: u32, y: u32) -> bool {
        self.edge[self.index(x, y)]
    }

    fn is_free(&self, x: u32, y: u32) -> bool {
        let i = self.index(x, y);
        self.edge[i] && !self.claimed[i]
    }

    fn claim(&mut self, pixels: &[(u32, u32)]) {
        for &(x, y) in pixels {
            let i = self.index(x, y);
            self.claimed[i] = true;
        }
    }

    /// Claim edge pixels within [`CLAIM_RADIUS`] of the straight line
    /// from `first` to `last`, measured along the minor axis.
    fn claim_along(&mut self, first: (u32, u32), last: (u32, u32)) {
        let width = i64::from(self.width);
        let height = i64::try_from(self.edge.len() / self.width as usize).unwrap_or(i64::MAX);
        let (x0, y0) = (i64::from(first.0), i64::from(first.1));
        let (dx, dy) = (i64::from(last.0) - x0, i64::from(last.1) - y0);
        let steps = dx.abs().max(dy.abs());
        let x_major = dx.abs() >= dy.abs();
        let radius = i64::from(CLAIM_RADIUS);

        for i in 0..=steps {
            #[allow(clippy::cast_precision_loss)]
            let t = if steps == 0 {
                0.0
            } else {
                i as f64 / steps as f64
            };
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
            let (cx, cy) = (
                (x0 as f64 + dx as f64 * t).round() as i64,
                (y0 as f64 + dy as f64 * t).round() as i64,
            );
            for offset in -radius..=radius {
                let (x, y) = if x_major {
                    (cx, cy + offset)
                } else {
                    (cx + offset, cy)
                };
                if x < 0 || y < 0 || x >= width || y >= height {
                    continue;
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let idx = self.index(x as u32, y as u32);
                if self.edge[idx] {
                    self.claimed[idx] = true;
                }
            }
        }
    }
}

/// In-progress run of hits along one line.
struct Run {
    first: (u32, u32),
    last: (u32, u32),
    pixels: Vec<(u32, u32)>,
}

impl Run {
    fn finish(self, grid: &mut EdgeGrid, params: SegmentParams, out: &mut Vec<LineSegment>) {
        let dx = self.first.0.abs_diff(self.last.0);
        let dy = self.first.1.abs_diff(self.last.1);
        if dx.max(dy) < params.min_length {
            return;
        }
        grid.claim(&self.pixels);
        grid.claim_along(self.first, self.last);
        #[allow(clippy::cast_possible_wrap)]
        out.push(LineSegment::new(
            self.first.0 as i32,
            self.first.1 as i32,
            self.last.0 as i32,
            self.last.1 as i32,
        ));
    }
}

/// Split the samples of one line into runs and emit the accepted ones.
fn walk_runs(
    samples: &[Vec<(u32, u32)>],
    grid: &mut EdgeGrid,
    params: SegmentParams,
    out: &mut Vec<LineSegment>,
) {
    let mut current: Option<Run> = None;
    let mut misses = 0u32;

    for sample in samples {
        let hits: Vec<(u32, u32)> = sample
            .iter()
            .copied()
            .filter(|&(x, y)| grid.is_free(x, y))
            .collect();

        if let Some(&hit) = hits.first() {
            misses = 0;
            match current.as_mut() {
                Some(run) => {
                    run.last = hit;
                    run.pixels.extend(hits);
                }
                None => {
                    current = Some(Run {
                        first: hit,
                        last: hit,
                        pixels: hits,
                    });
                }
            }
        } else if current.is_some() {
            misses += 1;
            if misses > params.max_gap {
                if let Some(run) = current.take() {
                    run.finish(grid, params, out);
                }
                misses = 0;
            }
        }
    }

    if let Some(run) = current {
        run.finish(grid, params, out);
    }
}

/// Pixels sampled at each unit step along `line`, clipped to the image.
///
/// The line is `x cos(t) + y sin(t) = r`. It is walked along the
/// direction `(-sin(t), cos(t))`; each step yields the in-bounds pixels
/// at [`BAND_OFFSETS`] along the normal, deduplicated, offset zero first.
fn band_samples(line: PolarLine, width: u32, height: u32) -> Vec<Vec<(u32, u32)>> {
    let (sin, cos) = f64::from(line.angle_in_degrees).to_radians().sin_cos();
    let r = bin_center(line.r);
    let origin = (r * cos, r * sin);
    let direction = (-sin, cos);
    let (w, h) = (f64::from(width), f64::from(height));

    let Some((t_min, t_max)) = clip_to_box(origin, direction, (-0.5, w - 0.5), (-0.5, h - 0.5))
    else {
        return Vec::new();
    };

    #[allow(clippy::cast_possible_truncation)]
    let (start, end) = (t_min.ceil() as i64, t_max.floor() as i64);

    (start..=end)
        .map(|step| {
            #[allow(clippy::cast_precision_loss)]
            let t = step as f64;
            let base = (origin.0 + t * direction.0, origin.1 + t * direction.1);
            let mut pixels: Vec<(u32, u32)> = Vec::with_capacity(BAND_OFFSETS.len());
            for offset in BAND_OFFSETS {
                let x = offset.mul_add(cos, base.0).round();
                let y = offset.mul_add(sin, base.1).round();
                if x < 0.0 || y < 0.0 || x >= w || y >= h {
                    continue;
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let pixel = (x as u32, y as u32);
                if !pixels.contains(&pixel) {
                    pixels.push(pixel);
                }
            }
            pixels
        })
        .collect()
}

/// Centre of the accumulator bin that [`detect_lines`] reports as `r`.
///
/// Votes are binned by truncating toward zero, so bin `r > 0` holds
/// `[r, r + 1)`, bin `r < 0` holds `(r - 1, r]` and bin zero holds
/// `(-1, 1)`.
fn bin_center(r: f32) -> f64 {
    let r = f64::from(r);
    if r > 0.0 {
        r + 0.5
    } else if r < 0.0 {
        r - 0.5
    } else {
        0.0
    }
}

/// Liang-Barsky clip of the parametric line `origin + t * direction`
/// against an axis-aligned box. Returns the `t` interval inside the box.
fn clip_to_box(
    origin: (f64, f64),
    direction: (f64, f64),
    x_range: (f64, f64),
    y_range: (f64, f64),
) -> Option<(f64, f64)> {
    const PARALLEL_EPSILON: f64 = 1e-12;

    let mut t_min = f64::NEG_INFINITY;
    let mut t_max = f64::INFINITY;

    for (p, d, (lo, hi)) in [
        (origin.0, direction.0, x_range),
        (origin.1, direction.1, y_range),
    ] {
        if d.abs() < PARALLEL_EPSILON {
            if p < lo || p > hi {
                return None;
            }
            continue;
        }
        let a = (lo - p) / d;
        let b = (hi - p) / d;
        t_min = t_min.max(a.min(b));
        t_max = t_max.min(a.max(b));
    }

    (t_min <= t_max).then_some((t_min, t_max))
}
