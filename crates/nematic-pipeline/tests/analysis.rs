//! End-to-end properties of the analysis pipeline.

#![allow(clippy::unwrap_used)]

use nematic_pipeline::{
    ClassificationConfig, Phase, PipelineError, RgbaImage, analyze_image, process, process_staged,
};

fn encode_png(img: &RgbaImage) -> Vec<u8> {
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(
        encoder,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::Rgba8,
    )
    .unwrap();
    buf
}

fn vertical_stripes(width: u32, height: u32, period: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, _| {
        if (x / period) % 2 == 0 {
            image::Rgba([20, 20, 20, 255])
        } else {
            image::Rgba([235, 235, 235, 255])
        }
    })
}

/// Deterministic pseudo-random speckle.
fn speckle(width: u32, height: u32, seed: u32) -> RgbaImage {
    let mut state = seed;
    RgbaImage::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let v = (state >> 24) as u8;
        image::Rgba([v, v, v, 255])
    })
}

#[test]
fn repeated_runs_are_identical() {
    let png = encode_png(&speckle(64, 48, 7));
    let config = ClassificationConfig::default();
    let a = process_staged(&png, &config).unwrap();
    let b = process_staged(&png, &config).unwrap();
    assert_eq!(a.grayscale, b.grayscale);
    assert_eq!(a.smoothed, b.smoothed);
    assert_eq!(a.binary, b.binary);
    assert_eq!(a.edges, b.edges);
    assert_eq!(a.lines, b.lines);
    assert_eq!(a.features, b.features);
    assert_eq!(a.classification, b.classification);
}

#[test]
fn uniform_image_has_no_lines_and_is_anomalous() {
    let img = RgbaImage::from_pixel(64, 64, image::Rgba([90, 120, 200, 255]));
    let analysis = analyze_image(&img, &ClassificationConfig::default()).unwrap();

    assert!(analysis.lines.is_empty());
    assert_eq!(analysis.features.line_count, 0);
    assert!(analysis.features.avg_length.abs() < f64::EPSILON);
    assert!(analysis.features.angle_variance.abs() < f64::EPSILON);
    assert_eq!(analysis.classification.phase, Phase::Anomaly);
    assert_eq!(
        analysis.classification.reasons[0],
        "Lines detected (0) is less than minimum (10)"
    );
}

#[test]
fn stripe_boundaries_become_long_vertical_segments() {
    let img = vertical_stripes(96, 96, 8);
    let analysis = analyze_image(&img, &ClassificationConfig::default()).unwrap();

    assert!(
        analysis.lines.len() >= 5,
        "expected several segments, got {:?}",
        analysis.lines,
    );
    for seg in &analysis.lines {
        let (x1, _) = seg.start();
        let (x2, _) = seg.end();
        assert!((x1 - x2).abs() <= 3, "segment not vertical: {seg:?}");
        assert!(seg.length() >= 50.0, "segment too short: {seg:?}");
    }
    assert!(analysis.features.avg_length >= 50.0);
}

#[test]
fn outputs_respect_value_ranges() {
    for seed in [1, 2, 3] {
        let analysis = analyze_image(&speckle(48, 48, seed), &ClassificationConfig::default()).unwrap();
        let f = analysis.features;
        assert!(f.avg_length >= 0.0);
        assert!(f.angle_variance >= 0.0);
        assert!([0, 33, 67, 100].contains(&analysis.classification.confidence));
        assert_eq!(
            analysis.classification.phase == Phase::Normal,
            analysis.classification.reasons.is_empty()
        );
        for seg in &analysis.lines {
            let angle = seg.angle();
            assert!((0.0..360.0).contains(&angle));
        }
        assert!(analysis.binary.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert!(analysis.edges.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }
}

#[test]
fn invalid_config_fails_before_decoding() {
    let config = ClassificationConfig {
        line_detection_threshold: 0,
        ..ClassificationConfig::default()
    };
    let result = process(b"not an image", &config);
    assert!(matches!(
        result,
        Err(PipelineError::InvalidInput {
            parameter: "line_detection_threshold",
            ..
        })
    ));
}

#[test]
fn oversized_smoothing_kernel_is_rejected() {
    let config = ClassificationConfig {
        smoothing_kernel_size: u32::MAX,
        ..ClassificationConfig::default()
    };
    let result = analyze_image(&vertical_stripes(16, 16, 4), &config);
    assert!(matches!(
        result,
        Err(PipelineError::InvalidInput {
            parameter: "smoothing_kernel_size",
            ..
        })
    ));
}

#[test]
fn largest_smoothing_kernel_runs_on_small_image() {
    let config = ClassificationConfig {
        smoothing_kernel_size: ClassificationConfig::MAX_SMOOTHING_KERNEL_SIZE,
        ..ClassificationConfig::default()
    };
    let analysis = analyze_image(&vertical_stripes(24, 20, 4), &config).unwrap();
    assert_eq!(analysis.smoothed.dimensions(), (24, 20));
}

#[test]
fn even_kernel_sizes_match_next_odd() {
    let img = speckle(40, 40, 11);
    let even = ClassificationConfig {
        smoothing_kernel_size: 4,
        adaptive_block_size: 6,
        ..ClassificationConfig::default()
    };
    let odd = ClassificationConfig {
        smoothing_kernel_size: 5,
        adaptive_block_size: 7,
        ..ClassificationConfig::default()
    };
    let a = analyze_image(&img, &even).unwrap();
    let b = analyze_image(&img, &odd).unwrap();
    assert_eq!(a.smoothed, b.smoothed);
    assert_eq!(a.binary, b.binary);
    assert_eq!(a.lines, b.lines);
}

#[test]
fn config_survives_json_round_trip_into_pipeline() {
    let json = r#"{"min_lines": 1, "line_detection_threshold": 30}"#;
    let config: ClassificationConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.adaptive_block_size, ClassificationConfig::DEFAULT_ADAPTIVE_BLOCK_SIZE);
    let analysis = analyze_image(&vertical_stripes(64, 64, 8), &config).unwrap();
    assert!(analysis.classification.checks.line_count);
}
