use std::time::{Duration, Instant};

use facecloak::{
    CameraFacing, CoordinateTransformer, DetectedBox, DetectionGate, FitMode, MirrorPolicy,
    PreviewGeometry, Rotation, Size,
};

const ROTATIONS: [Rotation; 4] = [
    Rotation::Deg0,
    Rotation::Deg90,
    Rotation::Deg180,
    Rotation::Deg270,
];

const POLICIES: [MirrorPolicy; 3] = [
    MirrorPolicy::LandscapeFrontOnly,
    MirrorPolicy::FrontAlways,
    MirrorPolicy::Never,
];

fn sample_boxes(frame: Size) -> Vec<DetectedBox> {
    let mut boxes = Vec::new();
    for &fx in &[-0.5f32, 0.0, 0.3, 0.9, 1.2] {
        for &fw in &[0.0f32, 0.1, 0.5, 1.5] {
            boxes.push(DetectedBox::new(
                fx * frame.width,
                fx * frame.height,
                fw * frame.width,
                fw * frame.height,
            ));
        }
    }
    boxes.push(DetectedBox::new(-1e6, -1e6, 3e6, 3e6));
    boxes
}

#[test]
fn transformed_boxes_never_leave_the_preview() {
    let frames = [
        Size::new(1280.0, 720.0),
        Size::new(720.0, 1280.0),
        Size::new(640.0, 640.0),
        Size::new(1.0, 1.0),
    ];
    let screens = [Size::new(1080.0, 1920.0), Size::new(1920.0, 1080.0)];

    for policy in POLICIES {
        let transformer = CoordinateTransformer::new(policy);
        for frame in frames {
            for screen in screens {
                for fit in [FitMode::Contain, FitMode::Cover] {
                    let preview = PreviewGeometry::fit_camera(frame, screen, fit);
                    for rotation in ROTATIONS {
                        for facing in [CameraFacing::Front, CameraFacing::Back] {
                            for b in sample_boxes(frame) {
                                let t = transformer.transform(&b, frame, rotation, facing, &preview);
                                let eps = 1e-2;
                                assert!(t.width >= 0.0 && t.height >= 0.0);
                                assert!(t.x >= preview.offset.x - eps, "{:?} {:?}", t, preview);
                                assert!(t.y >= preview.offset.y - eps, "{:?} {:?}", t, preview);
                                assert!(t.right() <= preview.right() + eps, "{:?} {:?}", t, preview);
                                assert!(t.bottom() <= preview.bottom() + eps, "{:?} {:?}", t, preview);
                            }
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn transform_is_deterministic() {
    let transformer = CoordinateTransformer::default();
    let frame = Size::new(1280.0, 720.0);
    let preview = PreviewGeometry::fit_camera(frame, Size::new(1080.0, 1920.0), FitMode::Contain);
    let b = DetectedBox::new(100.0, 300.0, 200.0, 250.0);
    let first = transformer.transform(&b, frame, Rotation::Deg90, CameraFacing::Front, &preview);
    for _ in 0..10 {
        let again = transformer.transform(&b, frame, Rotation::Deg90, CameraFacing::Front, &preview);
        assert_eq!(first, again);
    }
}

#[test]
fn contain_fit_preserves_aspect_and_centers() {
    let natives = [
        Size::new(480.0, 640.0),
        Size::new(720.0, 1280.0),
        Size::new(1000.0, 1000.0),
        Size::new(300.0, 1200.0),
    ];
    let screens = [
        Size::new(1080.0, 1920.0),
        Size::new(400.0, 800.0),
        Size::new(1920.0, 1080.0),
    ];
    for native in natives {
        for screen in screens {
            let g = PreviewGeometry::fit(native, screen, FitMode::Contain);
            assert!((g.size.width / g.size.height - native.aspect()).abs() < 1e-3);
            assert!(g.size.width <= screen.width + 1e-3);
            assert!(g.size.height <= screen.height + 1e-3);
            let fills_width = (g.size.width - screen.width).abs() < 1e-3;
            let fills_height = (g.size.height - screen.height).abs() < 1e-3;
            assert!(fills_width || fills_height);
            assert!((g.offset.x * 2.0 + g.size.width - screen.width).abs() < 1e-3);
            assert!((g.offset.y * 2.0 + g.size.height - screen.height).abs() < 1e-3);
        }
    }
}

#[test]
fn cover_fit_fills_the_screen() {
    let screen = Size::new(400.0, 800.0);
    let g = PreviewGeometry::fit(Size::new(600.0, 800.0), screen, FitMode::Cover);
    assert!(g.size.width >= screen.width && g.size.height >= screen.height);
    assert!(g.offset.x <= 0.0 && g.offset.y <= 0.0);
}

/// Drive the gate with a synthetic clock: frames every `frame_ms`, each admitted
/// detection finishing `latency_ms` later.
fn simulate(window_ms: u64, frame_ms: u64, interval_ms: u64, latency_ms: u64) -> u64 {
    let base = Instant::now();
    let gate = DetectionGate::new(Duration::from_millis(interval_ms));
    let mut pending = None;
    let mut t = 0;
    while t < window_ms {
        let now = base + Duration::from_millis(t);
        if let Some((done_at, permit)) = pending.take() {
            if now >= done_at {
                drop(permit);
            } else {
                pending = Some((done_at, permit));
            }
        }
        if let Some(permit) = gate.try_admit(now) {
            pending = Some((now + Duration::from_millis(latency_ms), permit));
        }
        t += frame_ms;
    }
    gate.stats().forwarded
}

#[test]
fn detection_rate_is_bounded_by_interval_and_latency() {
    let window = 3_000;
    for (frame_ms, interval_ms, latency_ms) in [
        (33, 100, 10),
        (33, 100, 250),
        (16, 100, 100),
        (5, 50, 7),
        (33, 0, 60),
    ] {
        let forwarded = simulate(window, frame_ms, interval_ms, latency_ms);
        let slowest = interval_ms.max(latency_ms).max(1);
        let bound = window.div_ceil(slowest);
        assert!(
            forwarded <= bound,
            "{} forwarded > {} (frame {}ms, interval {}ms, latency {}ms)",
            forwarded,
            bound,
            frame_ms,
            interval_ms,
            latency_ms
        );
        assert!(forwarded >= 1);
    }
}

#[test]
fn front_camera_landscape_buffer_is_mirrored() {
    let frame = Size::new(1280.0, 720.0);
    let preview = PreviewGeometry::new(Default::default(), Size::new(720.0, 1280.0));
    let b = DetectedBox::new(100.0, 200.0, 300.0, 400.0);
    let t = CoordinateTransformer::default().transform(
        &b,
        frame,
        Rotation::Deg90,
        CameraFacing::Front,
        &preview,
    );
    assert_eq!((t.x, t.y, t.width, t.height), (320.0, 200.0, 300.0, 400.0));
}
