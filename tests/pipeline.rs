use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use facecloak::{
    AcquireError, AdapterConfig, BackendRegistry, CameraConfig, CameraFacing, CameraSource,
    CameraStatus, DetectedBox, DetectionOutcome, DetectorBackend, EffectSettings, FnBackend, Frame, FrameDisposition,
    FrameInfo, PixelFormat, Pipeline, PipelineConfig, Rotation, Size, UiState,
};

fn gray_frame(seq: u64, facing: CameraFacing) -> Arc<Frame> {
    let info = FrameInfo {
        width: 120,
        height: 80,
        format: PixelFormat::Gray8,
        rotation: Rotation::Deg0,
        facing,
    };
    let mut luma = vec![10u8; 120 * 80];
    for row in 20..60 {
        for col in 32..72 {
            luma[row * 120 + col] = 250;
        }
    }
    Arc::new(Frame::new(luma, info, seq).expect("frame"))
}

fn fixed_box_backend(delay: Duration) -> Box<dyn DetectorBackend> {
    Box::new(FnBackend::new("fixed", move |_: &[u8], _: &FrameInfo| {
        thread::sleep(delay);
        Ok(vec![DetectedBox::new(32.0, 20.0, 40.0, 40.0)])
    }))
}

fn pipeline_with(
    registry: BackendRegistry,
    backend: &str,
    throttle: Duration,
    timeout: Duration,
) -> Pipeline {
    let config = PipelineConfig {
        throttle,
        adapter: AdapterConfig {
            timeout,
            ..AdapterConfig::default()
        },
        backend: Some(backend.to_string()),
        ..PipelineConfig::default()
    };
    Pipeline::new(
        Arc::new(registry),
        config,
        UiState::new(EffectSettings::default(), CameraFacing::Back),
    )
}

fn wait_for(mut done: impl FnMut() -> bool, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn at_most_one_detection_in_flight() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut registry = BackendRegistry::new();
    {
        let (active, peak, calls) = (active.clone(), peak.clone(), calls.clone());
        registry.register("counting", move || {
            let (active, peak, calls) = (active.clone(), peak.clone(), calls.clone());
            Ok(Box::new(FnBackend::new(
                "counting",
                move |_: &[u8], _: &FrameInfo| {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    calls.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(30));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(Vec::new())
                },
            )) as Box<dyn DetectorBackend>)
        });
    }

    let mut pipeline = pipeline_with(
        registry,
        "counting",
        Duration::ZERO,
        Duration::from_secs(2),
    );
    pipeline.start().expect("start");

    let mut forwarded = 0;
    for seq in 0..60 {
        if pipeline.offer_frame(gray_frame(seq, CameraFacing::Back), Instant::now())
            == FrameDisposition::Forwarded
        {
            forwarded += 1;
        }
        thread::sleep(Duration::from_millis(3));
    }
    pipeline.shutdown();
    thread::sleep(Duration::from_millis(100));

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(forwarded >= 1);
    assert!(forwarded < 60, "busy frames must be skipped, not queued");
    assert_eq!(calls.load(Ordering::SeqCst), forwarded);
}

#[test]
fn detected_faces_are_rendered_inside_the_preview() {
    let mut pipeline = pipeline_with(
        BackendRegistry::with_builtin(),
        "stub",
        Duration::from_millis(100),
        Duration::from_secs(2),
    );
    pipeline.start().expect("start");

    let frame = gray_frame(1, CameraFacing::Back);
    assert_eq!(
        pipeline.offer_frame(Arc::clone(&frame), Instant::now()),
        FrameDisposition::Forwarded
    );
    assert!(wait_for(|| pipeline.latest_result().is_some(), Duration::from_secs(2)));

    let result = pipeline.latest_result().unwrap();
    assert_eq!(result.frame_sequence, 1);
    assert_eq!(result.boxes(), [DetectedBox::new(32.0, 20.0, 40.0, 40.0)]);

    let screen = Size::new(240.0, 400.0);
    let preview = pipeline.preview_geometry(frame.size(), frame.rotation(), screen);
    assert_eq!(preview.size, Size::new(240.0, 160.0));
    let boxes = pipeline.render_boxes(&preview);
    assert_eq!(boxes.len(), 1);
    let b = boxes[0];
    assert!(b.x >= preview.offset.x && b.right() <= preview.right());
    assert!(b.y >= preview.offset.y && b.bottom() <= preview.bottom());
    assert_eq!((b.x, b.y, b.width, b.height), (64.0, 160.0, 80.0, 80.0));

    let plan = pipeline.overlay_plan(&preview);
    assert_eq!(plan.commands.len(), 1);

    pipeline.set_effect_enabled(false);
    assert!(pipeline.overlay_plan(&preview).is_empty());
    assert_eq!(pipeline.render_boxes(&preview).len(), 1);

    pipeline.shutdown();
}

#[test]
fn switching_cameras_discards_in_flight_results() {
    let mut registry = BackendRegistry::new();
    registry.register("slow", || Ok(fixed_box_backend(Duration::from_millis(200))));
    let mut pipeline = pipeline_with(registry, "slow", Duration::ZERO, Duration::from_secs(2));
    let first = pipeline.start().expect("start");

    assert_eq!(
        pipeline.offer_frame(gray_frame(1, CameraFacing::Back), Instant::now()),
        FrameDisposition::Forwarded
    );
    let second = pipeline.switch_camera(CameraFacing::Front).expect("switch");
    assert_ne!(first, second);
    assert_eq!(pipeline.state().facing, CameraFacing::Front);

    // Frames still arriving from the old camera are refused.
    assert_eq!(
        pipeline.offer_frame(gray_frame(2, CameraFacing::Back), Instant::now()),
        FrameDisposition::WrongCamera
    );

    assert!(wait_for(
        || pipeline.result_slot().counts().1 == 1,
        Duration::from_secs(2)
    ));
    assert!(pipeline.latest_result().is_none());
    let preview = pipeline.preview_geometry(
        Size::new(120.0, 80.0),
        Rotation::Deg0,
        Size::new(120.0, 80.0),
    );
    assert!(pipeline.render_boxes(&preview).is_empty());

    pipeline.shutdown();
}

#[test]
fn detector_timeout_renders_no_faces() {
    let mut registry = BackendRegistry::new();
    registry.register("stalled", || Ok(fixed_box_backend(Duration::from_millis(400))));
    let mut pipeline = pipeline_with(
        registry,
        "stalled",
        Duration::ZERO,
        Duration::from_millis(40),
    );
    pipeline.start().expect("start");

    pipeline.offer_frame(gray_frame(1, CameraFacing::Back), Instant::now());
    assert!(wait_for(|| pipeline.latest_result().is_some(), Duration::from_secs(2)));

    let result = pipeline.latest_result().unwrap();
    assert_eq!(result.outcome, DetectionOutcome::TimedOut);
    let preview = pipeline.preview_geometry(
        Size::new(120.0, 80.0),
        Rotation::Deg0,
        Size::new(120.0, 80.0),
    );
    assert!(pipeline.render_boxes(&preview).is_empty());

    pipeline.shutdown();
}

#[test]
fn unknown_backend_falls_back_to_no_faces() {
    let mut pipeline = pipeline_with(
        BackendRegistry::with_builtin(),
        "does-not-exist",
        Duration::ZERO,
        Duration::from_secs(1),
    );
    pipeline.start().expect("start");

    pipeline.offer_frame(gray_frame(1, CameraFacing::Back), Instant::now());
    assert!(wait_for(|| pipeline.latest_result().is_some(), Duration::from_secs(2)));
    assert_eq!(
        pipeline.latest_result().unwrap().outcome,
        DetectionOutcome::Unavailable
    );

    pipeline.shutdown();
}

fn camera_config(url: &str) -> CameraConfig {
    CameraConfig {
        url: url.to_string(),
        width: 320,
        height: 240,
        target_fps: 30,
        format: PixelFormat::Nv21,
        rotation: Rotation::Deg90,
        facing: CameraFacing::Back,
        seed: Some(7),
    }
}

#[test]
fn synthetic_camera_drives_the_stub_detector() {
    let mut source = CameraSource::new(camera_config("stub://lobby")).expect("source");
    source.connect().expect("connect");

    let mut pipeline = pipeline_with(
        BackendRegistry::with_builtin(),
        "stub",
        Duration::ZERO,
        Duration::from_secs(2),
    );
    pipeline.start().expect("start");

    let frame = Arc::new(source.next_frame().expect("frame"));
    assert_eq!(
        pipeline.offer_frame(Arc::clone(&frame), Instant::now()),
        FrameDisposition::Forwarded
    );
    assert!(wait_for(|| pipeline.latest_result().is_some(), Duration::from_secs(2)));
    assert!(pipeline.latest_result().unwrap().outcome.face_count() >= 1);

    let screen = Size::new(1080.0, 1920.0);
    let preview = pipeline.preview_geometry(frame.size(), frame.rotation(), screen);
    for b in pipeline.render_boxes(&preview) {
        assert!(b.x >= preview.offset.x && b.right() <= preview.right() + 1e-3);
        assert!(b.y >= preview.offset.y && b.bottom() <= preview.bottom() + 1e-3);
    }

    pipeline.shutdown();
    source.disconnect();
}

#[test]
fn permission_denial_retries_through_starting() {
    let pipeline = pipeline_with(
        BackendRegistry::with_builtin(),
        "stub",
        Duration::ZERO,
        Duration::from_secs(1),
    );

    let mut attempts = 0;
    let mut seen = Vec::new();
    let source = pipeline
        .acquire_camera(3, Duration::ZERO, || {
            seen.push(pipeline.state().camera.clone());
            attempts += 1;
            let url = if attempts < 3 { "stub://denied" } else { "stub://lobby" };
            let mut source = CameraSource::new(camera_config(url))?;
            source.connect()?;
            Ok(source)
        })
        .expect("granted on the third attempt");

    assert_eq!(attempts, 3);
    assert_eq!(seen, vec![CameraStatus::Starting; 3]);
    assert_eq!(pipeline.state().camera, CameraStatus::Running);
    assert!(source.is_healthy());
}

#[test]
fn permission_denial_surfaces_after_retries_run_out() {
    let pipeline = pipeline_with(
        BackendRegistry::with_builtin(),
        "stub",
        Duration::ZERO,
        Duration::from_secs(1),
    );

    let mut attempts = 0;
    let err = pipeline
        .acquire_camera(1, Duration::ZERO, || {
            attempts += 1;
            let mut source = CameraSource::new(camera_config("stub://denied"))?;
            source.connect()?;
            Ok(source)
        })
        .unwrap_err();

    assert_eq!(attempts, 2);
    assert_eq!(
        err.downcast_ref::<AcquireError>(),
        Some(&AcquireError::PermissionDenied)
    );
    assert_eq!(pipeline.state().camera, CameraStatus::PermissionDenied);
    assert_eq!(pipeline.state().camera.retry(), Some(CameraStatus::Starting));
}
