mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{buffer_id, camera, eventually, frame, TrackingRecycler};
use framehub::{Diagnostics, FrameHub, FramePipeline, HealthState};

#[tokio::test]
async fn pending_frames_are_replaced_and_released_once() {
    let recycler = TrackingRecycler::new();
    let hub = Arc::new(FrameHub::new());
    let diagnostics = Arc::new(Diagnostics::new());
    let cam = camera("CAM-1");
    let mut pipeline = FramePipeline::new(cam.clone(), hub.clone(), diagnostics.clone(), Duration::from_secs(2));

    let sink = pipeline.sink();
    let mut ids = Vec::new();
    for seq in 0..10 {
        let (id, f) = frame(&recycler, &cam, seq);
        ids.push(id);
        sink.submit(f);
    }

    assert_eq!(recycler.released(), 9);
    assert!(ids[..9].iter().all(|id| recycler.is_released(*id)));
    assert!(!recycler.is_released(ids[9]));
    assert_eq!(diagnostics.snapshot(&cam).dropped_frames, 9);

    pipeline.start().unwrap();
    assert!(eventually(Duration::from_secs(5), || hub.try_get_latest(&cam).is_some()).await);
    let latest = hub.try_get_latest(&cam).unwrap();
    assert_eq!(latest.sequence(), 9);
    assert_eq!(buffer_id(latest.data()), ids[9]);

    pipeline.stop().await;
    drop(latest);
    drop(pipeline);
    drop(hub);
    assert_eq!(recycler.released() as u64, recycler.issued());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fast_producer_never_leaks_or_regresses() {
    let recycler = TrackingRecycler::new();
    let hub = Arc::new(FrameHub::new());
    let diagnostics = Arc::new(Diagnostics::new());
    let cam = camera("CAM-1");
    let mut pipeline = FramePipeline::new(cam.clone(), hub.clone(), diagnostics.clone(), Duration::from_secs(2));
    pipeline.start().unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let hub = hub.clone();
            let cam = cam.clone();
            let recycler = recycler.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                let mut last = 0;
                let mut seen = 0usize;
                while !done.load(Ordering::Acquire) {
                    if let Some(f) = hub.try_get_latest(&cam) {
                        assert!(f.sequence() >= last, "hub regressed");
                        // Held frames must never have been handed back
                        assert!(!recycler.is_released(buffer_id(f.data())));
                        last = f.sequence();
                        seen += 1;
                    }
                }
                seen
            })
        })
        .collect();

    let producer = {
        let sink = pipeline.sink();
        let recycler = recycler.clone();
        let cam = cam.clone();
        std::thread::spawn(move || {
            for seq in 0..5_000 {
                let (_, f) = frame(&recycler, &cam, seq);
                sink.submit(f);
            }
        })
    };
    producer.join().unwrap();

    assert!(eventually(Duration::from_secs(5), || {
        hub.try_get_latest(&cam).map(|f| f.sequence()) == Some(4_999)
    })
    .await);

    done.store(true, Ordering::Release);
    for r in readers {
        r.join().unwrap();
    }

    pipeline.stop().await;
    let snap = diagnostics.snapshot(&cam);
    // Every submission was either delivered or displaced
    assert_eq!(snap.frames_captured + snap.dropped_frames, 5_000);
    assert!(snap.frames_captured >= 1);
    assert_ne!(snap.state, HealthState::Faulted);

    drop(pipeline);
    drop(hub);
    assert_eq!(recycler.released() as u64, recycler.issued());
}

#[tokio::test]
async fn cameras_are_isolated() {
    let recycler = TrackingRecycler::new();
    let hub = Arc::new(FrameHub::new());
    let diagnostics = Arc::new(Diagnostics::new());
    let grace = Duration::from_secs(2);

    let good = camera("CAM-1");
    let bad = camera("CAM-2");
    let mut good_pipeline = FramePipeline::new(good.clone(), hub.clone(), diagnostics.clone(), grace);
    let mut bad_pipeline = FramePipeline::new(bad.clone(), hub.clone(), diagnostics.clone(), grace);
    good_pipeline.start().unwrap();
    bad_pipeline.start().unwrap();

    bad_pipeline.sink().report_fault(
        &bad,
        &framehub::CaptureError::StopTimeout(Duration::from_millis(1)),
    );

    for seq in 0..3 {
        good_pipeline.sink().submit(frame(&recycler, &good, seq).1);
        assert!(eventually(Duration::from_secs(5), || {
            hub.try_get_latest(&good).map(|f| f.sequence()) == Some(seq)
        })
        .await);
    }

    assert_eq!(hub.cameras(), vec![good.clone(), bad.clone()]);
    assert!(hub.try_get_latest(&bad).is_none());

    good_pipeline.stop().await;
    bad_pipeline.stop().await;

    let snapshots = diagnostics.all_snapshots();
    assert_eq!(snapshots[0].state, HealthState::Ok);
    assert_eq!(snapshots[0].frames_captured, 3);
    assert_eq!(snapshots[1].state, HealthState::Faulted);
    assert!(snapshots[1].message.as_deref().unwrap().contains("did not stop"));
}
