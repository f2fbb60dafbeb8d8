//! End-to-end coordinator behavior against a scripted backend.
//!
//! Timer tests run with paused time: `step()` parks on the event channel
//! and tokio auto-advances the clock to the next pending sleep.

mod common;

use common::{queue_detection, result_with_faces, Harness};
use pure_glance_lib::detector::BackendState;
use pure_glance_lib::protocol::{BoundingBox, Detection, Inbound, JobId, Outbound};
use pure_glance_lib::settings::Settings;
use std::time::Duration;
use tokio::time::Instant;

// ── Queue and dispatch ──────────────────────────────────────────────

#[tokio::test]
async fn jobs_are_dispatched_one_at_a_time_in_arrival_order() {
    let mut h = Harness::new("fifo");

    for (i, id) in ["pg-1", "pg-2", "pg-3"].iter().enumerate() {
        h.handle.send(queue_detection(id, i as u32 + 1)).unwrap();
    }
    h.coordinator.process_pending().await;

    assert_eq!(h.backend.lock().unwrap().starts, 1);
    assert_eq!(h.submitted(), ["pg-1"]);
    assert_eq!(h.queued(), ["pg-2", "pg-3"]);
    assert_eq!(h.coordinator.in_flight(), Some(&JobId::new("pg-1")));

    h.deliver(result_with_faces("pg-1", 0)).await;
    assert_eq!(h.submitted(), ["pg-1", "pg-2"]);

    h.deliver(result_with_faces("pg-2", 0)).await;
    h.deliver(result_with_faces("pg-3", 0)).await;
    assert_eq!(h.submitted(), ["pg-1", "pg-2", "pg-3"]);
    assert!(h.queued().is_empty());
    assert_eq!(h.coordinator.in_flight(), None);
}

#[tokio::test]
async fn job_without_image_or_tab_is_not_queued() {
    let mut h = Harness::new("no-payload");

    h.send(Inbound::QueueDetection {
        id: JobId::new("pg-1"),
        data_url: None,
        url: Some(String::new()),
        orig_width: None,
        orig_height: None,
        sender_tab_id: Some(1),
    })
    .await;
    h.send(Inbound::QueueDetection {
        id: JobId::new("pg-2"),
        data_url: Some("data:image/png;base64,AAAA".to_string()),
        url: None,
        orig_width: None,
        orig_height: None,
        sender_tab_id: None,
    })
    .await;

    assert!(h.queued().is_empty());
    assert_eq!(h.backend.lock().unwrap().starts, 0);
}

#[tokio::test]
async fn disabled_extension_drops_new_jobs() {
    let mut h = Harness::new("disabled");
    h.save_settings(&Settings {
        is_enabled: false,
        ..Settings::default()
    })
    .await;

    h.queue("pg-1", 1).await;

    assert!(h.queued().is_empty());
    assert!(h.submitted().is_empty());
    assert_eq!(h.backend.lock().unwrap().starts, 0);
}

// ── Classification and counters ─────────────────────────────────────

#[tokio::test]
async fn crowded_thumbnail_is_hidden_on_its_origin_tab() {
    let mut h = Harness::new("hide-count");
    h.queue("pg-1", 4).await;
    h.queue("pg-2", 9).await;
    h.drain_outbound();

    h.deliver(result_with_faces("pg-1", 1)).await;
    assert!(h.drain_outbound().is_empty());

    h.deliver(result_with_faces("pg-2", 3)).await;
    assert_eq!(
        h.drain_outbound(),
        vec![
            Outbound::HiddenVideoCount { count: 1, tab_id: 9 },
            Outbound::HideVideo {
                tab_id: 9,
                id: JobId::new("pg-2")
            },
        ]
    );
    assert_eq!(h.coordinator.hidden_count(9), 1);
    assert_eq!(h.coordinator.hidden_count(4), 0);
}

#[tokio::test]
async fn large_face_hides_unless_area_check_is_off() {
    let mut h = Harness::new("hide-area");
    // 160x90 on a 320x180 thumbnail: a quarter of the frame.
    let big_face = |id: &str| pure_glance_lib::protocol::DetectionResult {
        detections: vec![Detection::from(BoundingBox::new(0.0, 0.0, 160.0, 90.0))],
        ..result_with_faces(id, 0)
    };

    h.queue("pg-1", 2).await;
    h.deliver(big_face("pg-1")).await;
    assert_eq!(h.coordinator.hidden_count(2), 1);

    h.save_settings(&Settings {
        is_area_threshold_enabled: false,
        ..Settings::default()
    })
    .await;
    h.queue("pg-2", 2).await;
    h.drain_outbound();
    h.deliver(big_face("pg-2")).await;

    assert!(h.drain_outbound().is_empty());
    assert_eq!(h.coordinator.hidden_count(2), 1);
}

#[tokio::test]
async fn unknown_and_repeated_results_are_ignored() {
    let mut h = Harness::new("stale-result");
    h.queue("pg-1", 5).await;
    h.queue("pg-2", 5).await;
    h.drain_outbound();

    h.deliver(result_with_faces("pg-ghost", 6)).await;
    assert!(h.drain_outbound().is_empty());
    // A stray result doesn't release the real in-flight job.
    assert_eq!(h.coordinator.in_flight(), Some(&JobId::new("pg-1")));

    h.deliver(result_with_faces("pg-1", 3)).await;
    h.deliver(result_with_faces("pg-1", 3)).await;

    assert_eq!(h.coordinator.hidden_count(5), 1);
    assert_eq!(h.coordinator.owner_of(&JobId::new("pg-1")), None);
    assert_eq!(h.submitted(), ["pg-1", "pg-2"]);
}

#[tokio::test]
async fn navigation_on_a_video_site_resets_the_tab() {
    let mut h = Harness::new("navigation");
    h.queue("pg-1", 3).await;
    h.deliver(result_with_faces("pg-1", 4)).await;
    assert_eq!(h.coordinator.hidden_count(3), 1);
    h.drain_outbound();

    h.send(Inbound::HistoryStateUpdated {
        tab_id: 3,
        frame_id: 2,
        url: "https://www.youtube.com/watch?v=abc".to_string(),
    })
    .await;
    h.send(Inbound::HistoryStateUpdated {
        tab_id: 3,
        frame_id: 0,
        url: "https://example.com/watch".to_string(),
    })
    .await;
    assert!(h.drain_outbound().is_empty());
    assert_eq!(h.coordinator.hidden_count(3), 1);

    h.send(Inbound::HistoryStateUpdated {
        tab_id: 3,
        frame_id: 0,
        url: "https://www.youtube.com/watch?v=abc".to_string(),
    })
    .await;
    assert_eq!(
        h.drain_outbound(),
        vec![
            Outbound::HiddenVideoCount { count: 0, tab_id: 3 },
            Outbound::UrlChanged { tab_id: 3 },
        ]
    );
    assert_eq!(h.coordinator.hidden_count(3), 0);
}

#[tokio::test]
async fn popup_count_queries_and_reset() {
    let mut h = Harness::new("count-query");
    h.queue("pg-1", 7).await;
    h.deliver(result_with_faces("pg-1", 3)).await;
    h.drain_outbound();

    h.send(Inbound::GetHiddenVideoCount {
        tab_id: Some(7),
        request_id: Some(9),
    })
    .await;
    h.send(Inbound::GetHiddenVideoCount {
        tab_id: None,
        request_id: Some(10),
    })
    .await;
    assert_eq!(
        h.drain_outbound(),
        vec![
            Outbound::HiddenVideoCountResponse {
                request_id: Some(9),
                tab_id: Some(7),
                count: 1
            },
            Outbound::HiddenVideoCountResponse {
                request_id: Some(10),
                tab_id: None,
                count: 0
            },
        ]
    );

    let (count, running) = tokio::join!(h.handle.hidden_video_count(7), h.coordinator.step());
    assert_eq!(count.unwrap(), 1);
    assert!(running);

    h.send(Inbound::ResetCount {
        sender_tab_id: Some(7),
    })
    .await;
    assert_eq!(
        h.drain_outbound(),
        vec![Outbound::HiddenVideoCount { count: 0, tab_id: 7 }]
    );

    h.send(Inbound::TabRemoved { tab_id: 7 }).await;
    assert_eq!(h.coordinator.hidden_count(7), 0);
}

// ── Settings messages ───────────────────────────────────────────────

#[tokio::test]
async fn settings_can_be_read_and_updated() {
    let mut h = Harness::new("settings-messages");

    h.send(Inbound::GetSettings {
        request_id: Some(1),
    })
    .await;
    assert_eq!(
        h.drain_outbound(),
        vec![Outbound::Settings {
            request_id: Some(1),
            settings: Settings::default()
        }]
    );

    let values = serde_json::json!({ "threshold": "7.5", "isFaceCountEnabled": false });
    h.send(Inbound::SetSettings {
        request_id: Some(2),
        values: values.as_object().cloned().unwrap(),
    })
    .await;
    let Some(Outbound::Settings { settings, .. }) = h.drain_outbound().pop() else {
        panic!("expected settings reply");
    };
    assert_eq!(settings.threshold, 7.5);
    assert!(!settings.is_face_count_enabled);

    let values = serde_json::json!({ "nonsense": 1 });
    h.send(Inbound::SetSettings {
        request_id: Some(3),
        values: values.as_object().cloned().unwrap(),
    })
    .await;
    let out = h.drain_outbound();
    assert!(matches!(
        out.as_slice(),
        [Outbound::SettingsError {
            request_id: Some(3),
            ..
        }]
    ));
}

// ── Backend lifecycle ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn idle_backend_is_released_after_quiet_period() {
    let mut h = Harness::new("idle-release");

    h.queue("pg-1", 1).await;
    h.deliver(result_with_faces("pg-1", 0)).await;
    assert!(h.coordinator.idle_timer_armed());

    let quiet_since = Instant::now();
    assert!(h.coordinator.step().await);

    assert!(quiet_since.elapsed() >= Duration::from_secs(25));
    assert_eq!(h.coordinator.backend_state(), BackendState::Uninitialized);
    assert_eq!(h.backend.lock().unwrap().releases, 1);

    // New demand brings it back.
    h.queue("pg-2", 1).await;
    assert_eq!(h.backend.lock().unwrap().starts, 2);
    assert_eq!(h.coordinator.backend_state(), BackendState::Ready);
    assert_eq!(h.submitted(), ["pg-1", "pg-2"]);
}

#[tokio::test(start_paused = true)]
async fn new_work_cancels_pending_idle_release() {
    let mut h = Harness::new("idle-cancel");

    h.queue("pg-1", 1).await;
    h.deliver(result_with_faces("pg-1", 0)).await;
    assert!(h.coordinator.idle_timer_armed());

    tokio::time::advance(Duration::from_secs(20)).await;
    h.queue("pg-2", 1).await;
    assert!(!h.coordinator.idle_timer_armed());

    tokio::time::advance(Duration::from_secs(10)).await;
    h.coordinator.process_pending().await;

    assert_eq!(h.backend.lock().unwrap().releases, 0);
    assert_eq!(h.coordinator.backend_state(), BackendState::Ready);
    assert_eq!(h.coordinator.in_flight(), Some(&JobId::new("pg-2")));
}

#[tokio::test(start_paused = true)]
async fn failed_start_is_retried_with_backoff() {
    let mut h = Harness::new("retry");
    h.backend.lock().unwrap().failing_starts = 2;

    h.queue("pg-1", 1).await;
    assert_eq!(h.coordinator.backend_state(), BackendState::Unavailable);
    assert_eq!(h.queued(), ["pg-1"]);

    let failed_at = Instant::now();
    assert!(h.coordinator.step().await);
    assert_eq!(h.backend.lock().unwrap().starts, 2);
    assert_eq!(h.coordinator.backend_state(), BackendState::Unavailable);

    assert!(h.coordinator.step().await);
    h.coordinator.process_pending().await;

    assert!(failed_at.elapsed() >= Duration::from_millis(1500));
    assert_eq!(h.backend.lock().unwrap().starts, 3);
    assert_eq!(h.coordinator.backend_state(), BackendState::Ready);
    assert_eq!(h.submitted(), ["pg-1"]);
    assert!(h.queued().is_empty());
}

#[tokio::test(start_paused = true)]
async fn crashed_backend_gives_the_job_back_to_the_queue_head() {
    let mut h = Harness::new("crash");
    h.queue("pg-1", 1).await;
    h.queue("pg-2", 1).await;

    let current = h.backend.lock().unwrap().handles.last().cloned().unwrap();
    current.backend_exited("surface crashed").unwrap();
    h.coordinator.process_pending().await;

    assert_eq!(h.coordinator.backend_state(), BackendState::Unavailable);
    assert_eq!(h.coordinator.in_flight(), None);
    assert_eq!(h.queued(), ["pg-1", "pg-2"]);
    assert_eq!(h.backend.lock().unwrap().releases, 1);

    assert!(h.coordinator.step().await);
    h.coordinator.process_pending().await;

    assert_eq!(h.submitted(), ["pg-1", "pg-1"]);
    assert_eq!(h.queued(), ["pg-2"]);
    assert_eq!(h.coordinator.owner_of(&JobId::new("pg-1")), Some(1));
}

#[tokio::test(start_paused = true)]
async fn rejected_dispatch_puts_the_job_back_at_the_head() {
    let mut h = Harness::new("submit-rejected");
    h.backend.lock().unwrap().failing_submits = 1;

    h.handle.send(queue_detection("pg-a", 1)).unwrap();
    h.handle.send(queue_detection("pg-b", 1)).unwrap();
    h.coordinator.process_pending().await;

    assert_eq!(h.coordinator.backend_state(), BackendState::Unavailable);
    assert_eq!(h.queued(), ["pg-a", "pg-b"]);
    assert_eq!(h.coordinator.in_flight(), None);
    assert_eq!(h.coordinator.owner_of(&JobId::new("pg-a")), None);
    assert!(h.submitted().is_empty());
    assert_eq!(h.backend.lock().unwrap().releases, 1);

    assert!(h.coordinator.step().await);
    h.coordinator.process_pending().await;

    assert_eq!(h.coordinator.backend_state(), BackendState::Ready);
    assert_eq!(h.backend.lock().unwrap().starts, 2);
    assert_eq!(h.submitted(), ["pg-a"]);
    assert_eq!(h.queued(), ["pg-b"]);
    assert_eq!(h.coordinator.owner_of(&JobId::new("pg-a")), Some(1));
}

#[tokio::test(start_paused = true)]
async fn exit_of_a_released_backend_instance_is_ignored() {
    let mut h = Harness::new("stale-exit");
    h.queue("pg-1", 1).await;
    h.deliver(result_with_faces("pg-1", 0)).await;
    assert!(h.coordinator.step().await);
    assert_eq!(h.coordinator.backend_state(), BackendState::Uninitialized);

    let old = h.backend.lock().unwrap().handles[0].clone();
    h.queue("pg-2", 1).await;
    assert_eq!(h.backend.lock().unwrap().starts, 2);

    old.backend_exited("old surface exited").unwrap();
    h.coordinator.process_pending().await;

    assert_eq!(h.coordinator.backend_state(), BackendState::Ready);
    assert_eq!(h.coordinator.in_flight(), Some(&JobId::new("pg-2")));
}

#[tokio::test]
async fn shutdown_stops_the_loop() {
    let mut h = Harness::new("shutdown");
    h.queue("pg-1", 1).await;

    h.handle.shutdown().unwrap();
    assert!(!h.coordinator.step().await);

    h.coordinator.stop().await;
    assert_eq!(h.coordinator.backend_state(), BackendState::Uninitialized);
    assert_eq!(h.backend.lock().unwrap().releases, 1);
}
