//! Queue behaviour against the JSON file store.

mod common;

use std::collections::HashMap;

use chrono::Duration;

use common::TestHarness;
use vidqueue::config::QueueConfig;
use vidqueue::store::PersistentStore;
use vidqueue::{GenerationParams, JobStatus, StatusUpdate};

#[test]
fn test_state_survives_reopen() {
    let harness = TestHarness::new();
    let queue = harness.open_queue();

    let a = queue.add_job(
        "The story of Hanuman",
        "indian_mythology",
        GenerationParams::default(),
    );
    let b = queue.add_job(
        "Quantum physics explained",
        "science",
        GenerationParams::for_domain("science"),
    );
    let c = queue.add_job("AI and the future", "technology", GenerationParams::default());

    queue.claim_next_job("worker-1").unwrap();
    queue.update_job_status(
        &a,
        JobStatus::Completed,
        StatusUpdate::new()
            .progress(1.0)
            .result(serde_json::json!({"scenes": 6})),
    );
    queue.map_job_to_video(&a, "/videos/hanuman.mp4");
    queue.cancel_job(&c);

    let before: HashMap<String, _> = queue
        .list_jobs(None)
        .into_iter()
        .map(|job| (job.job_id.clone(), job))
        .collect();
    drop(queue);

    let reopened = harness.open_queue();
    let after: HashMap<String, _> = reopened
        .list_jobs(None)
        .into_iter()
        .map(|job| (job.job_id.clone(), job))
        .collect();

    assert_eq!(before, after);
    assert_eq!(
        reopened.get_video_for_job(&a).as_deref(),
        Some("/videos/hanuman.mp4")
    );
    assert_eq!(
        reopened.get_job(&b).unwrap().params.img_style_prompt,
        "professional, science-themed, high quality"
    );
    assert_eq!(reopened.get_next_job().unwrap().job_id, b);
}

#[test]
fn test_store_snapshot_matches_queue() {
    let harness = TestHarness::new();
    let queue = harness.open_queue();
    let a = queue.add_job("Ancient Rome", "history", GenerationParams::default());
    queue.map_job_to_video(&a, "/videos/rome.mp4");

    let snapshot = harness.store().load().unwrap();
    assert_eq!(snapshot.jobs.len(), 1);
    assert_eq!(snapshot.jobs[&a], queue.get_job(&a).unwrap());
    assert_eq!(snapshot.videos[&a], "/videos/rome.mp4");
}

#[test]
fn test_jobs_file_layout() {
    let harness = TestHarness::new();
    let queue = harness.open_queue();
    let a = queue.add_job("Ancient Rome", "history", GenerationParams::default());

    let json = harness.read_jobs_json();
    let record = &json[&a];
    assert_eq!(record["job_id"], a.as_str());
    assert_eq!(record["topic"], "Ancient Rome");
    assert_eq!(record["status"], "queued");
    assert_eq!(record["voice"], "alloy");
    assert_eq!(record["script_length"], "medium");
    assert!(record["created_at"].as_str().unwrap().contains('T'));
    assert!(harness.mapping_path().exists());
}

#[test]
fn test_fifo_order_survives_reopen() {
    let harness = TestHarness::new();
    let queue = harness.open_queue();
    let ids: Vec<String> = (0..5)
        .map(|i| queue.add_job(&format!("topic {}", i), "tech", GenerationParams::default()))
        .collect();
    drop(queue);

    let reopened = harness.open_queue_with(QueueConfig {
        max_concurrent_jobs: 10,
        ..harness.queue_config()
    });
    let claimed: Vec<String> = (0..5)
        .map(|_| reopened.claim_next_job("worker-1").unwrap().job_id)
        .collect();
    assert_eq!(claimed, ids);
}

#[test]
fn test_missing_video_file_is_reported() {
    let harness = TestHarness::new();
    let queue = harness.open_queue();

    let job1 = queue.add_job("Volcanoes", "science", GenerationParams::default());
    let job2 = queue.add_job("Glaciers", "science", GenerationParams::default());
    for id in [&job1, &job2] {
        queue.update_job_status(id, JobStatus::Processing, StatusUpdate::new());
        queue.update_job_status(id, JobStatus::Completed, StatusUpdate::new().progress(1.0));
    }

    let video1 = harness.write_video("job1.mp4");
    let video2 = harness.write_video("job2.mp4");
    queue.map_job_to_video(&job1, &video1.to_string_lossy());
    queue.map_job_to_video(&job2, &video2.to_string_lossy());
    std::fs::remove_file(&video1).unwrap();

    let videos = queue.get_completed_jobs_with_videos(20);
    assert_eq!(videos.len(), 2);
    let entry1 = videos.iter().find(|v| v.job_id == job1).unwrap();
    let entry2 = videos.iter().find(|v| v.job_id == job2).unwrap();
    assert!(!entry1.video_exists);
    assert!(entry2.video_exists);
    assert_eq!(entry1.topic, "Volcanoes");

    assert_eq!(queue.get_completed_jobs_with_videos(1).len(), 1);
}

#[test]
fn test_unfinished_jobs_are_not_listed_as_videos() {
    let harness = TestHarness::new();
    let queue = harness.open_queue();
    let id = queue.add_job("Volcanoes", "science", GenerationParams::default());
    queue.map_job_to_video(&id, "/videos/early.mp4");

    assert!(queue.get_completed_jobs_with_videos(20).is_empty());
    assert_eq!(queue.get_queue_status().completed_videos, 0);

    assert!(queue.remove_video_mapping(&id));
    assert!(!queue.remove_video_mapping(&id));
    assert!(queue.get_video_for_job(&id).is_none());
}

#[test]
fn test_cleanup_is_persisted() {
    let harness = TestHarness::new();
    let queue = harness.open_queue();
    let id = queue.add_job("Volcanoes", "science", GenerationParams::default());
    queue.cancel_job(&id);

    // Everything finished before "now" is older than a zero age.
    std::thread::sleep(std::time::Duration::from_millis(5));
    let stats = queue.cleanup_old_jobs(Some(Duration::zero()));
    assert_eq!(stats.jobs_removed, 1);
    drop(queue);

    assert!(harness.open_queue().get_job(&id).is_none());
}

#[test]
fn test_corrupt_jobs_file_starts_empty() {
    let harness = TestHarness::new();
    std::fs::create_dir_all(&harness.data_dir).unwrap();
    std::fs::write(harness.jobs_path(), "{ not json").unwrap();

    let queue = harness.open_queue();
    assert_eq!(queue.list_jobs(None).len(), 0);

    let id = queue.add_job("Fresh start", "health", GenerationParams::default());
    drop(queue);
    assert!(harness.open_queue().get_job(&id).is_some());
}

#[test]
fn test_interrupted_jobs_after_restart() {
    let harness = TestHarness::new();
    let queue = harness.open_queue();
    let id = queue.add_job("Half done", "health", GenerationParams::default());
    queue.claim_next_job("worker-1").unwrap();
    drop(queue);

    // Default: left processing.
    let reopened = harness.open_queue();
    assert_eq!(reopened.get_job(&id).unwrap().status, JobStatus::Processing);
    drop(reopened);

    let failing = harness.open_queue_with(QueueConfig {
        fail_interrupted_on_load: true,
        ..harness.queue_config()
    });
    let job = failing.get_job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.is_some());
}

#[test]
fn test_unreadable_mapping_file_keeps_persisted_jobs() {
    let harness = TestHarness::new();
    let queue = harness.open_queue();
    let old = queue.add_job("Ancient Rome", "history", GenerationParams::default());
    drop(queue);

    // A mapping path that cannot be read as a file.
    std::fs::remove_file(harness.mapping_path()).unwrap();
    std::fs::create_dir(harness.mapping_path()).unwrap();

    let reopened = harness.open_queue();
    assert!(reopened.get_job(&old).is_some());
    assert!(reopened.persistence_warning().is_some());

    let new = reopened.add_job("New", "history", GenerationParams::default());
    drop(reopened);

    let jobs = harness.read_jobs_json();
    assert!(jobs.get(&old).is_some());
    assert!(jobs.get(&new).is_some());
    assert!(harness.mapping_path().is_file());

    let moved_aside = std::fs::read_dir(&harness.data_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with("job_video_mapping.json.corrupt-")
        });
    assert!(moved_aside);
}
