use chrono::{Duration, NaiveDate};
use reqlog::stream::{AccessRecord, ApplicationRecord, Severity};
use tower::ServiceExt; // for oneshot

mod common;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn test_requests_on_consecutive_days_split_across_files() {
    let app = common::spawn_app();

    app.router
        .clone()
        .oneshot(common::get("/time-series"))
        .await
        .unwrap();

    app.clock.advance(Duration::days(1));

    app.router
        .clone()
        .oneshot(common::get("/time-series"))
        .await
        .unwrap();

    let archived = app.dir.path().join("access.log.2024-05-01");
    let yesterday = common::read_records(&archived);
    assert_eq!(yesterday.len(), 1);
    assert_eq!(yesterday[0]["path"], "/time-series");

    assert_eq!(app.access_records().len(), 1);

    // The application stream rotates independently on its own next write.
    let archived_app = app.dir.path().join("application.log.2024-05-01");
    assert_eq!(common::read_records(&archived_app).len(), 1);
    assert_eq!(app.application_records().len(), 1);
}

#[tokio::test]
async fn test_streams_keep_at_most_retention_archives() {
    let app = common::spawn_app();
    let access = &app.state.loggers.access;
    let retention = app.state.config.log.retention;

    for _ in 0..=(retention + 1) {
        access.info(AccessRecord::new("GET", "/", 200, "::1", None, 0.001).unwrap());
        app.clock.advance(Duration::days(1));
    }
    access.info(AccessRecord::new("GET", "/", 200, "::1", None, 0.001).unwrap());

    let archives = access.writer().archives().unwrap();
    assert_eq!(archives.len(), retention);

    // Days 2024-05-01 and 05-02 were the oldest and have been pruned.
    let dates = archives.dates();
    assert_eq!(dates.first().copied(), Some(date(2024, 5, 3)));
    assert_eq!(dates.last().copied(), Some(date(2024, 5, 9)));
    assert!(!app.dir.path().join("access.log.2024-05-01").exists());
    assert!(!app.dir.path().join("access.log.2024-05-02").exists());
}

#[tokio::test]
async fn test_idle_stream_archives_under_last_active_day() {
    let app = common::spawn_app();
    let application = &app.state.loggers.application;

    application.warning(ApplicationRecord::new(
        Severity::Warning,
        "before the long weekend",
        vec![],
        "::1",
    ));
    app.clock.advance(Duration::days(4));
    application.info(ApplicationRecord::new(
        Severity::Info,
        "back again",
        vec![],
        "::1",
    ));

    let archives = application.writer().archives().unwrap();
    assert_eq!(archives.dates(), vec![date(2024, 5, 1)]);

    let live = app.application_records();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0]["message"], "back again");
}

#[test]
fn test_concurrent_emits_across_a_day_boundary_lose_nothing() {
    let (state, clock, dir) = common::test_state();
    let access = state.loggers.access.clone();
    let per_thread = 25;
    let threads = 6;

    std::thread::scope(|s| {
        for t in 0..threads {
            let access = access.clone();
            let clock = clock.clone();
            s.spawn(move || {
                for i in 0..per_thread {
                    if t == 0 && i == per_thread / 2 {
                        clock.advance(Duration::days(1));
                    }
                    let path = format!("/t{t}/{i}");
                    access.info(AccessRecord::new("GET", path, 200, "::1", None, 0.0).unwrap());
                }
            });
        }
    });

    let archived = common::read_records(&dir.path().join("access.log.2024-05-01"));
    let live = common::read_records(&dir.path().join("access.log"));
    assert_eq!(archived.len() + live.len(), threads * per_thread);
}
