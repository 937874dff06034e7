use session_tracker::{PollingScheduler, TrackerError};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

#[tokio::test(start_paused = true)]
async fn test_slow_fetch_never_overlaps() {
    let calls = Arc::new(AtomicU32::new(0));
    let running = Arc::new(AtomicUsize::new(0));
    let max_running = Arc::new(AtomicUsize::new(0));

    let scheduler = PollingScheduler::new();
    {
        let calls = calls.clone();
        let running = running.clone();
        let max_running = max_running.clone();
        scheduler
            .start(
                move || {
                    let calls = calls.clone();
                    let running = running.clone();
                    let max_running = max_running.clone();
                    async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        max_running.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(3_500)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, TrackerError>(n)
                    }
                },
                Duration::from_secs(1),
            )
            .unwrap();
    }

    sleep(Duration::from_millis(10_500)).await;
    scheduler.stop();

    assert_eq!(max_running.load(Ordering::SeqCst), 1);
    let invocations = calls.load(Ordering::SeqCst);
    assert!(invocations <= 10 + 1, "invoked {} times", invocations);
    assert!(invocations >= 2);
    assert!(scheduler.stats().skipped > 0);
}

#[tokio::test(start_paused = true)]
async fn test_failure_keeps_last_result() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let scheduler = PollingScheduler::new();

    scheduler
        .start(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n == 1 {
                        Ok(vec!["first".to_string()])
                    } else {
                        Err(TrackerError::FetchFailure("503".to_string()))
                    }
                }
            },
            Duration::from_secs(1),
        )
        .unwrap();

    sleep(Duration::from_millis(3_500)).await;

    assert_eq!(scheduler.last_result(), Some(vec!["first".to_string()]));
    assert!(scheduler.is_running());
    let stats = scheduler.stats();
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 3);
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_result() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let scheduler = PollingScheduler::new();

    scheduler
        .start(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    sleep(Duration::from_secs(2)).await;
                    Ok::<_, TrackerError>("late")
                }
            },
            Duration::from_secs(1),
        )
        .unwrap();

    sleep(Duration::from_millis(100)).await;
    assert!(scheduler.is_in_flight());
    scheduler.stop();

    sleep(Duration::from_secs(5)).await;
    assert_eq!(scheduler.last_result(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!scheduler.refresh());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_respects_in_flight_guard() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let scheduler = PollingScheduler::new();

    scheduler
        .start(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    sleep(Duration::from_millis(500)).await;
                    Ok::<_, TrackerError>(n)
                }
            },
            Duration::from_secs(60),
        )
        .unwrap();

    sleep(Duration::from_millis(100)).await;
    assert!(!scheduler.refresh());

    sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.last_result(), Some(1));
    assert!(scheduler.refresh());

    sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.last_result(), Some(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_see_new_results() {
    let scheduler = PollingScheduler::new();
    let mut rx = scheduler.subscribe();

    scheduler
        .start(|| async { Ok::<_, TrackerError>(7u32) }, Duration::from_secs(5))
        .unwrap();

    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow(), Some(7));
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn test_restart_with_new_interval() {
    let calls = Arc::new(AtomicU32::new(0));
    let scheduler: PollingScheduler<u32> = PollingScheduler::new();

    let counter = calls.clone();
    scheduler
        .start(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TrackerError>(1) }
            },
            Duration::from_secs(10),
        )
        .unwrap();
    sleep(Duration::from_millis(500)).await;
    scheduler.stop();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let counter = calls.clone();
    scheduler
        .start(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TrackerError>(2) }
            },
            Duration::from_secs(1),
        )
        .unwrap();
    sleep(Duration::from_millis(2_500)).await;
    scheduler.stop();

    // eager call + ticks at 1s and 2s
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(scheduler.last_result(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_drop_stops_polling() {
    let calls = Arc::new(AtomicU32::new(0));
    {
        let counter = calls.clone();
        let scheduler = PollingScheduler::new();
        scheduler
            .start(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, TrackerError>(()) }
                },
                Duration::from_secs(1),
            )
            .unwrap();
        sleep(Duration::from_millis(1_500)).await;
    }

    let seen = calls.load(Ordering::SeqCst);
    sleep(Duration::from_secs(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), seen);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_then_stop_never_fetches() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let scheduler = PollingScheduler::new();

    scheduler
        .start(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TrackerError>(()) }
            },
            Duration::from_secs(5),
        )
        .unwrap();

    sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(scheduler.refresh());
    scheduler.stop();

    sleep(Duration::from_secs(1)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!scheduler.is_in_flight());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_fetch_releases_in_flight() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let scheduler = PollingScheduler::new();

    scheduler
        .start(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n == 1 {
                        panic!("fetch blew up");
                    }
                    Ok::<_, TrackerError>(n)
                }
            },
            Duration::from_secs(1),
        )
        .unwrap();

    sleep(Duration::from_millis(10)).await;
    assert!(!scheduler.is_in_flight());
    assert_eq!(scheduler.stats().failed, 1);

    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.last_result(), Some(2));
    scheduler.stop();
}
