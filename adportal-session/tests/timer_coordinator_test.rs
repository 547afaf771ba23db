mod common;

use adportal_core::{async_callback, AsyncCallback, ExpiresIn, PortalError, RefreshResponse, SessionApi};
use adportal_session::TimerCoordinator;
use common::{MockSessionApi, Reply, SESSION_ID};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const REFRESH_PERIOD: Duration = Duration::from_secs(15 * 60);

fn counter_callback<A: Send + 'static>(counter: &Arc<AtomicUsize>) -> AsyncCallback<A> {
    let counter = Arc::clone(counter);
    async_callback(move |_: A| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    })
}

fn arm(
    timers: &mut TimerCoordinator,
    api: &Arc<MockSessionApi>,
    warnings: &Arc<AtomicUsize>,
    refreshed: &Arc<AtomicUsize>,
    failed: &Arc<AtomicUsize>,
) {
    timers.start_countdown(
        ExpiresIn::from_secs_f64(3600.0).unwrap(),
        counter_callback::<u64>(warnings),
        counter_callback::<()>(&Arc::new(AtomicUsize::new(0))),
    );
    let api: Arc<dyn SessionApi> = api.clone();
    timers.start_auto_refresh(
        api,
        SESSION_ID.to_string(),
        REFRESH_PERIOD,
        counter_callback::<RefreshResponse>(refreshed),
        counter_callback::<PortalError>(failed),
    );
}

#[tokio::test(start_paused = true)]
async fn test_rearming_twice_leaves_one_of_each() {
    let api = MockSessionApi::new();
    let warnings = Arc::new(AtomicUsize::new(0));
    let refreshed = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let mut timers = TimerCoordinator::new(Duration::from_secs(1), Duration::from_secs(300));

    arm(&mut timers, &api, &warnings, &refreshed, &failed);
    arm(&mut timers, &api, &warnings, &refreshed, &failed);

    let active = timers.active();
    assert!(active.countdown);
    assert!(active.auto_refresh);

    sleep(REFRESH_PERIOD + Duration::from_millis(500)).await;
    assert_eq!(api.calls("refresh"), 1);
    assert_eq!(refreshed.load(Ordering::SeqCst), 1);

    // Warning window starts at t=3300; one warning per tick, not two
    sleep(Duration::from_secs(3300 - 900 + 10)).await;
    assert_eq!(warnings.load(Ordering::SeqCst), 11);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_errors_do_not_stop_the_loop() {
    let api = MockSessionApi::new();
    api.on_refresh(Reply::AuthError("Session expired"));
    let refreshed = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let mut timers = TimerCoordinator::new(Duration::from_secs(1), Duration::from_secs(300));

    let dyn_api: Arc<dyn SessionApi> = api.clone();
    timers.start_auto_refresh(
        dyn_api,
        SESSION_ID.to_string(),
        REFRESH_PERIOD,
        counter_callback::<RefreshResponse>(&refreshed),
        counter_callback::<PortalError>(&failed),
    );

    sleep(REFRESH_PERIOD * 3 + Duration::from_millis(500)).await;
    assert_eq!(api.calls("refresh"), 3);
    assert_eq!(failed.load(Ordering::SeqCst), 3);
    assert_eq!(refreshed.load(Ordering::SeqCst), 0);
    assert!(timers.active().auto_refresh);

    timers.stop_auto_refresh();
    sleep(REFRESH_PERIOD * 2).await;
    assert_eq!(api.calls("refresh"), 3);
}
