use super::*;

#[test]
fn unthrottled_timer_never_sleeps() {
    let mut t = FpsTimer::new(Fps { num: 1, den: 1 });
    for _ in 0..3 {
        assert_eq!(t.wait_until_next_frame_due(false), Duration::ZERO);
    }
}

#[test]
fn throttled_timer_waits_for_the_next_deadline() {
    let mut t = FpsTimer::new(Fps { num: 50, den: 1 });
    assert_eq!(t.wait_until_next_frame_due(true), Duration::ZERO);
    let start = Instant::now();
    t.wait_until_next_frame_due(true);
    assert!(start.elapsed() >= Duration::from_millis(15));
}

#[test]
fn readout_needs_two_frames_and_restarts_window() {
    let mut t = FpsTimer::new(Fps { num: 24, den: 1 });
    assert_eq!(t.actual_frame_rate(), None);
    t.wait_until_next_frame_due(false);
    assert_eq!(t.actual_frame_rate(), None);
    std::thread::sleep(Duration::from_millis(5));
    t.wait_until_next_frame_due(false);
    let fps = t.actual_frame_rate().unwrap();
    assert!(fps > 0.0 && fps < 1000.0);
    assert_eq!(t.actual_frame_rate(), None);
}

#[test]
fn changing_rate_resets_schedule() {
    let mut t = FpsTimer::new(Fps { num: 1, den: 1 });
    t.wait_until_next_frame_due(false);
    t.set_desired(Fps { num: 1000, den: 1 });
    assert_eq!(t.desired(), Fps { num: 1000, den: 1 });
    assert_eq!(t.wait_until_next_frame_due(true), Duration::ZERO);
}
