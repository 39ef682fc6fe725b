use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mc_warden::logs::{LogHub, LogLine, LogObserver};
use mc_warden::{AppError, Result};

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<u64>>,
}

impl LogObserver for Recorder {
    fn on_line(&self, line: &LogLine) -> Result<()> {
        self.seen.lock().unwrap().push(line.seq);
        Ok(())
    }
}

struct Failing {
    calls: AtomicUsize,
}

impl LogObserver for Failing {
    fn on_line(&self, _line: &LogLine) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Io("observer gone".into()))
    }
}

struct Panicking;

impl LogObserver for Panicking {
    fn on_line(&self, _line: &LogLine) -> Result<()> {
        panic!("observer bug");
    }
}

#[test]
fn sequence_numbers_are_contiguous() {
    let hub = LogHub::new(10);

    let seqs: Vec<u64> = (0..3).map(|i| hub.append(format!("line {i}")).seq).collect();

    assert_eq!(seqs, vec![1, 2, 3]);
}

#[test]
fn ring_evicts_oldest_lines() {
    let hub = LogHub::new(3);
    for i in 0..5 {
        hub.append(format!("line {i}"));
    }

    let recent = hub.recent(10);
    let texts: Vec<&str> = recent.iter().map(|l| l.text.as_str()).collect();

    assert_eq!(texts, vec!["line 2", "line 3", "line 4"]);
    assert_eq!(recent[0].seq, 3);
}

#[test]
fn recent_returns_tail_in_order() {
    let hub = LogHub::new(10);
    for i in 0..5 {
        hub.append(format!("line {i}"));
    }

    let recent = hub.recent(2);

    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].text, "line 3");
    assert_eq!(recent[1].text, "line 4");
}

#[test]
fn zero_capacity_is_clamped() {
    let hub = LogHub::new(0);
    hub.append("only");

    assert_eq!(hub.capacity(), 1);
    assert_eq!(hub.recent(5).len(), 1);
}

#[test]
fn observers_see_every_line_in_order() {
    let hub = LogHub::new(2);
    let recorder = Arc::new(Recorder::default());
    hub.subscribe(recorder.clone());

    for i in 0..4 {
        hub.append(format!("line {i}"));
    }

    assert_eq!(*recorder.seen.lock().unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn failing_and_panicking_observers_do_not_block_others() {
    let hub = LogHub::new(10);
    let failing = Arc::new(Failing {
        calls: AtomicUsize::new(0),
    });
    let recorder = Arc::new(Recorder::default());
    hub.subscribe(failing.clone());
    hub.subscribe(Arc::new(Panicking));
    hub.subscribe(recorder.clone());

    hub.append("a");
    hub.append("b");

    assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    assert_eq!(*recorder.seen.lock().unwrap(), vec![1, 2]);
    assert_eq!(hub.observer_count(), 3);
}

#[test]
fn unsubscribe_stops_delivery() {
    let hub = LogHub::new(10);
    let recorder = Arc::new(Recorder::default());
    let id = hub.subscribe(recorder.clone());

    hub.append("before");
    assert!(hub.unsubscribe(id));
    assert!(!hub.unsubscribe(id));
    hub.append("after");

    assert_eq!(*recorder.seen.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn channel_subscription_receives_lines_and_unsubscribes_on_drop() {
    let hub = Arc::new(LogHub::new(10));
    let (subscription, mut rx) = hub.subscribe_channel(8);

    hub.append("hello");
    let line = rx.recv().await.expect("line");
    assert_eq!(line.text, "hello");
    assert_eq!(hub.observer_count(), 1);

    drop(subscription);
    assert_eq!(hub.observer_count(), 0);
}

#[tokio::test]
async fn full_channel_drops_lines_for_that_subscriber_only() {
    let hub = Arc::new(LogHub::new(10));
    let (_slow_guard, mut slow) = hub.subscribe_channel(1);
    let recorder = Arc::new(Recorder::default());
    hub.subscribe(recorder.clone());

    hub.append("one");
    hub.append("two");

    assert_eq!(slow.recv().await.expect("first").text, "one");
    assert!(slow.try_recv().is_err());
    assert_eq!(*recorder.seen.lock().unwrap(), vec![1, 2]);
}

#[test]
fn line_serializes_with_line_field() {
    let hub = LogHub::new(10);
    let line = hub.append("Done (3.2s)!");

    let json = serde_json::to_value(&line).expect("json");

    assert_eq!(json["seq"], 1);
    assert_eq!(json["line"], "Done (3.2s)!");
    assert!(json["timestamp"].is_string());
}
