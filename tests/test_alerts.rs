use std::sync::{Arc, Mutex};

use trade_flow::alerts::{Alert, AlertEmitter, AlertLevel, AlertSink};

#[test]
fn history_keeps_every_level_in_order() {
    let sink = AlertSink::silent();
    sink.info("boot", "started");
    sink.trade("fill", "bought 0.01");
    sink.warning("slow", "venue latency");
    sink.error("bad", "subject failed");
    sink.critical("halt", "kill switch");

    let history = sink.history();
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].level, AlertLevel::Info);
    assert_eq!(history[1].level, AlertLevel::Trade);
    assert_eq!(history[4].level, AlertLevel::Critical);
    assert_eq!(history[4].title, "halt");
}

#[test]
fn ring_buffer_drops_the_oldest() {
    let sink = AlertSink::silent();
    for i in 0..600 {
        sink.info("tick", &i.to_string());
    }
    let history = sink.history();
    assert_eq!(history.len(), 500);
    assert_eq!(history[0].message, "100");
    assert_eq!(history.last().unwrap().message, "599");
}

#[test]
fn custom_emitters_receive_every_alert() {
    struct Capture(Arc<Mutex<Vec<Alert>>>);
    impl AlertEmitter for Capture {
        fn emit(&self, alert: &Alert) {
            self.0.lock().unwrap().push(alert.clone());
        }
    }

    let captured = Arc::new(Mutex::new(Vec::new()));
    let mut sink = AlertSink::silent();
    sink.add_emitter(Box::new(Capture(captured.clone())));

    sink.trade("fill", "sold");
    sink.error("oops", "it broke");

    let seen = captured.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].level, AlertLevel::Trade);
    assert_eq!(seen[1].message, "it broke");
}
