//! BusinessProcessGate: per-file pause interlock against watched external
//! processes (§4.4).

use crate::control::CancellationToken;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Supplies the name of a currently-running watched process, if any.
/// The default production implementation is `process_detector::SysinfoProcessDetector`.
pub trait ProcessDetector: Send + Sync {
    fn running_process(&self) -> Option<String>;
}

/// A detector that never reports a running process; used when no watched
/// processes are configured.
pub struct NoProcessDetector;

impl ProcessDetector for NoProcessDetector {
    fn running_process(&self) -> Option<String> {
        None
    }
}

/// Observer callback fired on detection and on clearing.
pub type GateObserver = Box<dyn Fn(GateEvent) + Send + Sync>;

#[derive(Debug, Clone)]
pub enum GateEvent {
    /// A watched process was detected; `process_name` names it.
    Detected { process_name: String },
    /// The job transitioned Active -> Paused because of the detection.
    PausedForProcess,
    /// The watched process cleared; the job transitioned Paused -> Active.
    ResumedAfterProcess,
}

pub struct BusinessProcessGate {
    detector: Box<dyn ProcessDetector>,
    observer: Option<GateObserver>,
    entered: AtomicBool,
}

impl BusinessProcessGate {
    pub fn new(detector: Box<dyn ProcessDetector>) -> Self {
        Self {
            detector,
            observer: None,
            entered: AtomicBool::new(false),
        }
    }

    pub fn with_observer(mut self, observer: GateObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    fn notify(&self, event: GateEvent) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }

    /// Blocks while a watched process is running. Emits `Detected` and
    /// `PausedForProcess` once on entry, `ResumedAfterProcess` once on a
    /// clean exit. If `token` cancels mid-wait, returns immediately without
    /// emitting the resume event.
    pub fn wait_if_business_process(&self, token: &CancellationToken) {
        loop {
            let running = self.detector.running_process();
            match running {
                Some(name) => {
                    if !self.entered.swap(true, Ordering::SeqCst) {
                        self.notify(GateEvent::Detected { process_name: name });
                        self.notify(GateEvent::PausedForProcess);
                    }
                    if token.is_cancelled() {
                        return;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                None => {
                    if self.entered.swap(false, Ordering::SeqCst) {
                        self.notify(GateEvent::ResumedAfterProcess);
                    }
                    return;
                }
            }
        }
    }
}
