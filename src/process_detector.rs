//! SysinfoProcessDetector: the default `ProcessDetector` implementation,
//! backed by the `sysinfo` crate (§4.4, §6 watched-process configuration).

use crate::gate::ProcessDetector;
use std::sync::Mutex;
use sysinfo::System;

/// Matches process names case-insensitively against a configured watch list.
/// Refreshes the process table on every call; cheap enough at the gate's
/// ~500 ms poll interval.
pub struct SysinfoProcessDetector {
    watched_names: Vec<String>,
    system: Mutex<System>,
}

impl SysinfoProcessDetector {
    pub fn new(watched_names: Vec<String>) -> Self {
        Self {
            watched_names: watched_names.into_iter().map(|n| n.to_lowercase()).collect(),
            system: Mutex::new(System::new()),
        }
    }
}

impl ProcessDetector for SysinfoProcessDetector {
    fn running_process(&self) -> Option<String> {
        if self.watched_names.is_empty() {
            return None;
        }

        let mut system = self.system.lock().expect("sysinfo lock poisoned");
        system.refresh_all();

        system.processes().values().find_map(|process| {
            let name = process.name().to_string_lossy().to_lowercase();
            self.watched_names
                .iter()
                .find(|watched| name.contains(watched.as_str()))
                .map(|_| process.name().to_string_lossy().into_owned())
        })
    }
}
