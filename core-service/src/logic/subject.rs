//! Subject label probe
//!
//! Labels each report with the process currently using the most CPU. This is
//! a cheap proxy for "the application in use", not focus tracking.

use parking_lot::Mutex;
use sysinfo::System;

use crate::constants::UNKNOWN_SUBJECT;

/// Anything that can name the current subject
pub trait SubjectSource: Send + Sync {
    fn current(&self) -> String;
}

/// Name of the busiest entry, ignoring blank names
pub fn busiest<'a, I>(processes: I) -> Option<String>
where
    I: IntoIterator<Item = (&'a str, f32)>,
{
    processes
        .into_iter()
        .filter(|(name, cpu)| !name.trim().is_empty() && cpu.is_finite())
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(name, _)| name.to_string())
}

/// Samples the process table through `sysinfo`. CPU figures are deltas
/// between refreshes, so the first sample after start may read all zeros.
pub struct ProcessProbe {
    system: Mutex<System>,
}

impl ProcessProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_processes();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for ProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SubjectSource for ProcessProbe {
    fn current(&self) -> String {
        let mut sys = self.system.lock();
        sys.refresh_processes();

        busiest(sys.processes().values().map(|p| (p.name(), p.cpu_usage())))
            .unwrap_or_else(|| UNKNOWN_SUBJECT.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busiest_picks_highest_cpu() {
        let procs = [("idle", 0.0), ("editor", 12.5), ("browser", 7.0)];
        assert_eq!(busiest(procs), Some("editor".to_string()));
    }

    #[test]
    fn test_busiest_skips_blank_and_nan() {
        let procs = [("", 90.0), ("ghost", f32::NAN), ("shell", 1.0)];
        assert_eq!(busiest(procs), Some("shell".to_string()));
        assert_eq!(busiest(Vec::<(&str, f32)>::new()), None);
    }

    #[test]
    fn test_probe_always_labels() {
        let probe = ProcessProbe::new();
        assert!(!probe.current().is_empty());
    }
}
