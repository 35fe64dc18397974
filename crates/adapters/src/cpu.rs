// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CPU telemetry for the local scheduler's admission control. Sampling is
//! cached for at most 100ms; successive admission checks within the same
//! window see the cached idle count decremented by what was just admitted.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

const SAMPLE_CACHE: Duration = Duration::from_millis(100);
const SINGLE_CPU_IDLE_THRESHOLD: f64 = 0.2;
const MULTI_CPU_IDLE_THRESHOLD: f64 = 0.8;

pub trait CpuMonitor: Send + Sync {
    fn cpu_count(&self) -> usize;
    /// Idle CPU count, refreshing the sample if it is stale.
    fn idle_cpus(&self) -> f64;
    /// Admit a job needing `ncpu` slots; applies the 0.2/0.8 single/multi
    /// threshold and, if admitted, decrements the cached idle count.
    fn try_admit(&self, ncpu: u32) -> bool;
}

struct Sample {
    idle_fraction: f64,
    taken_at: Instant,
}

pub struct SysinfoCpuMonitor {
    system: Mutex<sysinfo::System>,
    sample: Mutex<Option<Sample>>,
    cpu_count: usize,
}

impl SysinfoCpuMonitor {
    pub fn new() -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
            sample: Mutex::new(None),
            cpu_count: num_cpus::get(),
        }
    }

    fn refresh_if_stale(&self) -> f64 {
        let mut sample = self.sample.lock();
        let needs_refresh = match sample.as_ref() {
            Some(s) => s.taken_at.elapsed() >= SAMPLE_CACHE,
            None => true,
        };
        if needs_refresh {
            let mut system = self.system.lock();
            system.refresh_cpu_usage();
            let used: f64 = system.cpus().iter().map(|c| f64::from(c.cpu_usage())).sum::<f64>()
                / (system.cpus().len().max(1) as f64);
            let idle_fraction = (1.0 - used / 100.0).clamp(0.0, 1.0);
            *sample = Some(Sample { idle_fraction, taken_at: Instant::now() });
        }
        sample.as_ref().map(|s| s.idle_fraction).unwrap_or(0.0)
    }
}

impl Default for SysinfoCpuMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuMonitor for SysinfoCpuMonitor {
    fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    fn idle_cpus(&self) -> f64 {
        self.refresh_if_stale() * self.cpu_count as f64
    }

    fn try_admit(&self, ncpu: u32) -> bool {
        try_admit_with(self, ncpu)
    }
}

/// Shared admission rule so the real and fake monitors behave identically.
/// `idle` is an absolute idle-CPU count (fraction-idle × cpu-count, already
/// computed by the monitor), compared directly against the literal
/// threshold — not re-normalized into a fraction of total CPUs.
fn try_admit_with(monitor: &impl CpuMonitorIdleMut, ncpu: u32) -> bool {
    let idle = monitor.idle_cpus_mut_sample();
    let threshold = if ncpu <= 1 { SINGLE_CPU_IDLE_THRESHOLD } else { MULTI_CPU_IDLE_THRESHOLD };
    if idle > threshold {
        monitor.decrement_idle(f64::from(ncpu));
        true
    } else {
        false
    }
}

/// Narrow internal trait so [`try_admit_with`] can be shared between the
/// real and fake monitors without exposing mutation through [`CpuMonitor`].
trait CpuMonitorIdleMut {
    fn idle_cpus_mut_sample(&self) -> f64;
    fn decrement_idle(&self, by: f64);
}

impl CpuMonitorIdleMut for SysinfoCpuMonitor {
    fn idle_cpus_mut_sample(&self) -> f64 {
        self.refresh_if_stale() * self.cpu_count as f64
    }

    fn decrement_idle(&self, by: f64) {
        if let Some(sample) = self.sample.lock().as_mut() {
            let idle = (sample.idle_fraction * self.cpu_count as f64 - by).max(0.0);
            sample.idle_fraction = idle / self.cpu_count as f64;
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;

    pub struct FakeCpuMonitor {
        cpu_count: usize,
        idle: Mutex<f64>,
    }

    impl FakeCpuMonitor {
        pub fn new(cpu_count: usize, idle: f64) -> Self {
            Self { cpu_count, idle: Mutex::new(idle) }
        }

        pub fn set_idle(&self, idle: f64) {
            *self.idle.lock() = idle;
        }
    }

    impl CpuMonitor for FakeCpuMonitor {
        fn cpu_count(&self) -> usize {
            self.cpu_count
        }

        fn idle_cpus(&self) -> f64 {
            *self.idle.lock()
        }

        fn try_admit(&self, ncpu: u32) -> bool {
            try_admit_with(self, ncpu)
        }
    }

    impl CpuMonitorIdleMut for FakeCpuMonitor {
        fn idle_cpus_mut_sample(&self) -> f64 {
            *self.idle.lock()
        }

        fn decrement_idle(&self, by: f64) {
            let mut idle = self.idle.lock();
            *idle = (*idle - by).max(0.0);
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeCpuMonitor;

#[cfg(test)]
#[path = "cpu_tests.rs"]
mod tests;
