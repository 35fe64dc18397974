// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn single_cpu_job_admitted_above_point_two_idle() {
    let monitor = FakeCpuMonitor::new(4, 2.0); // 2.0 idle cpus, above the 0.2 threshold
    assert!(monitor.try_admit(1));
}

#[test]
fn single_cpu_job_rejected_at_or_below_point_two_idle() {
    let monitor = FakeCpuMonitor::new(4, 0.2); // exactly at the threshold, not above it
    assert!(!monitor.try_admit(1));

    let monitor = FakeCpuMonitor::new(4, 0.1);
    assert!(!monitor.try_admit(1));
}

#[test]
fn multi_cpu_job_requires_point_eight_idle() {
    let monitor = FakeCpuMonitor::new(4, 0.8); // exactly at the threshold, not above it
    assert!(!monitor.try_admit(2));

    let monitor = FakeCpuMonitor::new(4, 0.9); // above the 0.8 threshold
    assert!(monitor.try_admit(2));
}

#[test]
fn admitting_decrements_cached_idle_for_the_next_check() {
    let monitor = FakeCpuMonitor::new(4, 4.0); // 100% idle
    assert!(monitor.try_admit(1));
    assert!((monitor.idle_cpus() - 3.0).abs() < f64::EPSILON);
}
