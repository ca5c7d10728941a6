//! `status` command support: current job plus system load. The
//! command parser itself is out of scope; this is the pure data this
//! crate can report.

use std::path::Path;

use sysinfo::System;

use crate::queue::WorkerPhase;

#[derive(Debug, Clone)]
pub struct SystemLoad {
    pub cpu_usage_percent: f32,
    pub used_memory_bytes: u64,
    pub total_memory_bytes: u64,
    pub free_disk_bytes: Option<u64>,
}

/// Snapshots CPU/memory via `sysinfo` and free space on the output
/// filesystem via `fs2`, the same pairing the standard approach uses for its own
/// system-load reporting.
pub fn current_system_load(output_dir: &Path) -> SystemLoad {
    let mut system = System::new();
    system.refresh_cpu_usage();
    system.refresh_memory();

    let cpu_usage_percent = system.global_cpu_usage();
    let free_disk_bytes = fs2::available_space(output_dir).ok();

    SystemLoad {
        cpu_usage_percent,
        used_memory_bytes: system.used_memory(),
        total_memory_bytes: system.total_memory(),
        free_disk_bytes,
    }
}

pub fn render_status(phase: WorkerPhase, pending_count: usize, load: &SystemLoad) -> String {
    format!(
        "Worker: {:?}\nPending jobs: {}\nCPU: {:.1}%\nMemory: {}/{} MB\nFree disk: {}",
        phase,
        pending_count,
        load.cpu_usage_percent,
        load.used_memory_bytes / (1024 * 1024),
        load.total_memory_bytes / (1024 * 1024),
        load.free_disk_bytes
        .map(|bytes| format!("{} MB", bytes / (1024 * 1024)))
        .unwrap_or_else(|| "unknown".to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_status_includes_worker_phase_and_pending_count() {
        let load = SystemLoad {
            cpu_usage_percent: 12.5,
            used_memory_bytes: 512 * 1024 * 1024,
            total_memory_bytes: 2048 * 1024 * 1024,
            free_disk_bytes: Some(10 * 1024 * 1024 * 1024),
        };
        let rendered = render_status(WorkerPhase::Running, 3, &load);
        assert!(rendered.contains("Running"));
        assert!(rendered.contains("Pending jobs: 3"));
    }
}
