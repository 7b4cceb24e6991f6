// File: blockbot-core/src/mem.rs

use sysinfo::{ProcessesToUpdate, System};

/// Resident memory of this process in MB, or 0.0 if the pid cannot be
/// resolved. Purely informational; nothing enforces a limit.
pub fn process_memory_mb() -> f64 {
    process_memory_bytes() as f64 / 1024.0 / 1024.0
}

fn process_memory_bytes() -> u64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    let mut system = System::new();
    let _ = system.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
    system.process(pid).map_or(0, sysinfo::Process::memory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_nonzero_resident_memory() {
        // A running test process always has some RSS.
        assert!(process_memory_mb() > 0.0);
    }
}
