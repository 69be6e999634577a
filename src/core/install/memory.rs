use tracing::debug;

/// Heap left to the operating system when capping by physical memory.
const SYSTEM_RESERVE_MB: u64 = 1024;

pub fn total_system_memory_mb() -> Option<u64> {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    let total = system.total_memory() / (1024 * 1024);
    (total > 0).then_some(total)
}

/// The pack's recommended heap, capped by the configured maximum and by what
/// the machine can actually spare.
pub fn effective_memory(recommended: Option<u32>, configured_max: Option<u32>, system_mb: Option<u64>) -> Option<u32> {
    let mut memory = recommended.or(configured_max)?;
    if let Some(max) = configured_max {
        memory = memory.min(max);
    }
    if let Some(total) = system_mb {
        let usable = total.saturating_sub(SYSTEM_RESERVE_MB).max(512);
        if u64::from(memory) > usable {
            debug!("Capping heap from {} MiB to {} MiB of system memory", memory, usable);
            memory = u32::try_from(usable).unwrap_or(u32::MAX);
        }
    }
    Some(memory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recommendation_is_capped() {
        assert_eq!(effective_memory(Some(8192), Some(4096), None), Some(4096));
        assert_eq!(effective_memory(Some(8192), None, Some(4096)), Some(3072));
        assert_eq!(effective_memory(Some(2048), Some(4096), Some(16384)), Some(2048));
        assert_eq!(effective_memory(None, Some(3000), None), Some(3000));
        assert_eq!(effective_memory(None, None, Some(16384)), None);
        assert_eq!(effective_memory(Some(4096), None, Some(1024)), Some(512));
    }
}
