// Core Discovery

/*
 * ALPHA SOVEREIGN - CPU TOPOLOGY DISCOVERY
 * =================================================================
 * Component Name: src/hardware/topology.rs
 * Core Responsibility: اكتشاف الأنوية المتاحة قبل طلب أي تثبيت (Performance Pillar).
 * Design Pattern: Resource Discovery
 * =================================================================
 */

use tracing::{info, warn};
use crate::affinity::Affinity;

/// عدد الأنوية المنطقية التي يراها core_affinity (0 إذا فشل الاكتشاف).
pub fn available_cores() -> usize {
    core_affinity::get_core_ids().map(|ids| ids.len()).unwrap_or(0)
}

/// تحذيرات مبكرة عن طلب تقارب لا يمكن للجهاز تلبيته كاملاً.
/// لا نرفض هنا: القرار النهائي للنواة عند التطبيق.
pub fn audit_request(affinity: &Affinity) -> usize {
    let core_count = available_cores();
    info!("TOPOLOGY: Detected {} logical cores.", core_count);

    if core_count == 0 {
        warn!("TOPOLOGY: Failed to detect CPU cores topology");
        return 0;
    }

    if core_count < 4 {
        warn!("PERF_WARNING: Low core count ({}). Isolation will be compromised.", core_count);
    }

    let out_of_range: Vec<usize> = affinity.cores().into_iter().filter(|c| *c >= core_count).collect();
    if !out_of_range.is_empty() {
        warn!(
            "TOPOLOGY: Requested cores {:?} exceed detected range (Total: {}). Expect an applied mask mismatch.",
            out_of_range, core_count
        );
    }

    core_count
}
