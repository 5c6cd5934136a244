// ALPHA SOVEREIGN - PORTABLE SINGLE-CORE PINNING
// Status: FALLBACK (targets without a native affinity layer)

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::warn;

use super::{NativeAffinity, RawOutcome, Tid};
use super::topology;

const WORD_BITS: usize = 64;

mod set_codes {
    pub const INVALID_ARG: i32 = -1;
    pub const SET_AFFINITY_FAILED: i32 = -4;
    pub const CPU_COUNT_FAILED: i32 = -5;
}

mod reset_codes {
    pub const CPU_COUNT_FAILED: i32 = -2;
    pub const SET_AFFINITY_FAILED: i32 = -5;
}

mod get_codes {
    pub const CPU_COUNT_FAILED: i32 = -2;
}

// core_affinity لا يكشف tid حقيقياً على كل المنصات، لذلك نولد معرفاً ثابتاً لكل خيط
static NEXT_TID: AtomicI32 = AtomicI32::new(1);

thread_local! {
    static LOCAL_TID: Cell<Tid> = const { Cell::new(0) };
    // آخر قناع طبقناه على هذا الخيط (None = لم يُثبت قط)
    static PINNED: RefCell<Option<Vec<u64>>> = const { RefCell::new(None) };
}

fn current_tid() -> Tid {
    LOCAL_TID.with(|slot| {
        if slot.get() == 0 {
            slot.set(NEXT_TID.fetch_add(1, Ordering::Relaxed));
        }
        slot.get()
    })
}

fn all_cores(count: usize) -> Vec<u64> {
    let len = count.max(1).div_ceil(WORD_BITS);
    let mut words = vec![0u64; len];
    for cpu in 0..count {
        words[len - 1 - cpu / WORD_BITS] |= 1u64 << (cpu % WORD_BITS);
    }
    words
}

fn marked_cores(mask: &[u64]) -> Vec<usize> {
    mask.iter()
        .rev()
        .enumerate()
        .flat_map(|(offset, word)| {
            (0..WORD_BITS).filter(move |bit| word & (1u64 << bit) != 0).map(move |bit| offset * WORD_BITS + bit)
        })
        .collect()
}

/// تثبيت عبر core_affinity: نواة واحدة فقط، ولا يمكن التراجع عنه.
/// القناع المطبق يُتتبع محلياً لكل خيط لأن المنصة لا تتيح قراءته.
#[derive(Debug, Default)]
pub struct PortableBackend;

impl PortableBackend {
    pub fn new() -> Self {
        Self
    }
}

impl NativeAffinity for PortableBackend {
    fn name(&self) -> &'static str {
        "PORTABLE_CORE_AFFINITY"
    }

    fn set_affinity_raw(&self, mask: &[u64]) -> RawOutcome {
        let Some(core_ids) = core_affinity::get_core_ids() else {
            return RawOutcome::failure(set_codes::CPU_COUNT_FAILED);
        };

        // هذه المنصة لا تسمح إلا بنواة واحدة لكل خيط
        let [core] = marked_cores(mask)[..] else {
            return RawOutcome::failure(set_codes::INVALID_ARG);
        };
        let Some(core_id) = core_ids.get(core) else {
            return RawOutcome::failure(set_codes::SET_AFFINITY_FAILED);
        };

        if !core_affinity::set_for_current(*core_id) {
            return RawOutcome::failure(set_codes::SET_AFFINITY_FAILED);
        }

        let len = core_ids.len().max(1).div_ceil(WORD_BITS);
        let mut applied = vec![0u64; len];
        applied[len - 1 - core / WORD_BITS] = 1u64 << (core % WORD_BITS);
        PINNED.with(|pinned| *pinned.borrow_mut() = Some(applied.clone()));
        RawOutcome::success(current_tid(), applied)
    }

    fn reset_affinity_raw(&self) -> RawOutcome {
        let cores = topology::available_cores();
        if cores == 0 {
            return RawOutcome::failure(reset_codes::CPU_COUNT_FAILED);
        }

        // core_affinity لا يستطيع توسيع التقارب: الخيط المثبت يبقى مثبتاً
        if PINNED.with(|pinned| pinned.borrow().is_some()) {
            warn!("PORTABLE: reset refused, platform cannot widen a pinned thread's affinity");
            return RawOutcome::failure(reset_codes::SET_AFFINITY_FAILED);
        }
        RawOutcome::success(current_tid(), all_cores(cores))
    }

    fn get_affinity_raw(&self) -> RawOutcome {
        let cores = topology::available_cores();
        if cores == 0 {
            return RawOutcome::failure(get_codes::CPU_COUNT_FAILED);
        }

        let current = PINNED.with(|pinned| pinned.borrow().clone()).unwrap_or_else(|| all_cores(cores));
        RawOutcome::success(current_tid(), current)
    }
}
