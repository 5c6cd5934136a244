// Internal Simulator

/*
 * ALPHA SOVEREIGN - SIMULATED AFFINITY BACKEND
 * =================================================================
 * Component Name: src/hardware/simulated.rs
 * Core Responsibility: محاكاة طبقة النواة للاختبار والقياس دون المساس بتقارب الخيوط الحقيقي (Testing Pillar).
 * Design Pattern: Mock Object / Fault Injector
 * Forensic Impact: يسمح بحقن التأخير والرموز السالبة والـ tid الفاسد، وإثبات أن كل مسار خروج يعيد التقارب.
 * =================================================================
 */

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{NativeErrorKind, NativeOp};
use super::{NativeAffinity, RawOutcome, Tid};

const WORD_BITS: usize = 64;

static NEXT_SIM_TID: AtomicI32 = AtomicI32::new(10_000);

thread_local! {
    static SIM_TID: Cell<Tid> = const { Cell::new(0) };
}

/// tid ثابت لكل خيط نظام تشغيل طوال عمره.
fn simulated_tid() -> Tid {
    SIM_TID.with(|slot| {
        if slot.get() == 0 {
            slot.set(NEXT_SIM_TID.fetch_add(1, Ordering::Relaxed));
        }
        slot.get()
    })
}

/// إعدادات المحاكي
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    pub cpu_count: usize,       // عدد الأنوية "الحقيقية" (البتات الأعلى تسقط)
    pub set_delay: Duration,    // تأخير مصطنع داخل set_affinity
    pub reset_delay: Duration,
    pub set_outcome: i32,       // 0 = نجاح، غير ذلك يعاد كما هو
    pub reset_outcome: i32,
    pub tid_override: Option<Tid>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            cpu_count: 8,
            set_delay: Duration::ZERO,
            reset_delay: Duration::ZERO,
            set_outcome: 0,
            reset_outcome: 0,
            tid_override: None,
        }
    }
}

pub struct SimulatedBackend {
    config: Mutex<SimulatedConfig>,
    masks: Mutex<HashMap<Tid, Vec<u64>>>,
    reset_log: Mutex<Vec<Tid>>,
    set_calls: AtomicUsize,
    reset_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl SimulatedBackend {
    pub fn new(config: Option<SimulatedConfig>) -> Self {
        Self {
            config: Mutex::new(config.unwrap_or_default()),
            masks: Mutex::new(HashMap::new()),
            reset_log: Mutex::new(Vec::new()),
            set_calls: AtomicUsize::new(0),
            reset_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_cpu_count(cpu_count: usize) -> Self {
        Self::new(Some(SimulatedConfig { cpu_count, ..SimulatedConfig::default() }))
    }

    pub fn set_delay(&self, delay: Duration) {
        self.config.lock().set_delay = delay;
    }

    pub fn set_reset_delay(&self, delay: Duration) {
        self.config.lock().reset_delay = delay;
    }

    /// حقن فشل أصلي في set_affinity بنفس رمز النواة.
    pub fn fail_set_with(&self, kind: NativeErrorKind) {
        self.config.lock().set_outcome = kind.code(NativeOp::SetAffinity);
    }

    pub fn set_set_outcome(&self, code: i32) {
        self.config.lock().set_outcome = code;
    }

    pub fn set_reset_outcome(&self, code: i32) {
        self.config.lock().reset_outcome = code;
    }

    pub fn set_tid_override(&self, tid: Option<Tid>) {
        self.config.lock().tid_override = tid;
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// كم مرة أعاد هذا الخيط تقاربه.
    pub fn reset_calls_for(&self, tid: Tid) -> usize {
        self.reset_log.lock().iter().filter(|t| **t == tid).count()
    }

    /// القناع الذي "تراه النواة" حالياً لهذا الخيط.
    pub fn current_mask(&self, tid: Tid) -> Option<Vec<u64>> {
        self.masks.lock().get(&tid).cloned()
    }

    fn snapshot(&self) -> SimulatedConfig {
        self.config.lock().clone()
    }

    fn tid(config: &SimulatedConfig) -> Tid {
        config.tid_override.unwrap_or_else(simulated_tid)
    }

    fn all_cores(cpu_count: usize) -> Vec<u64> {
        let len = cpu_count.max(1).div_ceil(WORD_BITS);
        let mut words = vec![0u64; len];
        for cpu in 0..cpu_count {
            words[len - 1 - cpu / WORD_BITS] |= 1u64 << (cpu % WORD_BITS);
        }
        words
    }

    /// مثل النواة: كل بت خارج نطاق الأنوية الحقيقية يسقط بصمت.
    fn truncate(mask: &[u64], cpu_count: usize) -> Vec<u64> {
        let len = cpu_count.max(1).div_ceil(WORD_BITS);
        let mut words = vec![0u64; len];
        for (offset, word) in mask.iter().rev().enumerate() {
            for bit in 0..WORD_BITS {
                let cpu = offset * WORD_BITS + bit;
                if cpu >= cpu_count {
                    break;
                }
                if word & (1u64 << bit) != 0 {
                    words[len - 1 - cpu / WORD_BITS] |= 1u64 << (cpu % WORD_BITS);
                }
            }
        }
        words
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(None)
    }
}

impl NativeAffinity for SimulatedBackend {
    fn name(&self) -> &'static str {
        "SIMULATED_AFFINITY"
    }

    fn set_affinity_raw(&self, mask: &[u64]) -> RawOutcome {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        let config = self.snapshot();

        if !config.set_delay.is_zero() {
            debug!("SIMULATOR: delaying set_affinity by {:?}", config.set_delay);
            thread::sleep(config.set_delay);
        }

        if config.set_outcome != 0 {
            return RawOutcome::failure(config.set_outcome);
        }
        if mask.is_empty() {
            return RawOutcome::failure(-1);
        }

        let applied = Self::truncate(mask, config.cpu_count);
        if applied.iter().all(|w| *w == 0) {
            // النواة ترفض قناعاً لا يحوي أي نواة حقيقية (EINVAL)
            return RawOutcome::failure(NativeErrorKind::SetAffinity.code(NativeOp::SetAffinity));
        }

        let tid = Self::tid(&config);
        self.masks.lock().insert(tid, applied.clone());
        RawOutcome::success(tid, applied)
    }

    fn reset_affinity_raw(&self) -> RawOutcome {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        let config = self.snapshot();

        if !config.reset_delay.is_zero() {
            thread::sleep(config.reset_delay);
        }

        let tid = Self::tid(&config);
        self.reset_log.lock().push(tid);

        if config.reset_outcome != 0 {
            return RawOutcome::failure(config.reset_outcome);
        }

        let applied = Self::all_cores(config.cpu_count);
        self.masks.lock().insert(tid, applied.clone());
        RawOutcome::success(tid, applied)
    }

    fn get_affinity_raw(&self) -> RawOutcome {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let config = self.snapshot();
        let tid = Self::tid(&config);

        let current = self
            .masks
            .lock()
            .get(&tid)
            .cloned()
            .unwrap_or_else(|| Self::all_cores(config.cpu_count));
        RawOutcome::success(tid, current)
    }
}
