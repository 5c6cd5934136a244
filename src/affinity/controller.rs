// Affinity Transactions

/*
 * ALPHA SOVEREIGN - AFFINITY TRANSACTION CONTROLLER
 * =================================================================
 * Component Name: src/affinity/controller.rs
 * Core Responsibility: تسلسل كل قراءة/كتابة للثلاثية (المطلوب، المطبق، tid) لمقبض واحد (Stability Pillar).
 * Design Pattern: Single-Owner Transaction / Invariant Guard
 * Forensic Impact: إذا تغير الـ tid أثناء ملكية خيط واحد، فهناك خيط آخر يعدل حالة لا يملكها. نوقف العملية فوراً.
 * =================================================================
 */

use std::sync::Arc;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::ThreadResult;
use crate::hardware::{AffinityBackend, NativeReport, Tid};
use super::Affinity;

#[derive(Debug, Clone)]
struct AffinityTriple {
    requested: Affinity,
    applied: Affinity,
    // الـ tid المنشور: لا يتغير إلا عند نجاح الإقلاع
    tid: Tid,
    // مالك التشغيل الحالي (للتحقق من الهوية فقط، لا يُنشر)
    owner: Option<Tid>,
}

/// خرق ثبات الـ tid: الخيط الذي أعاد النتيجة ليس الخيط المالك.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityViolation {
    pub owner: Tid,
    pub observed: Tid,
}

/// فحص نقي: هل يطابق الـ tid العائد المالك الحالي (إن وُجد)؟
pub fn check_identity(owner: Option<Tid>, observed: Tid) -> Result<(), IdentityViolation> {
    match owner {
        Some(owner) if owner != observed => Err(IdentityViolation { owner, observed }),
        _ => Ok(()),
    }
}

pub struct AffinityController {
    label: String,
    backend: Arc<dyn AffinityBackend>,
    // قفل المعاملة: يُمسك طوال الاستدعاء الأصلي (كاتب واحد في كل لحظة)
    transaction: Mutex<()>,
    // قفل اللقطة: يُمسك لحظياً فقط، فلا تنتظر القراءات استدعاءً أصلياً بطيئاً
    state: Mutex<AffinityTriple>,
}

impl AffinityController {
    pub fn new(affinity: Affinity, backend: Arc<dyn AffinityBackend>, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            backend,
            transaction: Mutex::new(()),
            state: Mutex::new(AffinityTriple {
                requested: affinity,
                applied: Affinity::empty(),
                tid: 0,
                owner: None,
            }),
        }
    }

    pub fn get_affinity(&self) -> Affinity {
        self.state.lock().requested.clone()
    }

    pub fn get_applied_affinity(&self) -> Affinity {
        self.state.lock().applied.clone()
    }

    /// 0 حتى ينجح أول إقلاع.
    pub fn get_tid(&self) -> Tid {
        self.state.lock().tid
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn owner(&self) -> Option<Tid> {
        self.state.lock().owner
    }

    /// تطبيق تقارب جديد على الخيط المستدعي. للخيط العامل فقط.
    pub fn apply(&self, new_affinity: Affinity) -> ThreadResult<Tid> {
        let _tx = self.transaction.lock();
        let owner = self.owner();

        let report = self.backend.set_affinity(new_affinity.mask())?;
        self.enforce_identity(owner, &report);

        let mut state = self.state.lock();
        state.requested = new_affinity;
        state.applied = Affinity::new(report.applied);
        state.owner = Some(report.tid);

        info!(
            "AFFINITY: [{}] pinned tid={} cores={:?} applied={}",
            self.label,
            report.tid,
            state.requested.cores(),
            state.applied
        );
        Ok(report.tid)
    }

    /// إعادة الخيط المستدعي إلى كل الأنوية. للخيط العامل فقط، بما في ذلك مسارات الخطأ والإلغاء.
    pub fn reset(&self) -> ThreadResult<Tid> {
        let _tx = self.transaction.lock();
        let owner = self.owner();

        let report = self.backend.reset_affinity()?;
        self.enforce_identity(owner, &report);

        let everything = Affinity::new(report.applied);
        let mut state = self.state.lock();
        state.requested = everything.clone();
        state.applied = everything;
        state.owner = Some(report.tid);

        debug!("AFFINITY: [{}] reset tid={} applied={}", self.label, report.tid, state.applied);
        Ok(report.tid)
    }

    /// قراءة ما تراه النواة فعلاً للخيط المستدعي، دون تعديل الثلاثية.
    pub fn observe(&self) -> ThreadResult<Affinity> {
        let report = self.backend.get_affinity()?;
        self.enforce_identity(self.owner(), &report);
        Ok(Affinity::new(report.applied))
    }

    /// نشر الـ tid بشرط أن يحسم `settle` الإقلاع لصالح الخيط العامل.
    /// الحسم والنشر يجريان تحت نفس القفل: من يقرأ `get_tid` بعد رؤية الإقلاع يرى الـ tid.
    pub fn publish_with<F>(&self, tid: Tid, settle: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let mut state = self.state.lock();
        if let Err(violation) = check_identity(state.owner, tid) {
            drop(state);
            self.abort_on(violation);
        }
        if !settle() {
            return false;
        }
        state.tid = tid;
        true
    }

    /// فك ارتباط المالك عند خروج الخيط العامل نهائياً، ليتمكن خيط لاحق من الارتباط.
    /// آخر tid منشور يبقى مقروءاً حتى ينجح إقلاع جديد.
    pub fn release(&self) {
        let _tx = self.transaction.lock();
        self.state.lock().owner = None;
    }

    fn enforce_identity(&self, owner: Option<Tid>, report: &NativeReport) {
        if let Err(violation) = check_identity(owner, report.tid) {
            self.abort_on(violation);
        }
    }

    fn abort_on(&self, violation: IdentityViolation) -> ! {
        error!(
            target: "AFFINITY_CRITICAL",
            "TID_MISMATCH: [{}] owner={} observed={}. Single-owner invariant broken, aborting.",
            self.label,
            violation.owner,
            violation.observed
        );
        // خطأ غير قابل للإصلاح محلياً: أي تعديل لاحق غير آمن
        std::process::abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use crate::error::ErrorKind;
    use crate::hardware::simulated::SimulatedBackend;

    fn controller(backend: Arc<SimulatedBackend>) -> AffinityController {
        AffinityController::new(Affinity::from_words(vec![0b0110]), backend, "ctl-test")
    }

    #[test]
    fn test_identity_check_is_scoped_to_owner() {
        assert!(check_identity(None, 42).is_ok());
        assert!(check_identity(Some(42), 42).is_ok());
        assert_eq!(
            check_identity(Some(42), 43),
            Err(IdentityViolation { owner: 42, observed: 43 })
        );
    }

    #[test]
    fn test_apply_commits_triple() {
        let backend = Arc::new(SimulatedBackend::default());
        let ctl = controller(backend.clone());
        assert_eq!(ctl.get_tid(), 0);
        assert!(ctl.get_applied_affinity().mask().is_empty());

        let tid = ctl.apply(ctl.get_affinity()).unwrap();
        assert!(tid > 0);
        assert_eq!(ctl.get_tid(), 0, "tid is published only once bootstrap settles");
        assert_eq!(ctl.get_applied_affinity().cores(), vec![1, 2]);
        assert_eq!(backend.current_mask(tid), Some(vec![0b0110]));

        assert!(ctl.publish_with(tid, || true));
        assert_eq!(ctl.get_tid(), tid);
    }

    #[test]
    fn test_unsettled_run_never_publishes_tid() {
        let backend = Arc::new(SimulatedBackend::default());
        let ctl = controller(backend.clone());

        let tid = ctl.apply(ctl.get_affinity()).unwrap();
        // المستدعي حسم الإقلاع (مهلة) قبل الخيط العامل
        assert!(!ctl.publish_with(tid, || false));
        ctl.reset().unwrap();
        ctl.release();

        assert_eq!(ctl.get_tid(), 0);
        assert_eq!(backend.reset_calls_for(tid), 1);
    }

    #[test]
    fn test_failed_apply_leaves_triple_untouched() {
        let backend = Arc::new(SimulatedBackend::with_cpu_count(2));
        let ctl = controller(backend);
        let err = ctl.apply(ctl.get_affinity()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AppliedMaskMismatch);
        assert_eq!(ctl.get_tid(), 0);
        assert_eq!(ctl.get_affinity().cores(), vec![1, 2]);
    }

    #[test]
    fn test_reset_widens_to_all_cores() {
        let backend = Arc::new(SimulatedBackend::with_cpu_count(4));
        let ctl = controller(backend);
        ctl.apply(ctl.get_affinity()).unwrap();
        ctl.reset().unwrap();
        assert_eq!(ctl.get_affinity().cores(), vec![0, 1, 2, 3]);
        assert_eq!(ctl.get_applied_affinity(), ctl.get_affinity());
        assert_eq!(ctl.observe().unwrap().cores(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_release_allows_a_new_owner_thread() {
        let backend = Arc::new(SimulatedBackend::default());
        let ctl = Arc::new(controller(backend));

        let first = {
            let ctl = ctl.clone();
            thread::spawn(move || {
                let tid = ctl.apply(ctl.get_affinity()).unwrap();
                assert!(ctl.publish_with(tid, || true));
                ctl.reset().unwrap();
                ctl.release();
                tid
            })
            .join()
            .unwrap()
        };

        let second = {
            let ctl = ctl.clone();
            thread::spawn(move || {
                let tid = ctl.apply(Affinity::from_cores(&[3])).unwrap();
                assert!(ctl.publish_with(tid, || true));
                tid
            })
            .join()
            .unwrap()
        };

        assert_ne!(first, second);
        assert_eq!(ctl.get_tid(), second);
    }
}
