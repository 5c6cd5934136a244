// Teardown Ledger

/*
 * ALPHA SOVEREIGN - DISPOSAL COORDINATOR
 * =================================================================
 * Component Name: src/lifecycle/dispose.rs
 * Core Responsibility: منع إعلان "تم التخلص" بينما أي مشارك ما زال يلمس الحالة المشتركة (Stability Pillar).
 * Design Pattern: Reference Ledger / RAII Exit Guard
 * Forensic Impact: سجل المشاركين المعلقين يوضح بالضبط من الذي يؤخر الإغلاق (الخيط؟ start؟ الغلاف غير المتزامن؟).
 * =================================================================
 */

use std::sync::Arc;
use bitflags::bitflags;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{ThreadError, ThreadResult};

bitflags! {
    /// المشاركون الذين قد يلمسون حالة المقبض.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Participant: u8 {
        const WORKER = 0b001;
        const START = 0b010;
        const START_ASYNC = 0b100;
    }
}

impl Participant {
    fn slot(self) -> usize {
        self.bits().trailing_zeros() as usize
    }
}

#[derive(Debug, Default)]
struct DisposeRecord {
    used: Participant,
    // عداد لكل مشارك: قد يدخل start أكثر من مرة بالتوازي (ويُرفض أحدهما)
    inflight: [u32; 3],
    disposing: bool,
    disposed: bool,
}

impl DisposeRecord {
    fn pending(&self) -> Participant {
        let mut pending = Participant::empty();
        for flag in Participant::all().iter() {
            if self.inflight[flag.slot()] > 0 {
                pending |= flag;
            }
        }
        pending
    }

    /// يُعاد الحساب داخل نفس القفل الذي يسجل التأكيد.
    fn recompute(&mut self) -> bool {
        if self.disposed || !self.disposing || !self.pending().is_empty() {
            return false;
        }
        self.disposed = true;
        true
    }
}

pub struct DisposeCoordinator {
    label: String,
    record: Mutex<DisposeRecord>,
}

impl DisposeCoordinator {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            record: Mutex::new(DisposeRecord::default()),
        }
    }

    /// تسجيل دخول مشارك. يُرفض بعد بدء التخلص.
    pub fn register(&self, participant: Participant) -> ThreadResult<()> {
        let mut record = self.record.lock();
        if record.disposing {
            return Err(ThreadError::disposing());
        }
        record.used |= participant;
        record.inflight[participant.slot()] += 1;
        Ok(())
    }

    /// تسجيل دخول مع حارس يؤكد الخروج تلقائياً عند الإسقاط (كل مسارات الخروج، بما فيها panic).
    pub fn enter(self: &Arc<Self>, participant: Participant) -> ThreadResult<ExitGuard> {
        self.register(participant)?;
        Ok(ExitGuard { coordinator: Arc::clone(self), participant })
    }

    pub fn confirm_exit(&self, participant: Participant) {
        let mut record = self.record.lock();
        let slot = &mut record.inflight[participant.slot()];
        *slot = slot.saturating_sub(1);

        debug!("DISPOSE: [{}] {:?} exited (pending: {:?})", self.label, participant, record.pending());

        if record.recompute() {
            info!("DISPOSE: [{}] fully disposed after {:?} exit", self.label, participant);
        }
    }

    /// بدء التخلص. true فقط في المرة الأولى.
    pub fn begin_dispose(&self) -> bool {
        let mut record = self.record.lock();
        if record.disposing {
            return false;
        }
        record.disposing = true;

        info!("DISPOSE: [{}] disposing (pending: {:?})", self.label, record.pending());
        if record.recompute() {
            info!("DISPOSE: [{}] fully disposed (no participant in flight)", self.label);
        }
        true
    }

    /// العلم الرتيب الخام (يبقى true بعد اكتمال التخلص).
    pub fn is_disposing(&self) -> bool {
        self.record.lock().disposing
    }

    pub fn is_disposed(&self) -> bool {
        self.record.lock().disposed
    }

    pub fn used(&self) -> Participant {
        self.record.lock().used
    }

    pub fn used_async(&self) -> bool {
        self.used().contains(Participant::START_ASYNC)
    }

    pub fn pending(&self) -> Participant {
        self.record.lock().pending()
    }
}

/// حارس RAII: عند إسقاطه يُسجل خروج المشارك.
pub struct ExitGuard {
    coordinator: Arc<DisposeCoordinator>,
    participant: Participant,
}

impl ExitGuard {
    pub fn participant(&self) -> Participant {
        self.participant
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.coordinator.confirm_exit(self.participant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn coordinator() -> Arc<DisposeCoordinator> {
        Arc::new(DisposeCoordinator::new("test"))
    }

    #[test]
    fn test_unused_handle_disposes_immediately() {
        let c = coordinator();
        assert!(!c.is_disposed());
        assert!(c.begin_dispose());
        assert!(c.is_disposed());
        assert!(!c.begin_dispose(), "dispose is idempotent");
    }

    #[test]
    fn test_disposed_waits_for_every_used_participant() {
        let c = coordinator();
        let start = c.enter(Participant::START).unwrap();
        let worker = c.enter(Participant::WORKER).unwrap();

        c.begin_dispose();
        assert!(!c.is_disposed());
        assert_eq!(c.pending(), Participant::START | Participant::WORKER);

        drop(start);
        assert!(!c.is_disposed());
        drop(worker);
        assert!(c.is_disposed());
        assert!(!c.used_async());
    }

    #[test]
    fn test_async_wrapper_is_applicable_when_used() {
        let c = coordinator();
        let wrapper = c.enter(Participant::START_ASYNC).unwrap();
        {
            let _start = c.enter(Participant::START).unwrap();
            let _worker = c.enter(Participant::WORKER).unwrap();
        }
        c.begin_dispose();
        assert!(!c.is_disposed(), "async wrapper still in flight");
        assert!(c.used_async());
        drop(wrapper);
        assert!(c.is_disposed());
    }

    #[test]
    fn test_register_refused_after_dispose() {
        let c = coordinator();
        c.begin_dispose();
        let err = c.register(Participant::START).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Disposing);
        assert!(c.is_disposed(), "refused entry never un-disposes");
    }

    #[test]
    fn test_parallel_entries_are_counted() {
        let c = coordinator();
        let first = c.enter(Participant::START).unwrap();
        let second = c.enter(Participant::START).unwrap();
        c.begin_dispose();
        drop(second);
        assert!(!c.is_disposed());
        drop(first);
        assert!(c.is_disposed());
    }
}
