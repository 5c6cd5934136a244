// Bootstrap Handshake

/*
 * ALPHA SOVEREIGN - BOOTSTRAP HANDSHAKE COORDINATOR
 * =================================================================
 * Component Name: src/lifecycle/bootstrap.rs
 * Core Responsibility: معرفة نتيجة إقلاع الخيط المثبت خلال مهلة محددة، دون انتظار حاجب (Stability Pillar).
 * Design Pattern: State Machine / Bounded Spin-Wait
 * Forensic Impact: الانتقال النهائي يُحسم بمقارنة-وتبديل ذري: إما أن الخيط أقلع، أو أن المستدعي استسلم. لا يوجد "الاثنان معاً".
 * =================================================================
 */

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{ErrorKind, ThreadError, ThreadResult};
use super::cancellation::CancellationSignal;

/// حالات الإقلاع. الحالات النهائية: Bootstrapped | TimedOut | Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BootstrapState {
    NotStarted = 0,
    Bootstrapping = 1,
    Bootstrapped = 2,
    TimedOut = 3,
    Failed = 4,
}

impl BootstrapState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => BootstrapState::NotStarted,
            1 => BootstrapState::Bootstrapping,
            2 => BootstrapState::Bootstrapped,
            3 => BootstrapState::TimedOut,
            _ => BootstrapState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BootstrapState::Bootstrapped | BootstrapState::TimedOut | BootstrapState::Failed)
    }
}

/// منسق إقلاع واحد لكل تشغيل (run). يُشارك بين المستدعي والخيط العامل.
pub struct BootstrapCoordinator {
    state: AtomicU8,
    // سبب الفشل يُكتب تحت نفس القفل الذي يحسم الانتقال
    cause: Mutex<Option<ThreadError>>,
}

impl BootstrapCoordinator {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(BootstrapState::NotStarted as u8),
            cause: Mutex::new(None),
        }
    }

    pub fn state(&self) -> BootstrapState {
        BootstrapState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: BootstrapState, to: BootstrapState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// NotStarted -> Bootstrapping (المستدعي، قبل إنشاء الخيط).
    pub fn begin(&self) -> bool {
        self.transition(BootstrapState::NotStarted, BootstrapState::Bootstrapping)
    }

    /// Bootstrapping -> Bootstrapped (الخيط العامل، بعد نجاح التثبيت).
    /// false تعني أن المستدعي حسم النتيجة قبلنا.
    pub fn mark_bootstrapped(&self) -> bool {
        self.transition(BootstrapState::Bootstrapping, BootstrapState::Bootstrapped)
    }

    /// Bootstrapping -> Failed مع السبب.
    pub fn fail(&self, cause: ThreadError) -> bool {
        let mut slot = self.cause.lock();
        let won = self.transition(BootstrapState::Bootstrapping, BootstrapState::Failed);
        if won {
            *slot = Some(cause);
        }
        won
    }

    /// Bootstrapping -> TimedOut (المستدعي فقط).
    pub fn time_out(&self) -> bool {
        self.transition(BootstrapState::Bootstrapping, BootstrapState::TimedOut)
    }

    pub fn cause(&self) -> Option<ThreadError> {
        self.cause.lock().clone()
    }

    fn failure(&self) -> ThreadError {
        let cause = self
            .cause()
            .unwrap_or_else(|| ThreadError::new(ErrorKind::ThreadBootstrap, "worker failed without a recorded cause"));

        // إشارات الخروج التعاوني لا تُلف كفشل إقلاع
        if cause.is_cooperative_exit() {
            return cause;
        }
        ThreadError::wrap(ErrorKind::ThreadBootstrap, "worker failed before bootstrap", cause)
    }

    /// حلقة الانتظار الدوار للمستدعي.
    ///
    /// لا نستخدم انتظاراً حاجباً (Condvar): نريد دقة مهلة حتمية، ونترك لجدولة النواة
    /// مهمة إزاحة هذا الخيط بعدل. `interrupt` يعيد سبب الخروج التعاوني إن وُجد
    /// (تخلص أو إلغاء)، ويُفحص في كل دورة.
    pub fn await_outcome<I>(&self, timeout: Duration, run_signal: &CancellationSignal, interrupt: I) -> ThreadResult<()>
    where
        I: Fn() -> Option<ThreadError>,
    {
        let started = Instant::now();
        let backoff = Backoff::new();

        loop {
            match self.state() {
                BootstrapState::Bootstrapped => {
                    debug!("BOOTSTRAP: observed after {:?}", started.elapsed());
                    return Ok(());
                }
                BootstrapState::Failed => return Err(self.failure()),
                BootstrapState::TimedOut => {
                    return Err(Self::timeout_error(timeout));
                }
                BootstrapState::NotStarted | BootstrapState::Bootstrapping => {}
            }

            if let Some(reason) = interrupt() {
                if self.fail(reason.clone()) {
                    return Err(reason);
                }
                // الخيط حسم النتيجة في نفس اللحظة، نقرأها في الدورة التالية
                continue;
            }

            if started.elapsed() >= timeout {
                if self.time_out() {
                    // ليخرج الخيط بسرعة إذا أقلع لاحقاً
                    run_signal.cancel();
                    warn!("BOOTSTRAP: worker did not pin itself within {:?}", timeout);
                    return Err(Self::timeout_error(timeout));
                }
                continue;
            }

            backoff.snooze();
        }
    }

    fn timeout_error(timeout: Duration) -> ThreadError {
        ThreadError::wrap(
            ErrorKind::ThreadBootstrap,
            "bootstrap did not complete",
            ThreadError::new(ErrorKind::BootstrapTimeout, format!("timeout={:?}", timeout)),
        )
    }
}

impl Default for BootstrapCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
