/*
 * ALPHA SOVEREIGN - NATIVE AFFINITY BOUNDARY
 * =================================================================
 * Component Name: src/hardware/mod.rs
 * Core Responsibility: عزل استدعاءات النواة (sched_setaffinity) خلف واجهة واحدة قابلة للاستبدال.
 * Design Pattern: Strategy / Anti-Corruption Layer
 * Forensic Impact: كل رمز نتيجة سالب يُترجم إلى سبب محدد، وكل نجاح يُتحقق منه (tid + القناع المطبق).
 * =================================================================
 */

use std::sync::Arc;
use tracing::trace;

use crate::affinity::AffinityMask;
use crate::error::{ErrorKind, NativeErrorKind, NativeOp, ThreadError, ThreadResult};

#[cfg(target_os = "linux")]
pub mod linux_native;
#[cfg(windows)]
pub mod windows_native;
#[cfg(not(any(target_os = "linux", windows)))]
pub mod portable;
pub mod simulated;
pub mod topology;

/// معرف خيط نظام التشغيل (tid). صالح فقط إذا كان > 0.
pub type Tid = i32;

/// النتيجة الخام كما تعيدها الطبقة الأصلية: رمز + tid + القناع المطبق.
#[derive(Debug, Clone, Default)]
pub struct RawOutcome {
    pub code: i32,
    pub tid: Tid,
    pub mask: Vec<u64>,
}

impl RawOutcome {
    pub fn success(tid: Tid, mask: Vec<u64>) -> Self {
        Self { code: 0, tid, mask }
    }

    pub fn failure(code: i32) -> Self {
        Self { code, ..Self::default() }
    }
}

/// تقرير ناجح ومُتحقق منه.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeReport {
    pub tid: Tid,
    pub applied: AffinityMask,
}

/// الاستدعاءات الأصلية كما هي (Raw Syscall Wrappers).
/// كل دالة تعمل على الخيط المستدعي نفسه.
pub trait NativeAffinity: Send + Sync {
    fn name(&self) -> &'static str;

    fn set_affinity_raw(&self, mask: &[u64]) -> RawOutcome;

    /// يجب أن يكون idempotent: يعيد الخيط إلى "كل الأنوية المتاحة".
    fn reset_affinity_raw(&self) -> RawOutcome;

    fn get_affinity_raw(&self) -> RawOutcome;
}

/// الواجهة التي يستهلكها المتحكم: أخطاء مُصنفة وتحقق بعد النجاح.
pub trait AffinityBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn set_affinity(&self, mask: &AffinityMask) -> ThreadResult<NativeReport>;

    fn reset_affinity(&self) -> ThreadResult<NativeReport>;

    fn get_affinity(&self) -> ThreadResult<NativeReport>;
}

impl<T: NativeAffinity> AffinityBackend for T {
    fn name(&self) -> &'static str {
        NativeAffinity::name(self)
    }

    fn set_affinity(&self, mask: &AffinityMask) -> ThreadResult<NativeReport> {
        // الرفض قبل أي استدعاء أصلي
        mask.validate()?;

        let report = interpret(NativeOp::SetAffinity, self.set_affinity_raw(mask.words()))?;
        verify_applied(mask, &report.applied)?;

        trace!("NATIVE: set_affinity tid={} applied={}", report.tid, report.applied);
        Ok(report)
    }

    fn reset_affinity(&self) -> ThreadResult<NativeReport> {
        interpret(NativeOp::ResetAffinity, self.reset_affinity_raw())
    }

    fn get_affinity(&self) -> ThreadResult<NativeReport> {
        interpret(NativeOp::GetAffinity, self.get_affinity_raw())
    }
}

/// تفسير رمز النتيجة: 0 نجاح، سالب = سبب من الجدول، موجب = نتيجة مجهولة.
pub fn interpret(op: NativeOp, raw: RawOutcome) -> ThreadResult<NativeReport> {
    if raw.code < 0 {
        return Err(ThreadError::native(op, NativeErrorKind::from_code(op, raw.code), raw.code));
    }
    if raw.code > 0 {
        return Err(ThreadError::new(
            ErrorKind::UnknownOutcome(raw.code),
            format!("op={} outcomeCode={}", op, raw.code),
        ));
    }
    if raw.tid <= 0 {
        return Err(ThreadError::new(ErrorKind::InvalidIdentifier, format!("op={} tid={}", op, raw.tid)));
    }

    Ok(NativeReport { tid: raw.tid, applied: AffinityMask::new(raw.mask) })
}

/// القناع المطبق يجب أن يطابق المطلوب في كل كلمة مشتركة (بمحاذاة اليمين).
/// المطلوب قد يكون أطول، فالنواة لا تعيد إلا بقدر عدد الأنوية الحقيقي.
pub fn verify_applied(requested: &AffinityMask, applied: &AffinityMask) -> ThreadResult<()> {
    match requested.first_mismatch(applied) {
        None => Ok(()),
        Some((index, wanted, actual)) => Err(ThreadError::new(
            ErrorKind::AppliedMaskMismatch,
            format!("word={} requested={:#x} applied={:#x}", index, wanted, actual),
        )),
    }
}

/// الطبقة الأصلية الافتراضية لهذه المنصة.
pub fn default_backend() -> Arc<dyn AffinityBackend> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(linux_native::LinuxNativeBackend::new())
    }
    #[cfg(windows)]
    {
        Arc::new(windows_native::WindowsNativeBackend::new())
    }
    #[cfg(not(any(target_os = "linux", windows)))]
    {
        Arc::new(portable::PortableBackend::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_outcome_codes() {
        let err = interpret(NativeOp::SetAffinity, RawOutcome::failure(-4)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Native(NativeErrorKind::SetAffinity));

        let err = interpret(NativeOp::ResetAffinity, RawOutcome::failure(3)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownOutcome(3));

        let err = interpret(NativeOp::GetAffinity, RawOutcome::success(0, vec![1])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);

        let ok = interpret(NativeOp::SetAffinity, RawOutcome::success(77, vec![0b0110])).unwrap();
        assert_eq!(ok.tid, 77);
        assert_eq!(ok.applied.words(), &[0b0110]);
    }

    #[test]
    fn test_verify_applied_detects_dropped_bits() {
        let requested = AffinityMask::new(vec![0b1111]);
        let truncated = AffinityMask::new(vec![0b0011]);
        let err = verify_applied(&requested, &truncated).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AppliedMaskMismatch);

        // كلمات إضافية في المطلوب خارج نطاق الأنوية الحقيقية لا تُقارن
        let wide = AffinityMask::new(vec![0xDEAD, 0b0011]);
        assert!(verify_applied(&wide, &truncated).is_ok());
    }
}
