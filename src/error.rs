// ALPHA SOVEREIGN - UNIFIED THREADING ERROR
// Status: PRODUCTION

use std::fmt;
use thiserror::Error;

/// الفعل الأصلي (Native Operation) الذي أنتج رمز النتيجة.
/// كل فعل له جدول رموز خاص به، لذلك لا يمكن تفسير الرمز بدون معرفة مصدره.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeOp {
    SetAffinity,
    ResetAffinity,
    GetAffinity,
}

impl fmt::Display for NativeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NativeOp::SetAffinity => "set_affinity",
            NativeOp::ResetAffinity => "reset_affinity",
            NativeOp::GetAffinity => "get_affinity",
        };
        f.write_str(name)
    }
}

/// أسباب فشل الطبقة الأصلية (Backend Failure Kinds)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeErrorKind {
    InvalidArgument,
    CpuSetAllocation,
    RealCpuSetAllocation,
    BitPositionOutOfRange,
    SetAffinity,
    CpuCountQuery,
    TooManyCpus,
    GetAffinity,
    ComparisonCpuSetAllocation,
    ComparisonMaskAllocation,
    OutputMaskAllocation,
    ThreadHandle,
    Unrecognized(i32),
}

impl NativeErrorKind {
    /// ترجمة رمز سالب إلى سبب، حسب جدول الفعل المعني.
    pub fn from_code(op: NativeOp, code: i32) -> Self {
        use NativeErrorKind::*;
        match (op, code) {
            (_, -1) => InvalidArgument,

            (NativeOp::SetAffinity, -2) => CpuSetAllocation,
            (NativeOp::SetAffinity, -3) => BitPositionOutOfRange,
            (NativeOp::SetAffinity, -4) => SetAffinity,
            (NativeOp::SetAffinity, -5) => CpuCountQuery,
            (NativeOp::SetAffinity, -6) => TooManyCpus,
            (NativeOp::SetAffinity, -7) => RealCpuSetAllocation,
            (NativeOp::SetAffinity, -8) => GetAffinity,
            (NativeOp::SetAffinity, -9) => ComparisonMaskAllocation,
            (NativeOp::SetAffinity, -10) => ThreadHandle,

            (NativeOp::ResetAffinity, -2) => CpuCountQuery,
            (NativeOp::ResetAffinity, -3) => TooManyCpus,
            (NativeOp::ResetAffinity, -4) => CpuSetAllocation,
            (NativeOp::ResetAffinity, -5) => SetAffinity,
            (NativeOp::ResetAffinity, -6) => ComparisonCpuSetAllocation,
            (NativeOp::ResetAffinity, -7) => GetAffinity,
            (NativeOp::ResetAffinity, -8) => ComparisonMaskAllocation,
            (NativeOp::ResetAffinity, -9) => ThreadHandle,

            (NativeOp::GetAffinity, -2) => CpuCountQuery,
            (NativeOp::GetAffinity, -3) => TooManyCpus,
            (NativeOp::GetAffinity, -4) => CpuSetAllocation,
            (NativeOp::GetAffinity, -5) => GetAffinity,
            (NativeOp::GetAffinity, -6) => OutputMaskAllocation,
            (NativeOp::GetAffinity, -7) => ThreadHandle,

            (_, other) => Unrecognized(other),
        }
    }

    /// الرمز الذي يطابق هذا السبب في جدول الفعل (عكس `from_code`).
    /// يستخدمه المحاكي لإنتاج نفس الرموز التي تنتجها النواة.
    pub fn code(self, op: NativeOp) -> i32 {
        (-10..=-1)
            .find(|c| Self::from_code(op, *c) == self)
            .unwrap_or(match self {
                NativeErrorKind::Unrecognized(code) => code,
                _ => -1,
            })
    }

    fn describe(&self) -> String {
        match self {
            NativeErrorKind::InvalidArgument => "Invalid arg initialization".into(),
            NativeErrorKind::CpuSetAllocation => "Failed to allocate cpu set".into(),
            NativeErrorKind::RealCpuSetAllocation => "Failed to allocate real cpu set".into(),
            NativeErrorKind::BitPositionOutOfRange => "Real bit position too large".into(),
            NativeErrorKind::SetAffinity => "Failed to set affinity".into(),
            NativeErrorKind::CpuCountQuery => "Failed to get real number of cpus".into(),
            NativeErrorKind::TooManyCpus => "Too many cpus".into(),
            NativeErrorKind::GetAffinity => "Failed to get affinity".into(),
            NativeErrorKind::ComparisonCpuSetAllocation => "Failed to allocate comparison cpu set".into(),
            NativeErrorKind::ComparisonMaskAllocation => "Failed to allocate comparison mask".into(),
            NativeErrorKind::OutputMaskAllocation => "Failed to allocate output mask".into(),
            NativeErrorKind::ThreadHandle => "Failed to get thread handle".into(),
            NativeErrorKind::Unrecognized(code) => format!("Unknown error ({})", code),
        }
    }
}

impl fmt::Display for NativeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// تصنيف الخطأ (Tagged Kind)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// قناع غير صالح (قبل أي استدعاء أصلي)
    Validation,
    Native(NativeErrorKind),
    /// رمز نتيجة موجب، غير معرّف في أي جدول
    UnknownOutcome(i32),
    InvalidIdentifier,
    AppliedMaskMismatch,
    BootstrapTimeout,
    AlreadyRunning,
    ThreadBootstrap,
    ThreadRuntime,
    /// رفض نظام التشغيل إنشاء الخيط
    ThreadSpawn,
    Disposing,
    Cancelled,
    DisposeTimeout,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => f.write_str("Validation Failed"),
            ErrorKind::Native(kind) => write!(f, "Native Call Failed [{}]", kind),
            ErrorKind::UnknownOutcome(code) => write!(f, "Unknown Outcome Code [{}]", code),
            ErrorKind::InvalidIdentifier => f.write_str("Invalid Thread Identifier"),
            ErrorKind::AppliedMaskMismatch => f.write_str("Applied Mask Mismatch"),
            ErrorKind::BootstrapTimeout => f.write_str("Bootstrap Timed Out"),
            ErrorKind::AlreadyRunning => f.write_str("Worker Already Running"),
            ErrorKind::ThreadBootstrap => f.write_str("Thread Bootstrap Failed"),
            ErrorKind::ThreadRuntime => f.write_str("Thread Runtime Failure"),
            ErrorKind::ThreadSpawn => f.write_str("Thread Spawn Failed"),
            ErrorKind::Disposing => f.write_str("Handle Disposing"),
            ErrorKind::Cancelled => f.write_str("Cancelled"),
            ErrorKind::DisposeTimeout => f.write_str("Dispose Wait Timed Out"),
            ErrorKind::Config => f.write_str("Configuration Error"),
        }
    }
}

/// الخطأ الموحد لطبقة الخيوط المثبتة.
/// نوع واحد مع وسم (kind) وسبب اختياري ملفوف، بدلاً من نوع لكل حالة.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {detail}")]
pub struct ThreadError {
    kind: ErrorKind,
    detail: String,
    #[source]
    cause: Option<Box<ThreadError>>,
}

impl ThreadError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into(), cause: None }
    }

    pub fn wrap(kind: ErrorKind, detail: impl Into<String>, cause: ThreadError) -> Self {
        Self { kind, detail: detail.into(), cause: Some(Box::new(cause)) }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, detail)
    }

    pub fn native(op: NativeOp, kind: NativeErrorKind, code: i32) -> Self {
        Self::new(ErrorKind::Native(kind), format!("op={} outcomeCode={}", op, code))
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "cancellation requested")
    }

    pub fn disposing() -> Self {
        Self::new(ErrorKind::Disposing, "handle is disposing")
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn cause(&self) -> Option<&ThreadError> {
        self.cause.as_deref()
    }

    /// أعمق سبب في السلسلة (مفيد لمعرفة ما حدث فعلاً أثناء الإقلاع).
    pub fn root_cause(&self) -> &ThreadError {
        let mut current = self;
        while let Some(next) = current.cause() {
            current = next;
        }
        current
    }

    /// إشارات الخروج التعاوني ليست أخطاء: الإلغاء أو التخلص.
    pub fn is_cooperative_exit(&self) -> bool {
        matches!(self.root_cause().kind, ErrorKind::Cancelled | ErrorKind::Disposing)
    }
}

pub type ThreadResult<T> = Result<T, ThreadError>;
