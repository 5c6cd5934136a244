// ALPHA SOVEREIGN - LINKED CANCELLATION SIGNAL
// Status: FINAL PRODUCTION

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ThreadError, ThreadResult};

struct SignalNode {
    requested: AtomicBool,
    parent: Option<CancellationSignal>,
}

/// إشارة إلغاء تعاونية، أحادية الاتجاه ولا رجعة فيها.
/// إلغاء الأب يلغي كل الأبناء، وإلغاء الابن لا يمس الأب أبداً.
#[derive(Clone)]
pub struct CancellationSignal {
    node: Arc<SignalNode>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::linked(None)
    }

    /// إشارة جديدة مربوطة بأب اختياري.
    pub fn linked(parent: Option<&CancellationSignal>) -> Self {
        Self {
            node: Arc::new(SignalNode {
                requested: AtomicBool::new(false),
                parent: parent.cloned(),
            }),
        }
    }

    pub fn child(&self) -> Self {
        Self::linked(Some(self))
    }

    pub fn cancel(&self) {
        self.node.requested.store(true, Ordering::SeqCst);
    }

    /// فحص الإشارة وكل أسلافها (دالة نقية، لا تغير شيئاً).
    pub fn is_cancelled(&self) -> bool {
        let mut current = Some(self);
        while let Some(signal) = current {
            if signal.node.requested.load(Ordering::Acquire) {
                return true;
            }
            current = signal.node.parent.as_ref();
        }
        false
    }

    /// هل أُلغيت هذه الإشارة بنفسها (وليس عبر أب)؟
    pub fn is_cancelled_locally(&self) -> bool {
        self.node.requested.load(Ordering::Acquire)
    }

    /// نقطة تفتيش للكود التعاوني: `signal.check()?`
    pub fn check(&self) -> ThreadResult<()> {
        if self.is_cancelled() {
            return Err(ThreadError::cancelled());
        }
        Ok(())
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("cancelled", &self.is_cancelled())
            .field("linked", &self.node.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parent_cancels_children_not_reverse() {
        let root = CancellationSignal::new();
        let handle = root.child();
        let run = handle.child();

        run.cancel();
        assert!(run.is_cancelled());
        assert!(!handle.is_cancelled());
        assert!(!root.is_cancelled());

        let sibling = handle.child();
        root.cancel();
        assert!(handle.is_cancelled());
        assert!(sibling.is_cancelled());
        assert!(!sibling.is_cancelled_locally());
        assert_eq!(sibling.check().unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_cancel_is_monotonic() {
        let signal = CancellationSignal::new();
        signal.cancel();
        signal.cancel();
        assert!(signal.is_cancelled());
        assert!(signal.clone().is_cancelled());
    }
}
