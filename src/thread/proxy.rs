// ALPHA SOVEREIGN - IN-THREAD AFFINITY PROXY
// Status: PRODUCTION

use std::marker::PhantomData;
use std::sync::Arc;

use crate::affinity::{Affinity, AffinityController};
use crate::error::ThreadResult;
use crate::hardware::Tid;

/// الواجهة التي يستلمها الـ callback لتعديل تقارب خيطه هو.
///
/// ليست `Send`: تعديل التقارب من خارج الخيط العامل يكسر ثبات الـ tid،
/// لذلك لا يمكن نقل الوكيل إلى خيط آخر.
pub struct ThreadHandleProxy {
    controller: Arc<AffinityController>,
    _pinned: PhantomData<*const ()>,
}

impl ThreadHandleProxy {
    pub(crate) fn new(controller: Arc<AffinityController>) -> Self {
        Self { controller, _pinned: PhantomData }
    }

    pub fn get_affinity(&self) -> Affinity {
        self.controller.get_affinity()
    }

    pub fn get_applied_affinity(&self) -> Affinity {
        self.controller.get_applied_affinity()
    }

    /// إعادة التثبيت على مجموعة أنوية أخرى أثناء التشغيل.
    pub fn set_affinity(&self, affinity: Affinity) -> ThreadResult<Tid> {
        self.controller.apply(affinity)
    }

    pub fn reset_affinity(&self) -> ThreadResult<Tid> {
        self.controller.reset()
    }

    /// ما تراه النواة الآن لهذا الخيط.
    pub fn observe(&self) -> ThreadResult<Affinity> {
        self.controller.observe()
    }

    pub fn tid(&self) -> Tid {
        self.controller.get_tid()
    }
}

impl std::fmt::Debug for ThreadHandleProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadHandleProxy")
            .field("tid", &self.tid())
            .field("affinity", &self.get_affinity().cores())
            .finish()
    }
}
