//! Ordered teardown of GPU resources.
//!
//! Every long-lived GPU object is registered here right after it is created.
//! [`DeletionQueue::flush`] runs the registered actions newest first, so an
//! object is always destroyed before anything it was built from: framebuffers
//! before the image views they reference, views before their images, pipelines
//! before their layouts.

use std::borrow::Cow;

use tracing::{debug, trace, warn};

struct Teardown {
    label: Cow<'static, str>,
    action: Box<dyn FnOnce()>,
}

/// LIFO registry of teardown actions.
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use lumen_rhi::deletion::DeletionQueue;
///
/// let log = Rc::new(RefCell::new(Vec::new()));
/// let mut queue = DeletionQueue::new();
/// for name in ["image", "view", "framebuffer"] {
///     let log = Rc::clone(&log);
///     queue.push(name, move || log.borrow_mut().push(name));
/// }
/// queue.flush();
/// assert_eq!(*log.borrow(), ["framebuffer", "view", "image"]);
/// ```
#[derive(Default)]
pub struct DeletionQueue {
    actions: Vec<Teardown>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a teardown action. `label` only appears in logs.
    pub fn push<F>(&mut self, label: impl Into<Cow<'static, str>>, action: F)
    where
        F: FnOnce() + 'static,
    {
        let label = label.into();
        trace!("Registered teardown: {}", label);
        self.actions.push(Teardown {
            label,
            action: Box::new(action),
        });
    }

    /// Takes ownership of an RAII resource and drops it at flush time.
    pub fn retain<R: 'static>(&mut self, label: impl Into<Cow<'static, str>>, resource: R) {
        self.push(label, move || drop(resource));
    }

    /// Runs every registered action in reverse registration order and empties
    /// the queue. Actions already run are never run again.
    pub fn flush(&mut self) {
        if self.actions.is_empty() {
            return;
        }

        debug!("Flushing {} teardown action(s)", self.actions.len());
        while let Some(teardown) = self.actions.pop() {
            trace!("Teardown: {}", teardown.label);
            (teardown.action)();
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            warn!(
                "Deletion queue dropped with {} pending action(s), flushing",
                self.actions.len()
            );
            self.flush();
        }
    }
}

impl std::fmt::Debug for DeletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field(
                "pending",
                &self.actions.iter().map(|t| t.label.as_ref()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
