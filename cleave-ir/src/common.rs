//! Shared-ownership primitives for IR nodes.
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Alias for a RefCell contained in an Rc reference. IR nodes are shared
/// through these handles; the block or function that owns a node keeps it
/// alive, and every other holder borrows through the cell at use time.
#[allow(clippy::upper_case_acronyms)]
pub type RRC<T> = Rc<RefCell<T>>;

/// Construct a new RRC.
pub fn rrc<T>(t: T) -> RRC<T> {
    Rc::new(RefCell::new(t))
}

/// A weak back pointer to an IR node owned elsewhere. Values point at
/// their defining operation and at their users through these without
/// keeping either alive, so erasing an operation cannot leak a cycle.
#[allow(clippy::upper_case_acronyms)]
pub struct WRC<T> {
    inner: Weak<RefCell<T>>,
}

impl<T> WRC<T> {
    /// A weak handle to `node`.
    pub fn new(node: &RRC<T>) -> Self {
        WRC {
            inner: Rc::downgrade(node),
        }
    }

    /// The node this handle points at.
    ///
    /// Holding a handle past the erasure of its target is a bug in the
    /// holder, so a dangling upgrade panics instead of limping on.
    pub fn upgrade(&self) -> RRC<T> {
        self.try_upgrade()
            .expect("weak handle outlived the node it points at")
    }

    /// The node this handle points at, or None if it was dropped.
    pub fn try_upgrade(&self) -> Option<RRC<T>> {
        self.inner.upgrade()
    }
}

impl<T> Clone for WRC<T> {
    fn clone(&self) -> Self {
        WRC {
            inner: Weak::clone(&self.inner),
        }
    }
}

/// The pointee may already be gone, so there is nothing useful to show.
impl<T> std::fmt::Debug for WRC<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WRC")
    }
}
