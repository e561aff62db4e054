//! Values that become known only after their dependents are constructed.
//!
//! A session id, for example, exists only once the runtime has created the
//! session, while the tools that need it are built beforehand. Dependents
//! hold an `Arc<LateBound<T>>` and read through [`LateBound::require`].

use tokio::sync::OnceCell;

/// Errors from [`LateBound`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LateBoundError {
    /// `resolve` was called a second time.
    #[error("{0} already resolved")]
    AlreadyResolved(&'static str),
    /// Read before `resolve`.
    #[error("{0} not yet resolved")]
    Unresolved(&'static str),
}

/// Two-phase value: constructed empty, resolved exactly once.
#[derive(Debug)]
pub struct LateBound<T> {
    what: &'static str,
    cell: OnceCell<T>,
}

impl<T> LateBound<T> {
    /// Unresolved value. `what` names it in errors.
    pub fn new(what: &'static str) -> Self {
        Self {
            what,
            cell: OnceCell::new(),
        }
    }

    /// Already-resolved value.
    pub fn resolved(what: &'static str, value: T) -> Self {
        Self {
            what,
            cell: OnceCell::new_with(Some(value)),
        }
    }

    /// Resolve the value. Fails if it was already resolved.
    pub fn resolve(&self, value: T) -> Result<(), LateBoundError> {
        self.cell
            .set(value)
            .map_err(|_| LateBoundError::AlreadyResolved(self.what))
    }

    /// The value, if resolved.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// The value, or `Unresolved`.
    pub fn require(&self) -> Result<&T, LateBoundError> {
        self.cell.get().ok_or(LateBoundError::Unresolved(self.what))
    }

    /// Whether `resolve` has succeeded.
    pub fn is_resolved(&self) -> bool {
        self.cell.initialized()
    }
}
