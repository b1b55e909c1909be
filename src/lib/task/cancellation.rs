//! Cooperative cancellation.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::{Interrupt, WorkResult};

struct TokenNode {
    cancelled: AtomicBool,
    parent: Option<Arc<TokenNode>>,
}

impl TokenNode {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self.parent.as_ref().is_some_and(|parent| parent.is_cancelled())
    }
}

/// A cancellation signal observed by workers at their polling points.
///
/// Tokens form a tree: a token created with [`CancellationToken::child`] reports cancelled
/// when it or any ancestor has been cancelled, while cancelling a child leaves the parent
/// untouched. Nothing is preempted; workers call [`CancellationToken::check`] each iteration.
#[derive(Clone)]
pub struct CancellationToken {
    node: Arc<TokenNode>,
}

impl CancellationToken {
    /// Create a new root token.
    #[must_use]
    pub fn new() -> Self {
        Self { node: Arc::new(TokenNode { cancelled: AtomicBool::new(false), parent: None }) }
    }

    /// Create a token that is also cancelled whenever `self` is.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            node: Arc::new(TokenNode {
                cancelled: AtomicBool::new(false),
                parent: Some(Arc::clone(&self.node)),
            }),
        }
    }

    /// Raise the signal. Idempotent.
    pub fn cancel(&self) {
        self.node.cancelled.store(true, Ordering::Release);
    }

    /// Returns true if this token or an ancestor has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.node.is_cancelled()
    }

    /// Polling point for worker loops.
    ///
    /// # Errors
    /// Returns `Interrupt::Cancelled` once the token has been cancelled.
    pub fn check(&self) -> WorkResult {
        if self.is_cancelled() { Err(Interrupt::Cancelled) } else { Ok(()) }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken").field("cancelled", &self.is_cancelled()).finish()
    }
}
