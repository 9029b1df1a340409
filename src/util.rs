/// Runs a closure when dropped unless it has been defused first.
pub struct ScopeGuard<F: FnOnce()> {
    dropfn: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    /// Forgets the closure without running it.
    pub fn defuse(mut self) {
        self.dropfn = None;
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(dropfn) = self.dropfn.take() {
            dropfn();
        }
    }
}

pub fn defer<F: FnOnce()>(dropfn: F) -> ScopeGuard<F> {
    ScopeGuard { dropfn: Some(dropfn) }
}
