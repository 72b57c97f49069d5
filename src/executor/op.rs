//! Named operations with per-executor entry points
//!
//! An [`Operation`] is a value that carries its captured arguments in the
//! branch closures and one entry point per executor variant. Dispatch
//! picks the branch matching the executor's kind, logging launch and
//! completion; the reference branch defaults to the host branch when
//! absent.

use super::ExecKind;
use crate::error::{Error, Result};
use tracing::{trace, warn};

type Branch<'a, R> = Box<dyn FnOnce() -> Result<R> + 'a>;

/// A named operation with per-executor kernel branches
pub struct Operation<'a, R> {
    name: &'static str,
    host: Option<Branch<'a, R>>,
    reference: Option<Branch<'a, R>>,
    cuda: Option<Branch<'a, R>>,
    hip: Option<Branch<'a, R>>,
    distributed: Option<Branch<'a, R>>,
    universal: Option<Branch<'a, R>>,
}

impl<'a, R> Operation<'a, R> {
    /// Create an operation with no branches bound yet
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            host: None,
            reference: None,
            cuda: None,
            hip: None,
            distributed: None,
            universal: None,
        }
    }

    /// The operation name, as logged
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Bind the host branch
    pub fn on_host(mut self, f: impl FnOnce() -> Result<R> + 'a) -> Self {
        self.host = Some(Box::new(f));
        self
    }

    /// Bind the reference branch (defaults to the host branch)
    pub fn on_reference(mut self, f: impl FnOnce() -> Result<R> + 'a) -> Self {
        self.reference = Some(Box::new(f));
        self
    }

    /// Bind the CUDA branch
    pub fn on_cuda(mut self, f: impl FnOnce() -> Result<R> + 'a) -> Self {
        self.cuda = Some(Box::new(f));
        self
    }

    /// Bind the HIP branch
    pub fn on_hip(mut self, f: impl FnOnce() -> Result<R> + 'a) -> Self {
        self.hip = Some(Box::new(f));
        self
    }

    /// Bind the distributed branch
    pub fn on_distributed(mut self, f: impl FnOnce() -> Result<R> + 'a) -> Self {
        self.distributed = Some(Box::new(f));
        self
    }

    /// Bind a branch used by any variant without a dedicated one
    ///
    /// The usual form for kernels already specialized through the
    /// executor's client traits.
    pub fn on_all(mut self, f: impl FnOnce() -> Result<R> + 'a) -> Self {
        self.universal = Some(Box::new(f));
        self
    }

    /// Run the branch matching `kind`
    pub(crate) fn dispatch(self, kind: ExecKind, executor: &'static str) -> Result<R> {
        let branch = match kind {
            ExecKind::Host => self.host,
            // the reference executor runs the host algorithm unless it
            // carries a dedicated unoptimized branch
            ExecKind::Reference => self.reference.or(self.host),
            ExecKind::Cuda => self.cuda,
            ExecKind::Hip => self.hip,
            ExecKind::Distributed => self.distributed,
        };
        let branch = branch.or(self.universal);

        let Some(f) = branch else {
            warn!(operation = self.name, executor, "operation has no kernel");
            return Err(Error::not_implemented(self.name, executor));
        };

        trace!(operation = self.name, executor, "operation launched");
        match f() {
            Ok(r) => {
                trace!(operation = self.name, executor, "operation completed");
                Ok(r)
            }
            Err(e) => {
                warn!(operation = self.name, executor, error = %e, "operation failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_branch_runs() {
        let op = Operation::new("test_add").on_host(|| Ok(41 + 1));
        assert_eq!(op.dispatch(ExecKind::Host, "host").unwrap(), 42);
    }

    #[test]
    fn test_reference_defaults_to_host() {
        let op = Operation::new("test_default").on_host(|| Ok(7));
        assert_eq!(op.dispatch(ExecKind::Reference, "reference").unwrap(), 7);
    }

    #[test]
    fn test_reference_branch_preferred() {
        let op = Operation::new("test_pref")
            .on_host(|| Ok(1))
            .on_reference(|| Ok(2));
        assert_eq!(op.dispatch(ExecKind::Reference, "reference").unwrap(), 2);
    }

    #[test]
    fn test_missing_branch_errors() {
        let op: Operation<'_, i32> = Operation::new("test_missing").on_host(|| Ok(0));
        let err = op.dispatch(ExecKind::Cuda, "cuda").unwrap_err();
        assert!(matches!(err, Error::NotImplemented { op: "test_missing", .. }));
    }

    #[test]
    fn test_universal_branch_covers_all_kinds() {
        for kind in [ExecKind::Host, ExecKind::Reference, ExecKind::Cuda, ExecKind::Hip] {
            let op = Operation::new("test_all").on_all(|| Ok(5));
            assert_eq!(op.dispatch(kind, "any").unwrap(), 5);
        }
    }

    #[test]
    fn test_dedicated_branch_beats_universal() {
        let op = Operation::new("test_mix").on_all(|| Ok(1)).on_host(|| Ok(2));
        assert_eq!(op.dispatch(ExecKind::Host, "host").unwrap(), 2);
    }

    #[test]
    fn test_error_propagates() {
        let op: Operation<'_, ()> =
            Operation::new("test_err").on_host(|| Err(Error::Internal("boom".into())));
        assert!(op.dispatch(ExecKind::Host, "host").is_err());
    }
}
