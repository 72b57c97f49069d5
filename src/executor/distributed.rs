//! The distributed executor
//!
//! Owns a communicator and one local sub-executor for this rank.
//! Distributed matrices hold a shared handle to it; their collectives
//! run on the communicator and their local compute on the
//! sub-executor.

use crate::comm::Communicator;
use crate::error::Result;
use crate::executor::{Executor, HostExecutor};

/// Executor spanning the ranks of a communicator
#[derive(Clone)]
pub struct DistributedExecutor<C: Communicator, E: Executor> {
    comm: C,
    sub: E,
    root_rank: usize,
}

impl<C: Communicator, E: Executor> DistributedExecutor<C, E> {
    /// Create from a communicator handle and this rank's sub-executor
    pub fn create(comm: C, sub: E) -> Self {
        Self {
            comm,
            sub,
            root_rank: 0,
        }
    }

    /// The communicator
    pub fn communicator(&self) -> &C {
        &self.comm
    }

    /// This rank's local executor
    pub fn sub_executor(&self) -> &E {
        &self.sub
    }

    /// The host executor backing the sub-executor
    pub fn get_master(&self) -> HostExecutor {
        E::get_master()
    }

    /// This process's rank
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Number of ranks
    pub fn num_ranks(&self) -> usize {
        self.comm.size()
    }

    /// The rank targeted by gather-on-root operations (default 0)
    pub fn root_rank(&self) -> usize {
        self.root_rank
    }

    /// Change the root rank
    pub fn set_root_rank(&mut self, root: usize) {
        assert!(root < self.comm.size(), "root rank outside communicator");
        self.root_rank = root;
    }

    /// Barrier across ranks after draining the local device
    pub fn synchronize(&self) -> Result<()> {
        E::synchronize(&E::default_device())?;
        self.comm.barrier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalComm;
    use crate::executor::ReferenceExecutor;

    #[test]
    fn test_create_and_roots() {
        let mut comms = LocalComm::create(1);
        let mut exec = DistributedExecutor::create(comms.remove(0), ReferenceExecutor);
        assert_eq!(exec.rank(), 0);
        assert_eq!(exec.num_ranks(), 1);
        assert_eq!(exec.root_rank(), 0);
        exec.set_root_rank(0);
        exec.synchronize().unwrap();
    }
}
