//! In-process communicator
//!
//! `LocalComm::create(n)` returns one handle per rank; each handle is
//! moved into its own thread. Collectives exchange byte buffers through
//! shared slots bracketed by two barrier waits: the first publishes all
//! writes before any rank reads, the second keeps a rank from starting
//! the next collective while others are still reading.

use super::{CommReduce, Communicator, ReduceOp};
use crate::dtype::Element;
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Barrier};

struct Shared {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<Vec<u8>>>,
    mailboxes: Mutex<HashMap<(usize, usize), VecDeque<Vec<u8>>>>,
    mail_ready: Condvar,
}

/// One rank's handle to an in-process communicator group
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalComm {
    /// Create a group of `size` ranks; handle `i` belongs to rank `i`
    pub fn create(size: usize) -> Vec<LocalComm> {
        assert!(size > 0, "communicator needs at least one rank");
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new(vec![Vec::new(); size]),
            mailboxes: Mutex::new(HashMap::new()),
            mail_ready: Condvar::new(),
        });
        (0..size)
            .map(|rank| LocalComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    fn publish(&self, bytes: Vec<u8>) {
        self.shared.slots.lock()[self.rank] = bytes;
        self.shared.barrier.wait();
    }

    fn read_all(&self) -> Vec<Vec<u8>> {
        let all = self.shared.slots.lock().clone();
        self.shared.barrier.wait();
        all
    }

    fn check_rank(&self, rank: usize, op: &'static str) -> Result<()> {
        if rank >= self.shared.size {
            return Err(Error::Collective {
                op,
                rank: self.rank,
                detail: format!("rank {} outside group of {}", rank, self.shared.size),
            });
        }
        Ok(())
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) -> Result<()> {
        self.shared.barrier.wait();
        Ok(())
    }

    fn all_gather_v<T: Element>(&self, send: &[T]) -> Result<Vec<Vec<T>>> {
        self.publish(bytemuck::cast_slice(send).to_vec());
        let all = self.read_all();
        Ok(all
            .into_iter()
            .map(|bytes| bytemuck::pod_collect_to_vec(&bytes))
            .collect())
    }

    fn all_reduce<T: CommReduce>(&self, op: ReduceOp, send: &[T]) -> Result<Vec<T>> {
        let gathered = self.all_gather_v(send)?;
        let mut acc: Vec<T> = gathered[0].clone();
        for contribution in &gathered[1..] {
            if contribution.len() != acc.len() {
                return Err(Error::Collective {
                    op: "all_reduce",
                    rank: self.rank,
                    detail: format!(
                        "buffer length mismatch: {} vs {}",
                        contribution.len(),
                        acc.len()
                    ),
                });
            }
            for (a, &b) in acc.iter_mut().zip(contribution) {
                *a = T::reduce(op, *a, b).ok_or(Error::Collective {
                    op: "all_reduce",
                    rank: self.rank,
                    detail: "reduction undefined for this element type".to_string(),
                })?;
            }
        }
        Ok(acc)
    }

    fn gather_v<T: Element>(&self, root: usize, send: &[T]) -> Result<Option<Vec<Vec<T>>>> {
        self.check_rank(root, "gather_v")?;
        self.publish(bytemuck::cast_slice(send).to_vec());
        let all = self.read_all();
        if self.rank == root {
            Ok(Some(
                all.into_iter()
                    .map(|bytes| bytemuck::pod_collect_to_vec(&bytes))
                    .collect(),
            ))
        } else {
            Ok(None)
        }
    }

    fn scatter_v<T: Element>(&self, root: usize, chunks: Option<Vec<Vec<T>>>) -> Result<Vec<T>> {
        self.check_rank(root, "scatter_v")?;
        if self.rank == root {
            let chunks = chunks.ok_or(Error::Collective {
                op: "scatter_v",
                rank: self.rank,
                detail: "root must provide per-rank chunks".to_string(),
            })?;
            if chunks.len() != self.shared.size {
                return Err(Error::Collective {
                    op: "scatter_v",
                    rank: self.rank,
                    detail: format!(
                        "{} chunks for {} ranks",
                        chunks.len(),
                        self.shared.size
                    ),
                });
            }
            let mut slots = self.shared.slots.lock();
            for (slot, chunk) in slots.iter_mut().zip(&chunks) {
                *slot = bytemuck::cast_slice(chunk).to_vec();
            }
            drop(slots);
            self.shared.barrier.wait();
        } else {
            self.shared.barrier.wait();
        }
        let mine = bytemuck::pod_collect_to_vec(&self.shared.slots.lock()[self.rank]);
        self.shared.barrier.wait();
        Ok(mine)
    }

    fn send<T: Element>(&self, to: usize, data: &[T]) -> Result<()> {
        self.check_rank(to, "send")?;
        let mut mailboxes = self.shared.mailboxes.lock();
        mailboxes
            .entry((self.rank, to))
            .or_default()
            .push_back(bytemuck::cast_slice(data).to_vec());
        self.shared.mail_ready.notify_all();
        Ok(())
    }

    fn recv<T: Element>(&self, from: usize) -> Result<Vec<T>> {
        self.check_rank(from, "recv")?;
        let mut mailboxes = self.shared.mailboxes.lock();
        loop {
            if let Some(queue) = mailboxes.get_mut(&(from, self.rank)) {
                if let Some(bytes) = queue.pop_front() {
                    return Ok(bytemuck::pod_collect_to_vec(&bytes));
                }
            }
            self.shared.mail_ready.wait(&mut mailboxes);
        }
    }
}
