//! Row-tiered multi-way merge
//!
//! The product row `C[i, :]` is the merge of the B-rows selected by
//! `A[i, :]`, each weighted by the matching A-value. Rows are tiered by
//! fan-in `k = |A_i|`:
//!
//! - **short** (`k <= 32`): every source is held like a shift register;
//!   each step takes the minimum head column across all sources and
//!   advances the tied ones.
//! - **medium** (`k <= 32 * 3`): 32 lanes each own a small group of
//!   sources; the lane keeps its minimum at the front, the global
//!   minimum is reduced across lane tops, and tied lanes refill from
//!   their group after advancing.
//! - **long**: a complete binary heap over all sources keyed by head
//!   column, restored with `sift_down` after every advance.
//!
//! All tiers emit exactly the distinct columns of the merged rows in
//! strictly increasing order with summed products, so the counting pass
//! and the fill pass of SpGEMM traverse identically no matter which
//! tier a row takes.

use crate::dtype::{IndexType, Value};
use num_traits::Zero;
use smallvec::SmallVec;

/// SIMT group width the tier boundaries are derived from
pub(crate) const WARP_SIZE: usize = 32;
/// Heap arity and per-lane child count
pub(crate) const CHILD_COUNT: usize = 2;
/// Largest fan-in handled by the lane-heap tier
pub(crate) const TIER2_LIMIT: usize = WARP_SIZE * (CHILD_COUNT + 1);

/// One B-row being merged, weighted by its A-value
pub(crate) struct Source<'a, V, I> {
    pub cols: &'a [I],
    pub vals: &'a [V],
    pub weight: V,
    pub pos: usize,
}

impl<'a, V: Value, I: IndexType> Source<'a, V, I> {
    /// Create a source over a full row slice
    pub fn new(cols: &'a [I], vals: &'a [V], weight: V) -> Self {
        debug_assert_eq!(cols.len(), vals.len());
        Self {
            cols,
            vals,
            weight,
            pos: 0,
        }
    }

    /// Head column, or the sentinel when exhausted
    #[inline]
    fn head_col(&self) -> I {
        if self.pos < self.cols.len() {
            self.cols[self.pos]
        } else {
            I::MAX
        }
    }

    /// Product at the head position
    #[inline]
    fn head_product(&self) -> V {
        self.weight * self.vals[self.pos]
    }

    #[inline]
    fn advance(&mut self) {
        self.pos += 1;
    }
}

/// Receiver of merged `(column, value)` pairs
pub(crate) trait MergeSink<V, I> {
    fn emit(&mut self, col: I, value: V);
}

/// Counting-pass sink: the trivial accumulator
#[derive(Default)]
pub(crate) struct CountSink {
    pub count: usize,
}

impl<V, I> MergeSink<V, I> for CountSink {
    #[inline]
    fn emit(&mut self, _col: I, _value: V) {
        self.count += 1;
    }
}

/// Fill-pass sink writing column/value pairs
pub(crate) struct FillSink<'a, V, I> {
    pub cols: &'a mut Vec<I>,
    pub vals: &'a mut Vec<V>,
}

impl<V, I> MergeSink<V, I> for FillSink<'_, V, I> {
    #[inline]
    fn emit(&mut self, col: I, value: V) {
        self.cols.push(col);
        self.vals.push(value);
    }
}

/// Merge one row's sources into the sink, picking the tier by fan-in
pub(crate) fn merge_row<V: Value, I: IndexType, S: MergeSink<V, I>>(
    sources: &mut [Source<'_, V, I>],
    sink: &mut S,
) {
    if sources.is_empty() {
        return;
    }
    if sources.len() <= WARP_SIZE {
        merge_short(sources, sink);
    } else if sources.len() <= TIER2_LIMIT {
        merge_medium(sources, sink);
    } else {
        merge_long(sources, sink);
    }
}

/// Short tier: shift-register merge across all sources
pub(crate) fn merge_short<V: Value, I: IndexType, S: MergeSink<V, I>>(
    sources: &mut [Source<'_, V, I>],
    sink: &mut S,
) {
    loop {
        // warp-wide minimum over the register heads
        let mut min_col = I::MAX;
        for source in sources.iter() {
            min_col = min_col.min(source.head_col());
        }
        if min_col == I::MAX {
            return;
        }
        // ballot: every tied source contributes and advances
        let mut acc = V::zero();
        for source in sources.iter_mut() {
            while source.head_col() == min_col {
                acc += source.head_product();
                source.advance();
            }
        }
        sink.emit(min_col, acc);
    }
}

/// Medium tier: one lane per warp slot, children in shared storage
pub(crate) fn merge_medium<V: Value, I: IndexType, S: MergeSink<V, I>>(
    sources: &mut [Source<'_, V, I>],
    sink: &mut S,
) {
    // distribute sources round-robin over the lanes; slot 0 of each
    // lane is its top (minimum head column)
    let mut lanes: Vec<SmallVec<[usize; CHILD_COUNT + 1]>> =
        vec![SmallVec::new(); WARP_SIZE.min(sources.len())];
    let lane_count = lanes.len();
    for idx in 0..sources.len() {
        lanes[idx % lane_count].push(idx);
    }
    for lane in &mut lanes {
        restore_lane_top(lane, sources);
    }

    loop {
        // reduction over the lane tops
        let mut min_col = I::MAX;
        for lane in &lanes {
            min_col = min_col.min(sources[lane[0]].head_col());
        }
        if min_col == I::MAX {
            return;
        }
        let mut acc = V::zero();
        for lane in &mut lanes {
            // tied lanes drain every matching entry of their group,
            // refilling the top from the best child after each advance
            while sources[lane[0]].head_col() == min_col {
                let top = lane[0];
                acc += sources[top].head_product();
                sources[top].advance();
                restore_lane_top(lane, sources);
            }
        }
        sink.emit(min_col, acc);
    }
}

/// Swap the lane's minimum-head source into slot 0
#[inline]
fn restore_lane_top<V: Value, I: IndexType>(
    lane: &mut SmallVec<[usize; CHILD_COUNT + 1]>,
    sources: &[Source<'_, V, I>],
) {
    let mut best = 0;
    for slot in 1..lane.len() {
        if sources[lane[slot]].head_col() < sources[lane[best]].head_col() {
            best = slot;
        }
    }
    lane.swap(0, best);
}

/// Long tier: complete binary heap over all sources
///
/// The scratch layout mirrors the accelerator tiers (top nodes in
/// registers, next level in shared memory, remainder in global scratch);
/// on host the whole heap is one index array over the source pool.
pub(crate) fn merge_long<V: Value, I: IndexType, S: MergeSink<V, I>>(
    sources: &mut [Source<'_, V, I>],
    sink: &mut S,
) {
    let mut heap: Vec<usize> = (0..sources.len()).collect();
    // heapify bottom-up
    for pos in (0..sources.len() / CHILD_COUNT).rev() {
        sift_down(&mut heap, pos, sources);
    }

    loop {
        let min_col = sources[heap[0]].head_col();
        if min_col == I::MAX {
            return;
        }
        let mut acc = V::zero();
        while sources[heap[0]].head_col() == min_col {
            let top = heap[0];
            acc += sources[top].head_product();
            sources[top].advance();
            sift_down(&mut heap, 0, sources);
        }
        sink.emit(min_col, acc);
    }
}

/// Restore the heap property below `pos` by repeated min-child swaps
fn sift_down<V: Value, I: IndexType>(
    heap: &mut [usize],
    mut pos: usize,
    sources: &[Source<'_, V, I>],
) {
    loop {
        let first_child = CHILD_COUNT * pos + 1;
        if first_child >= heap.len() {
            return;
        }
        // min-child selection across the arity group
        let mut best = first_child;
        for child in first_child + 1..(first_child + CHILD_COUNT).min(heap.len()) {
            if sources[heap[child]].head_col() < sources[heap[best]].head_col() {
                best = child;
            }
        }
        if sources[heap[best]].head_col() >= sources[heap[pos]].head_col() {
            return;
        }
        heap.swap(pos, best);
        pos = best;
    }
}
