//! Lock-step block windowing shared by the planner and the replayer.
//!
//! Both sides advance the old cursor by one `block_size` window per block
//! index, whatever the block's tag. The state is pure arithmetic so it can be
//! driven without opening files.

/// One block step: byte ranges of the old and new streams at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    /// 1-based block index, as used in artifact names.
    pub index: usize,
    pub old_offset: u64,
    pub old_len: usize,
    pub new_offset: u64,
    pub new_len: usize,
}

#[derive(Debug, Clone)]
pub struct BlockCursorPair {
    block_size: u64,
    old_total: u64,
    new_total: u64,
    old_offset: u64,
    new_offset: u64,
    index: usize,
}

impl BlockCursorPair {
    /// Cursor over two streams of known total length.
    pub fn new(block_size: u64, old_total: u64, new_total: u64) -> Self {
        assert!(block_size > 0, "block size must be positive");
        Self {
            block_size,
            old_total,
            new_total,
            old_offset: 0,
            new_offset: 0,
            index: 0,
        }
    }

    /// Cursor for replay, where the new length is only known once written.
    pub fn for_replay(block_size: u64, old_total: u64) -> Self {
        Self::new(block_size, old_total, 0)
    }

    pub fn new_offset(&self) -> u64 {
        self.new_offset
    }

    pub fn old_remaining(&self) -> u64 {
        self.old_total - self.old_offset
    }

    pub fn new_remaining(&self) -> u64 {
        self.new_total.saturating_sub(self.new_offset)
    }

    /// Both streams fit in a single block.
    pub fn is_single_block(&self) -> bool {
        self.old_total <= self.block_size && self.new_total <= self.block_size
    }

    /// Number of paired windows the diff loop will produce.
    pub fn paired_blocks(&self) -> u64 {
        self.old_total
            .div_ceil(self.block_size)
            .min(self.new_total.div_ceil(self.block_size))
    }

    /// Advance both cursors by one window. Returns `None` once either stream
    /// is exhausted.
    pub fn next_window(&mut self) -> Option<BlockWindow> {
        if self.old_remaining() == 0 || self.new_remaining() == 0 {
            return None;
        }
        let new_offset = self.new_offset;
        let new_len = self.new_remaining().min(self.block_size);
        self.new_offset += new_len;
        let mut window = self.step_old();
        window.new_offset = new_offset;
        window.new_len = new_len as usize;
        Some(window)
    }

    /// Advance the old cursor by one window (shorter at end of file, empty
    /// past it) and bump the block index. The new side is left untouched.
    pub fn step_old(&mut self) -> BlockWindow {
        self.index += 1;
        let old_offset = self.old_offset;
        let old_len = self.old_remaining().min(self.block_size);
        self.old_offset += old_len;
        BlockWindow {
            index: self.index,
            old_offset,
            old_len: old_len as usize,
            new_offset: self.new_offset,
            new_len: 0,
        }
    }

    /// Record `len` bytes emitted to the new stream outside `next_window`.
    pub fn commit_new(&mut self, len: u64) {
        self.new_offset += len;
        self.new_total = self.new_total.max(self.new_offset);
    }

    /// Index and length of the trailing raw-new block, if new bytes remain
    /// after the old stream ran out.
    pub fn trailing(&self) -> Option<(usize, u64)> {
        match self.new_remaining() {
            0 => None,
            n => Some((self.index + 1, n)),
        }
    }
}
