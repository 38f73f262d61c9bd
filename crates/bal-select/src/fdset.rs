//! Portable descriptor sets
//!
//! A growable bitset indexed by descriptor value. The poller fills three
//! of these (read, write, except) from the watch list; a [`Multiplexer`]
//! translates them to and from its native form.
//!
//! [`Multiplexer`]: crate::mux::Multiplexer

use bal_core::Descriptor;

/// Number of bits per block
const BITS_PER_BLOCK: usize = 64;

/// Set of descriptors, one bit per descriptor value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DescriptorSet {
    blocks: Vec<u64>,
}

#[inline]
fn index_of(sd: Descriptor) -> Option<usize> {
    usize::try_from(sd).ok()
}

impl DescriptorSet {
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Pre-size for descriptors below `max`.
    pub fn with_max(max: usize) -> Self {
        Self {
            blocks: vec![0; (max + BITS_PER_BLOCK - 1) / BITS_PER_BLOCK],
        }
    }

    /// Add `sd`. Negative descriptors are ignored.
    #[inline]
    pub fn insert(&mut self, sd: Descriptor) {
        let Some(idx) = index_of(sd) else { return };
        let block = idx / BITS_PER_BLOCK;
        if block >= self.blocks.len() {
            self.blocks.resize(block + 1, 0);
        }
        self.blocks[block] |= 1u64 << (idx % BITS_PER_BLOCK);
    }

    #[inline]
    pub fn remove(&mut self, sd: Descriptor) {
        let Some(idx) = index_of(sd) else { return };
        if let Some(b) = self.blocks.get_mut(idx / BITS_PER_BLOCK) {
            *b &= !(1u64 << (idx % BITS_PER_BLOCK));
        }
    }

    #[inline]
    pub fn contains(&self, sd: Descriptor) -> bool {
        let Some(idx) = index_of(sd) else { return false };
        match self.blocks.get(idx / BITS_PER_BLOCK) {
            Some(b) => b & (1u64 << (idx % BITS_PER_BLOCK)) != 0,
            None => false,
        }
    }

    /// Empty the set, keeping its storage.
    pub fn clear(&mut self) {
        self.blocks.iter_mut().for_each(|b| *b = 0);
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|&b| b == 0)
    }

    pub fn count(&self) -> usize {
        self.blocks.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Add every member of `other`.
    pub fn union_with(&mut self, other: &DescriptorSet) {
        if other.blocks.len() > self.blocks.len() {
            self.blocks.resize(other.blocks.len(), 0);
        }
        for (dst, src) in self.blocks.iter_mut().zip(other.blocks.iter()) {
            *dst |= *src;
        }
    }

    /// Members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Descriptor> + '_ {
        self.blocks.iter().enumerate().flat_map(|(block_idx, &block)| {
            let mut bits = block;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some((block_idx * BITS_PER_BLOCK + bit) as Descriptor)
            })
        })
    }
}

impl std::fmt::Debug for DescriptorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<Descriptor> for DescriptorSet {
    fn from_iter<I: IntoIterator<Item = Descriptor>>(iter: I) -> Self {
        let mut set = DescriptorSet::new();
        for sd in iter {
            set.insert(sd);
        }
        set
    }
}

/// The three readiness sets of one poll call.
#[derive(Debug, Clone, Default)]
pub struct ReadySets {
    pub read: DescriptorSet,
    pub write: DescriptorSet,
    pub except: DescriptorSet,
}

impl ReadySets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.read.clear();
        self.write.clear();
        self.except.clear();
    }

    pub fn get(&self, kind: SetKind) -> &DescriptorSet {
        match kind {
            SetKind::Read => &self.read,
            SetKind::Write => &self.write,
            SetKind::Except => &self.except,
        }
    }

    pub fn get_mut(&mut self, kind: SetKind) -> &mut DescriptorSet {
        match kind {
            SetKind::Read => &mut self.read,
            SetKind::Write => &mut self.write,
            SetKind::Except => &mut self.except,
        }
    }
}

/// Which readiness set a pass is classifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetKind {
    Read,
    Write,
    Except,
}

impl SetKind {
    /// Dispatch order within one cycle.
    pub const ORDER: [SetKind; 3] = [SetKind::Read, SetKind::Write, SetKind::Except];
}
