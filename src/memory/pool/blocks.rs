/*!
 * Pool Block Table
 * Index-addressed block list with an address-ordered lookup
 *
 * Blocks live in a slot vector and link to their arena neighbours by index,
 * so splitting and merging are plain index edits. Two views sit on top:
 * - `by_address`: block start -> id, O(log n) pointer resolution
 * - `fit_order`: first-fit scan order (arena acquisition, then split order)
 */

use super::super::align::align_up;
use super::super::types::BlockInfo;
use crate::core::types::{Address, Size};
use std::collections::BTreeMap;

pub(super) type BlockId = usize;

/// Contiguous sub-range of an arena
#[derive(Debug, Clone)]
pub(super) struct Block {
    pub arena: Address,
    pub start: Address,
    pub size: Size,
    pub used: bool,
    pub prev: Option<BlockId>,
    pub next: Option<BlockId>,
    /// Aligned address handed to the caller while used
    pub user: Address,
    /// Bytes the caller asked for while used
    pub requested: Size,
    pub alignment: Size,
}

impl Block {
    pub fn spanning(arena: Address, start: Address, size: Size) -> Self {
        Self {
            arena,
            start,
            size,
            used: false,
            prev: None,
            next: None,
            user: start,
            requested: 0,
            alignment: 1,
        }
    }

    #[inline]
    pub fn end(&self) -> Address {
        self.start + self.size
    }

    #[inline]
    pub fn contains(&self, address: Address) -> bool {
        address >= self.start && address < self.end()
    }

    /// Aligned start for `size` bytes, if they fit once padding is applied
    pub fn fit(&self, size: Size, alignment: Size) -> Option<Address> {
        let user = align_up(self.start, alignment)?;
        let needed = (user - self.start).checked_add(size)?;
        (needed <= self.size).then_some(user)
    }

    pub fn info(&self) -> BlockInfo {
        BlockInfo {
            arena: self.arena,
            start: self.start,
            size: self.size,
            used: self.used,
        }
    }
}

#[derive(Debug, Default)]
pub(super) struct BlockTable {
    slots: Vec<Option<Block>>,
    vacant: Vec<BlockId>,
    by_address: BTreeMap<Address, BlockId>,
    fit_order: Vec<BlockId>,
}

impl BlockTable {
    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.slots.get_mut(id).and_then(Option::as_mut)
    }

    /// Register a block; it joins the end of the first-fit order
    pub fn insert(&mut self, block: Block) -> BlockId {
        let start = block.start;
        let id = match self.vacant.pop() {
            Some(id) => {
                self.slots[id] = Some(block);
                id
            }
            None => {
                self.slots.push(Some(block));
                self.slots.len() - 1
            }
        };
        self.by_address.insert(start, id);
        self.fit_order.push(id);
        id
    }

    fn remove(&mut self, id: BlockId) -> Option<Block> {
        let block = self.slots.get_mut(id)?.take()?;
        self.by_address.remove(&block.start);
        if let Some(pos) = self.fit_order.iter().position(|&other| other == id) {
            self.fit_order.remove(pos);
        }
        self.vacant.push(id);
        Some(block)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Block whose `[start, end)` contains `address`
    pub fn find_containing(&self, address: Address) -> Option<BlockId> {
        let (_, &id) = self.by_address.range(..=address).next_back()?;
        self.get(id)
            .filter(|block| block.contains(address))
            .map(|_| id)
    }

    /// First free block in scan order that holds `size` bytes at `alignment`
    pub fn first_fit(&self, size: Size, alignment: Size) -> Option<(BlockId, Address)> {
        self.fit_order.iter().find_map(|&id| {
            let block = self.get(id)?;
            if block.used {
                return None;
            }
            block.fit(size, alignment).map(|user| (id, user))
        })
    }

    /// Shrink `id` to `keep` bytes; the remainder becomes a new free block
    pub fn split(&mut self, id: BlockId, keep: Size) -> Option<BlockId> {
        let (arena, start, size, next) = {
            let block = self.get(id)?;
            (block.arena, block.start, block.size, block.next)
        };
        if keep == 0 || keep >= size {
            return None;
        }

        let mut remainder = Block::spanning(arena, start + keep, size - keep);
        remainder.prev = Some(id);
        remainder.next = next;
        let new_id = self.insert(remainder);

        if let Some(following) = next.and_then(|n| self.get_mut(n)) {
            following.prev = Some(new_id);
        }
        if let Some(block) = self.get_mut(id) {
            block.size = keep;
            block.next = Some(new_id);
        }
        Some(new_id)
    }

    /// Merge a free block with its free neighbours; returns the surviving id
    pub fn coalesce(&mut self, id: BlockId) -> BlockId {
        let next_free = self
            .get(id)
            .and_then(|block| block.next)
            .filter(|&next| self.is_free(next));
        if let Some(next) = next_free {
            self.absorb(id, next);
        }

        let prev_free = self
            .get(id)
            .and_then(|block| block.prev)
            .filter(|&prev| self.is_free(prev));
        match prev_free {
            Some(prev) => {
                self.absorb(prev, id);
                prev
            }
            None => id,
        }
    }

    /// Merge every run of adjacent free blocks; returns the number of merges
    pub fn merge_free_runs(&mut self) -> usize {
        let mut merges = 0;
        let ids: Vec<BlockId> = self.by_address.values().copied().collect();
        for id in ids {
            while self.is_free(id) {
                let next_free = self
                    .get(id)
                    .and_then(|block| block.next)
                    .filter(|&next| self.is_free(next));
                match next_free {
                    Some(next) => {
                        self.absorb(id, next);
                        merges += 1;
                    }
                    None => break,
                }
            }
        }
        merges
    }

    fn is_free(&self, id: BlockId) -> bool {
        self.get(id).map_or(false, |block| !block.used)
    }

    /// Fold `victim`, the block right after `keeper`, into `keeper`
    fn absorb(&mut self, keeper: BlockId, victim: BlockId) {
        let Some(absorbed) = self.remove(victim) else {
            return;
        };
        if let Some(following) = absorbed.next.and_then(|n| self.get_mut(n)) {
            following.prev = Some(keeper);
        }
        if let Some(block) = self.get_mut(keeper) {
            block.size += absorbed.size;
            block.next = absorbed.next;
        }
    }

    /// Blocks in address order
    pub fn iter(&self) -> impl Iterator<Item = &Block> + '_ {
        self.by_address.values().filter_map(move |&id| self.get(id))
    }

    pub fn free_bytes(&self) -> Size {
        self.iter()
            .filter(|block| !block.used)
            .map(|block| block.size)
            .sum()
    }

    pub fn largest_free(&self) -> Size {
        self.iter()
            .filter(|block| !block.used)
            .map(|block| block.size)
            .max()
            .unwrap_or(0)
    }

    /// `(total_free - largest_free) * 100 / total_free`, 0 when nothing is free
    pub fn fragmentation(&self) -> usize {
        let total = self.free_bytes();
        if total == 0 {
            return 0;
        }
        (total - self.largest_free()) * 100 / total
    }
}
