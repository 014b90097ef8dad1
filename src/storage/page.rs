//! Page chain holding node slots in document order
//!
//! Each page holds at most `capacity` slots. A slot is addressed by the page
//! number and a tuple id (tid) handed out by the page; tids are never reused
//! within a page and page numbers are never reused within a chain, so an
//! address that once named node N can never later name a different node.
//!
//! Inserting into a full page splits it: the upper half of its slots moves to
//! a fresh page linked right after it. Every moved slot gets a new address.

use crate::dom::{Address, NodeId};

/// A node that changed address during a chain operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Moved {
    pub node: NodeId,
    pub old: Address,
    pub new: Address,
}

#[derive(Debug, Clone)]
struct Slot {
    tid: u32,
    node: NodeId,
}

#[derive(Debug, Clone)]
struct Page {
    number: u32,
    slots: Vec<Slot>,
    next_tid: u32,
}

impl Page {
    fn new(number: u32) -> Self {
        Self {
            number,
            slots: Vec::new(),
            next_tid: 0,
        }
    }

    fn allocate_tid(&mut self) -> u32 {
        let tid = self.next_tid;
        self.next_tid += 1;
        tid
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PageChain {
    capacity: usize,
    pages: Vec<Page>,
    next_page: u32,
    splits: u32,
}

impl PageChain {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            pages: Vec::new(),
            next_page: 0,
            splits: 0,
        }
    }

    fn new_page(&mut self) -> Page {
        let page = Page::new(self.next_page);
        self.next_page += 1;
        page
    }

    /// Node stored at `address`, if any
    pub fn locate(&self, address: Address) -> Option<NodeId> {
        self.position(address)
            .map(|(p, s)| self.pages[p].slots[s].node)
    }

    fn position(&self, address: Address) -> Option<(usize, usize)> {
        let p = self.pages.iter().position(|page| page.number == address.page)?;
        let s = self.pages[p]
            .slots
            .iter()
            .position(|slot| slot.tid == address.tid)?;
        Some((p, s))
    }

    /// Place `node` directly after the slot at `prev` (or first when `None`).
    ///
    /// Returns the node's address. Slots relocated by a page split are
    /// appended to `moved`.
    pub fn insert_after(
        &mut self,
        prev: Option<Address>,
        node: NodeId,
        moved: &mut Vec<Moved>,
    ) -> Option<Address> {
        let (mut p, mut s) = match prev {
            None => {
                if self.pages.is_empty() {
                    let page = self.new_page();
                    self.pages.push(page);
                }
                (0, 0)
            }
            Some(address) => {
                let (p, s) = self.position(address)?;
                (p, s + 1)
            }
        };

        if self.pages[p].slots.len() >= self.capacity {
            let kept = self.split(p, moved);
            if s > kept {
                s -= kept;
                p += 1;
            }
        }

        let page = &mut self.pages[p];
        let tid = page.allocate_tid();
        page.slots.insert(s, Slot { tid, node });
        Some(Address::new(page.number, tid))
    }

    /// Split page `p`; returns the number of slots it keeps
    fn split(&mut self, p: usize, moved: &mut Vec<Moved>) -> usize {
        let mid = self.pages[p].slots.len() / 2;
        let old_number = self.pages[p].number;
        let upper = self.pages[p].slots.split_off(mid);

        let mut fresh = self.new_page();
        for slot in upper {
            let tid = fresh.allocate_tid();
            moved.push(Moved {
                node: slot.node,
                old: Address::new(old_number, slot.tid),
                new: Address::new(fresh.number, tid),
            });
            fresh.slots.push(Slot {
                tid,
                node: slot.node,
            });
        }
        self.pages.insert(p + 1, fresh);
        self.splits += 1;
        mid
    }

    /// Free the slot at `address`. Empty pages stay in the chain.
    pub fn remove(&mut self, address: Address) -> bool {
        match self.position(address) {
            Some((p, s)) => {
                self.pages[p].slots.remove(s);
                true
            }
            None => false,
        }
    }

    /// Rewrite the chain as densely packed fresh pages holding `order`.
    ///
    /// Resets the split count. Every node is reported as moved.
    pub fn repack(&mut self, order: &[NodeId]) -> Vec<Moved> {
        let old: std::collections::HashMap<NodeId, Address> = self
            .slots()
            .into_iter()
            .map(|(address, node)| (node, address))
            .collect();

        let mut pages = Vec::new();
        let mut moved = Vec::with_capacity(order.len());
        for chunk in order.chunks(self.capacity) {
            let mut page = self.new_page();
            for &node in chunk {
                let tid = page.allocate_tid();
                page.slots.push(Slot { tid, node });
                if let Some(&previous) = old.get(&node) {
                    moved.push(Moved {
                        node,
                        old: previous,
                        new: Address::new(page.number, tid),
                    });
                }
            }
            pages.push(page);
        }
        self.pages = pages;
        self.splits = 0;
        moved
    }

    /// All occupied slots in chain order
    pub fn slots(&self) -> Vec<(Address, NodeId)> {
        self.pages
            .iter()
            .flat_map(|page| {
                page.slots
                    .iter()
                    .map(move |slot| (Address::new(page.number, slot.tid), slot.node))
            })
            .collect()
    }

    pub fn split_count(&self) -> u32 {
        self.splits
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}
