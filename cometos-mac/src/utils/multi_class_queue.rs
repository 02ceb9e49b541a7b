use crate::utils::TriplexArray;

struct Node {
    next: u8,
    prev: u8,
}

pub const MAX_NODE_COUNT: usize = u8::MAX as usize + 1;

struct MultiCycleList<const N1: usize, const N2: usize, const N3: usize> {
    nodes: TriplexArray<Node, N1, N2, N3>,
}

impl<const N1: usize, const N2: usize, const N3: usize> MultiCycleList<N1, N2, N3> {
    const _ASSERT: usize = MAX_NODE_COUNT - N1 - N2 - N3;

    pub fn new() -> Self {
        let _ = Self::_ASSERT;
        Self {
            nodes: TriplexArray::from_fn(|i| {
                let node = unwrap!(u8::try_from(i));
                Node {
                    next: node,
                    prev: node,
                }
            }),
        }
    }

    pub fn next(&self, node: u8) -> u8 {
        self.nodes[usize::from(node)].next
    }

    pub fn unbind(&mut self, node: u8) {
        let next = self.nodes[usize::from(node)].next;
        let prev = self.nodes[usize::from(node)].prev;
        self.nodes[usize::from(node)].prev = node;
        self.nodes[usize::from(node)].next = node;
        self.nodes[usize::from(next)].prev = prev;
        self.nodes[usize::from(prev)].next = next;
    }

    pub fn move_before(&mut self, node: u8, next: u8) {
        self.unbind(node);

        let prev = self.nodes[usize::from(next)].prev;
        self.nodes[usize::from(node)].next = next;
        self.nodes[usize::from(node)].prev = prev;
        self.nodes[usize::from(next)].prev = node;
        self.nodes[usize::from(prev)].next = node;
    }
}

/// FIFO queues ("classes") sharing one arena of entries
///
/// Every entry is linked into exactly one list: the free list, one of the class queues, or none
/// while a caller holds it. Lists are cyclic and anchored at a sentinel node, so unlinking an
/// entry resets both of its links and no list can keep pointing at it.
///
/// Node layout: `[free sentinel | class sentinels | entries]`.
pub struct MultiClassQueue<const CLASS_COUNT: usize, const ENTRY_COUNT: usize> {
    nodes: MultiCycleList<1, CLASS_COUNT, ENTRY_COUNT>,
    free_count: usize,
}

impl<const CLASS_COUNT: usize, const ENTRY_COUNT: usize> MultiClassQueue<CLASS_COUNT, ENTRY_COUNT> {
    const FREE: u8 = 0;
    const CLASS_OFFSET: u8 = 1;
    const ENTRY_OFFSET: u8 = (1 + CLASS_COUNT) as u8;

    pub fn new() -> Self {
        let mut nodes = MultiCycleList::new();
        for i in 0..ENTRY_COUNT {
            let entry = unwrap!(u8::try_from(i));
            nodes.move_before(Self::ENTRY_OFFSET + entry, Self::FREE);
        }

        Self {
            nodes,
            free_count: ENTRY_COUNT,
        }
    }

    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Takes the oldest free entry out of the free list.
    pub fn allocate(&mut self) -> Option<u8> {
        let entry = self.nodes.next(Self::FREE).checked_sub(Self::ENTRY_OFFSET)?;
        self.nodes.unbind(Self::ENTRY_OFFSET + entry);
        self.free_count -= 1;
        Some(entry)
    }

    /// Unlinks the entry from its class queue (if any) and appends it to the free list.
    pub fn release(&mut self, entry: u8) {
        assert!(usize::from(entry) < ENTRY_COUNT);
        self.nodes.move_before(Self::ENTRY_OFFSET + entry, Self::FREE);
        self.free_count += 1;
        assert!(self.free_count <= ENTRY_COUNT);
    }

    pub fn front(&self, class: u8) -> Option<u8> {
        assert!(usize::from(class) < CLASS_COUNT);
        self.nodes
            .next(Self::CLASS_OFFSET + class)
            .checked_sub(Self::ENTRY_OFFSET)
    }

    /// Returns the entry following `entry` in its queue.
    pub fn next(&self, entry: u8) -> Option<u8> {
        assert!(usize::from(entry) < ENTRY_COUNT);
        self.nodes
            .next(Self::ENTRY_OFFSET + entry)
            .checked_sub(Self::ENTRY_OFFSET)
    }

    pub fn push_back(&mut self, class: u8, entry: u8) {
        assert!(usize::from(class) < CLASS_COUNT);
        assert!(usize::from(entry) < ENTRY_COUNT);
        self.nodes
            .move_before(Self::ENTRY_OFFSET + entry, Self::CLASS_OFFSET + class);
    }
}
