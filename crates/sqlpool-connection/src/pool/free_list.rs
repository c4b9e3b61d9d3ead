//! Stack of idle connection indices

/// Idle connection indices ordered by release time.
///
/// Both ends of the discipline work on the tail: the most recently released
/// connection is the first one handed out again, which keeps load on a small
/// warm subset and lets the rest go idle long enough to be reaped.
#[derive(Debug, Clone, Default)]
pub(crate) struct FreeList {
    indices: Vec<usize>,
}

impl FreeList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Release a connection onto the tail
    pub(crate) fn push(&mut self, index: usize) {
        debug_assert!(!self.contains(index), "index {} already free", index);
        self.indices.push(index);
    }

    /// Take the most recently released connection
    pub(crate) fn pop(&mut self) -> Option<usize> {
        self.indices.pop()
    }

    /// Remove a specific index, e.g. when its connection is reaped
    pub(crate) fn remove(&mut self, index: usize) -> bool {
        match self.indices.iter().rposition(|&i| i == index) {
            Some(pos) => {
                self.indices.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub(crate) fn len(&self) -> usize {
        self.indices.len()
    }

    /// Indices in release order, most recent last
    pub(crate) fn as_slice(&self) -> &[usize] {
        &self.indices
    }

    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, usize> {
        self.indices.drain(..)
    }
}
