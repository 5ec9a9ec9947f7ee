//! Specialized collection types

/// Index into a [`SlotPool`] tagged with the slot's generation
///
/// A slot's generation changes every time it is vacated, so an index kept past the
/// removal of its item never resolves to the item that later reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolIndex {
    /// Slot position
    pub index: u32,
    /// Generation of the slot when the item was inserted
    pub generation: u32,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    item: Option<T>,
}

/// Fixed-capacity pool of optional slots
///
/// Free slots are found by a linear scan from the start, so the lowest free slot is
/// always reused first. Inserting into a full pool fails instead of growing.
#[derive(Debug)]
pub struct SlotPool<T> {
    slots: Vec<Slot<T>>,
}

impl<T> SlotPool<T> {
    /// Create a pool with `capacity` empty slots
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity).map(|_| Slot { generation: 0, item: None }).collect();
        Self { slots }
    }

    /// Number of slots, occupied or not
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.item.is_some()).count()
    }

    /// Whether every slot is free
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.item.is_none())
    }

    /// Position of the first free slot, if any
    pub fn find_free(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.item.is_none())
    }

    /// Insert an item into the first free slot; `None` when the pool is full
    pub fn insert(&mut self, item: T) -> Option<PoolIndex> {
        let index = self.find_free()?;
        let slot = &mut self.slots[index];
        slot.item = Some(item);
        Some(PoolIndex {
            index: u32::try_from(index).ok()?,
            generation: slot.generation,
        })
    }

    /// Remove the item at `index`, freeing its slot
    pub fn remove(&mut self, index: PoolIndex) -> Option<T> {
        let slot = self.slot_mut(index)?;
        let item = slot.item.take();
        slot.generation = slot.generation.wrapping_add(1);
        item
    }

    /// Whether `index` still refers to a live item
    pub fn contains(&self, index: PoolIndex) -> bool {
        self.get(index).is_some()
    }

    /// Get an item by index
    pub fn get(&self, index: PoolIndex) -> Option<&T> {
        let slot = self.slots.get(index.index as usize)?;
        if slot.generation == index.generation {
            slot.item.as_ref()
        } else {
            None
        }
    }

    /// Get a mutable reference to an item by index
    pub fn get_mut(&mut self, index: PoolIndex) -> Option<&mut T> {
        self.slot_mut(index)?.item.as_mut()
    }

    /// Indices of every occupied slot in slot order
    pub fn indices(&self) -> Vec<PoolIndex> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.item.is_some())
            .filter_map(|(index, slot)| {
                Some(PoolIndex {
                    index: u32::try_from(index).ok()?,
                    generation: slot.generation,
                })
            })
            .collect()
    }

    /// Iterate over occupied slots
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| slot.item.as_ref())
    }

    /// Iterate mutably over occupied slots
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(|slot| slot.item.as_mut())
    }

    /// Remove every item, returning them in slot order
    pub fn drain(&mut self) -> Vec<T> {
        self.slots
            .iter_mut()
            .filter_map(|slot| {
                let item = slot.item.take()?;
                slot.generation = slot.generation.wrapping_add(1);
                Some(item)
            })
            .collect()
    }

    fn slot_mut(&mut self, index: PoolIndex) -> Option<&mut Slot<T>> {
        let slot = self.slots.get_mut(index.index as usize)?;
        (slot.generation == index.generation && slot.item.is_some()).then_some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_fails_when_full() {
        let mut pool = SlotPool::with_capacity(2);
        assert!(pool.insert("a").is_some());
        assert!(pool.insert("b").is_some());
        assert!(pool.insert("c").is_none());
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_lowest_free_slot_is_reused() {
        let mut pool = SlotPool::with_capacity(3);
        let a = pool.insert(1).unwrap();
        let _b = pool.insert(2).unwrap();
        pool.remove(a);
        let c = pool.insert(3).unwrap();
        assert_eq!(c.index, a.index);
        assert_ne!(c.generation, a.generation);
    }

    #[test]
    fn test_stale_index_does_not_resolve() {
        let mut pool = SlotPool::with_capacity(1);
        let first = pool.insert(10).unwrap();
        assert_eq!(pool.remove(first), Some(10));
        let second = pool.insert(20).unwrap();
        assert!(pool.get(first).is_none());
        assert!(pool.remove(first).is_none());
        assert_eq!(pool.get(second), Some(&20));
    }

    #[test]
    fn test_drain_empties_pool() {
        let mut pool = SlotPool::with_capacity(4);
        pool.insert('x');
        pool.insert('y');
        assert_eq!(pool.drain(), vec!['x', 'y']);
        assert!(pool.is_empty());
        assert_eq!(pool.capacity(), 4);
    }
}
