//! The object table: a fixed-capacity array of slots with reference
//! counting, tagged small integers, and free-slot reclamation.
//!
//! `Memory` is the sole owner of every slot; every other pebble-vm module
//! reaches an object only through its methods.

use pebble_types::{Profile, Ref};
use tracing::{debug, trace};

use crate::consts::MAX_OBJECT_SIZE;
use crate::error::MemoryError;

pub mod image;

#[derive(Debug, Clone)]
enum Body {
    Empty,
    Pointers(Vec<Ref>),
    Bytes(Vec<u8>),
}

impl Body {
    fn declared_size(&self) -> i32 {
        match self {
            Body::Empty => 0,
            Body::Pointers(v) => v.len() as i32,
            Body::Bytes(v) => -(v.len() as i32),
        }
    }
}

#[derive(Debug, Clone)]
struct LiveSlot {
    class: Ref,
    count: u32,
    body: Body,
}

#[derive(Debug, Clone)]
enum Slot {
    Free { next: Option<usize> },
    Live(LiveSlot),
}

/// A read-only view of one live object's shape, used by the image writer
/// and by diagnostics; never handed out as a `&mut`.
pub struct ObjectView<'a> {
    /// The object's class reference.
    pub class: Ref,
    /// `Some` (possibly empty) if this object has pointer shape.
    pub pointers: Option<&'a [Ref]>,
    /// `Some` (possibly empty) if this object has byte shape.
    pub bytes: Option<&'a [u8]>,
}

/// The fixed-capacity object table.
#[derive(Debug, Clone)]
pub struct Memory {
    profile: Profile,
    capacity: usize,
    slots: Vec<Slot>,
    free_head: Option<usize>,
}

fn check_index(len: usize, index: usize) -> Result<usize, MemoryError> {
    if index >= 1 && index <= len {
        Ok(index - 1)
    } else {
        Err(MemoryError::IndexOutOfRange { index, len })
    }
}

impl Memory {
    /// Build an empty table of the given profile and slot capacity. Slot 0
    /// is reserved for the immortal `nil` object.
    pub fn new(profile: Profile, capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity.min(1024));
        slots.push(Slot::Live(LiveSlot {
            class: Ref::NIL,
            count: 1,
            body: Body::Empty,
        }));
        Memory {
            profile,
            capacity,
            slots,
            free_head: None,
        }
    }

    /// The wire-format profile this table was built with.
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// The table's configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently allocated from the table (live + free),
    /// i.e. the high-water mark of table indices used so far.
    pub fn table_len(&self) -> usize {
        self.slots.len()
    }

    /// Number of live objects (for diagnostics and tests).
    pub fn live_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Live(_)))
            .count()
    }

    fn slot(&self, r: Ref) -> Result<&LiveSlot, MemoryError> {
        let idx = r.as_index().ok_or(MemoryError::NotBoxed(r))?;
        match self.slots.get(idx) {
            Some(Slot::Live(l)) => Ok(l),
            _ => Err(MemoryError::NotLive(r)),
        }
    }

    fn slot_mut(&mut self, r: Ref) -> Result<&mut LiveSlot, MemoryError> {
        let idx = r.as_index().ok_or(MemoryError::NotBoxed(r))?;
        match self.slots.get_mut(idx) {
            Some(Slot::Live(l)) => Ok(l),
            _ => Err(MemoryError::NotLive(r)),
        }
    }

    /// True if `r` names a currently live object (always true for `nil`,
    /// always false for a tagged small integer).
    pub fn is_live(&self, r: Ref) -> bool {
        if r.is_small_int() {
            return false;
        }
        matches!(r.as_index().and_then(|i| self.slots.get(i)), Some(Slot::Live(_)))
    }

    fn alloc_index(&mut self) -> Result<usize, MemoryError> {
        if let Some(idx) = self.free_head {
            if let Slot::Free { next } = self.slots[idx] {
                self.free_head = next;
            }
            Ok(idx)
        } else if self.slots.len() < self.capacity {
            let idx = self.slots.len();
            self.slots.push(Slot::Free { next: None });
            Ok(idx)
        } else {
            Err(MemoryError::OutOfSlots)
        }
    }

    fn alloc(&mut self, body: Body) -> Result<Ref, MemoryError> {
        let n = match &body {
            Body::Pointers(v) => v.len(),
            Body::Bytes(v) => v.len(),
            Body::Empty => 0,
        };
        if n > MAX_OBJECT_SIZE {
            return Err(MemoryError::TooLarge {
                requested: n,
                max: MAX_OBJECT_SIZE,
            });
        }
        let idx = match self.alloc_index() {
            Ok(idx) => idx,
            Err(e) => {
                debug!(capacity = self.capacity, "object table exhausted");
                return Err(e);
            }
        };
        self.slots[idx] = Slot::Live(LiveSlot {
            class: Ref::NIL,
            count: 0,
            body,
        });
        Ref::boxed(idx).ok_or(MemoryError::TooLarge {
            requested: idx,
            max: self.profile.max_index(),
        })
    }

    /// Allocate a pointer object of `n` fields, all initialized to `nil`
    /// (`allocObject`).
    pub fn alloc_pointers(&mut self, n: usize) -> Result<Ref, MemoryError> {
        self.alloc(Body::Pointers(vec![Ref::NIL; n]))
    }

    /// Allocate a byte object of `n` zero bytes (`allocByte`).
    pub fn alloc_bytes(&mut self, n: usize) -> Result<Ref, MemoryError> {
        self.alloc(Body::Bytes(vec![0u8; n]))
    }

    /// Allocate a byte object pre-populated with `bytes`.
    pub fn alloc_bytes_from(&mut self, bytes: &[u8]) -> Result<Ref, MemoryError> {
        self.alloc(Body::Bytes(bytes.to_vec()))
    }

    /// Set `obj`'s class reference, incrementing the new class's count.
    /// The previous class is **not** decremented: classes are installed
    /// once, right after allocation, matching
    /// `original_source/src/memory.h`'s `setClass`.
    pub fn set_class(&mut self, obj: Ref, class: Ref) -> Result<(), MemoryError> {
        self.slot_mut(obj)?.class = class;
        self.incr(class);
        Ok(())
    }

    /// `obj`'s class reference.
    pub fn class_of(&self, obj: Ref) -> Result<Ref, MemoryError> {
        Ok(self.slot(obj)?.class)
    }

    /// `obj`'s declared size: non-negative field count for a pointer
    /// object, or the negated byte count for a byte object.
    pub fn size_of(&self, obj: Ref) -> Result<i32, MemoryError> {
        Ok(self.slot(obj)?.body.declared_size())
    }

    /// Current saturating reference count (diagnostics/tests only).
    pub fn ref_count(&self, obj: Ref) -> Result<u32, MemoryError> {
        Ok(self.slot(obj)?.count)
    }

    /// Read 1-based field `index` of a pointer object.
    pub fn fetch_pointer(&self, obj: Ref, index: usize) -> Result<Ref, MemoryError> {
        match &self.slot(obj)?.body {
            Body::Pointers(v) => {
                let i = check_index(v.len(), index)?;
                Ok(v[i])
            }
            _ => Err(MemoryError::WrongShape { expected: "pointer" }),
        }
    }

    /// Store `value` into 1-based field `index` of a pointer object,
    /// decrementing whatever was previously there and incrementing `value`.
    /// May reclaim the displaced value's slot.
    pub fn store_pointer(&mut self, obj: Ref, index: usize, value: Ref) -> Result<(), MemoryError> {
        let idx = obj.as_index().ok_or(MemoryError::NotBoxed(obj))?;
        let old = match self.slots.get(idx) {
            Some(Slot::Live(l)) => match &l.body {
                Body::Pointers(v) => {
                    let i = check_index(v.len(), index)?;
                    v[i]
                }
                _ => return Err(MemoryError::WrongShape { expected: "pointer" }),
            },
            _ => return Err(MemoryError::NotLive(obj)),
        };
        self.decr(old);
        if let Some(Slot::Live(l)) = self.slots.get_mut(idx) {
            if let Body::Pointers(v) = &mut l.body {
                v[index - 1] = value;
            }
        }
        self.incr(value);
        Ok(())
    }

    /// Read 1-based byte `index` of a byte object.
    pub fn fetch_byte(&self, obj: Ref, index: usize) -> Result<u8, MemoryError> {
        match &self.slot(obj)?.body {
            Body::Bytes(v) => {
                let i = check_index(v.len(), index)?;
                Ok(v[i])
            }
            _ => Err(MemoryError::WrongShape { expected: "byte" }),
        }
    }

    /// Store `value` into 1-based byte `index` of a byte object.
    pub fn store_byte(&mut self, obj: Ref, index: usize, value: u8) -> Result<(), MemoryError> {
        match &mut self.slot_mut(obj)?.body {
            Body::Bytes(v) => {
                let i = check_index(v.len(), index)?;
                v[i] = value;
                Ok(())
            }
            _ => Err(MemoryError::WrongShape { expected: "byte" }),
        }
    }

    /// Borrow the full field vector of a pointer object.
    pub fn pointers(&self, obj: Ref) -> Result<&[Ref], MemoryError> {
        match &self.slot(obj)?.body {
            Body::Pointers(v) => Ok(v),
            _ => Err(MemoryError::WrongShape { expected: "pointer" }),
        }
    }

    /// Borrow the full byte vector of a byte object.
    pub fn bytes(&self, obj: Ref) -> Result<&[u8], MemoryError> {
        match &self.slot(obj)?.body {
            Body::Bytes(v) => Ok(v),
            _ => Err(MemoryError::WrongShape { expected: "byte" }),
        }
    }

    /// Replace the entire byte body of an object (used by the `String`
    /// in-place mutation primitive). The new length need not match the old
    /// one.
    pub fn set_bytes(&mut self, obj: Ref, bytes: &[u8]) -> Result<(), MemoryError> {
        match &mut self.slot_mut(obj)?.body {
            Body::Bytes(v) => {
                *v = bytes.to_vec();
                Ok(())
            }
            _ => Err(MemoryError::WrongShape { expected: "byte" }),
        }
    }

    /// Increment `r`'s reference count, unless `r` is `nil`, a small
    /// integer, or already saturated
    /// (`original_source/src/memory.h`'s `incr`).
    pub fn incr(&mut self, r: Ref) {
        if r.is_nil() || r.is_small_int() {
            return;
        }
        let Some(idx) = r.as_index() else { return };
        let max = self.profile.max_count();
        if let Some(Slot::Live(l)) = self.slots.get_mut(idx) {
            if l.count < max {
                l.count += 1;
            }
        }
    }

    /// Decrement `r`'s reference count, reclaiming the slot if it reaches
    /// zero. A no-op for `nil`, small integers, and saturated slots.
    pub fn decr(&mut self, r: Ref) {
        if r.is_nil() || r.is_small_int() {
            return;
        }
        let Some(idx) = r.as_index() else { return };
        let max = self.profile.max_count();
        let reclaim = match self.slots.get_mut(idx) {
            Some(Slot::Live(l)) if l.count < max && l.count > 0 => {
                l.count -= 1;
                l.count == 0
            }
            _ => false,
        };
        if reclaim {
            self.reclaim(idx);
        }
    }

    /// Decrement every pointer field (byte objects are skipped, matching
    /// `original_source/src/memory.c`'s `sysDecr`; the class field is
    /// deliberately **not** decremented here, also matching the source),
    /// release the slot's memory, then push it onto the free list.
    fn reclaim(&mut self, index: usize) {
        let fields = match &self.slots[index] {
            Slot::Live(l) => match &l.body {
                Body::Pointers(v) => v.clone(),
                _ => Vec::new(),
            },
            Slot::Free { .. } => return,
        };
        trace!(index, fields = fields.len(), "reclaiming object");
        for f in fields {
            self.decr(f);
        }
        self.slots[index] = Slot::Free {
            next: self.free_head,
        };
        self.free_head = Some(index);
    }

    /// Recursive mark phase of the load-time recovery pass: increments
    /// every reached slot, visiting subfields only the first time a slot
    /// is reached.
    fn visit(&mut self, r: Ref) {
        if r.is_nil() || r.is_small_int() {
            return;
        }
        let Some(idx) = r.as_index() else { return };
        let max = self.profile.max_count();
        let first_visit = match self.slots.get_mut(idx) {
            Some(Slot::Live(l)) => {
                if l.count < max {
                    l.count += 1;
                }
                l.count == 1
            }
            _ => false,
        };
        if !first_visit {
            return;
        }
        let class = match &self.slots[idx] {
            Slot::Live(l) => l.class,
            Slot::Free { .. } => return,
        };
        self.visit(class);
        let fields: Vec<Ref> = match &self.slots[idx] {
            Slot::Live(l) => match &l.body {
                Body::Pointers(v) => v.clone(),
                _ => Vec::new(),
            },
            Slot::Free { .. } => Vec::new(),
        };
        for f in fields {
            self.visit(f);
        }
    }

    /// Perform the one mark-sweep recovery pass used after loading an
    /// image: mark from `roots`, free every unreached slot that has
    /// memory, then rebuild the singly linked free list in ascending
    /// index order.
    #[tracing::instrument(skip(self, roots))]
    pub fn recover(&mut self, roots: &[Ref]) {
        for r in roots {
            self.visit(*r);
        }
        let mut reclaimed = 0usize;
        for idx in 0..self.slots.len() {
            if let Slot::Live(l) = &self.slots[idx] {
                if l.count == 0 {
                    self.slots[idx] = Slot::Free { next: None };
                    reclaimed += 1;
                }
            }
        }
        let free_indices: Vec<usize> = (0..self.slots.len())
            .filter(|&i| matches!(self.slots[i], Slot::Free { .. }))
            .collect();
        for pair in free_indices.windows(2) {
            self.slots[pair[0]] = Slot::Free {
                next: Some(pair[1]),
            };
        }
        if let Some(&last) = free_indices.last() {
            self.slots[last] = Slot::Free { next: None };
        }
        self.free_head = free_indices.first().copied();
        debug!(reclaimed, live = self.live_count(), "image recovery complete");
    }

    /// Iterate every live object with a view of its shape, in ascending
    /// table-index order (used by the image writer).
    pub fn live_objects(&self) -> impl Iterator<Item = (usize, ObjectView<'_>)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| match slot {
            Slot::Live(l) if l.count > 0 => Some((
                idx,
                ObjectView {
                    class: l.class,
                    pointers: match &l.body {
                        Body::Pointers(v) => Some(v.as_slice()),
                        _ => None,
                    },
                    bytes: match &l.body {
                        Body::Bytes(v) => Some(v.as_slice()),
                        _ => None,
                    },
                },
            )),
            _ => None,
        })
    }

    /// Install a freshly read image record at `index` with reference count
    /// zero (counts are always recomputed by [`Memory::recover`] after a
    /// full load). Extends the table with free placeholders as needed.
    pub(crate) fn install_raw(
        &mut self,
        index: usize,
        class: Ref,
        pointers: Option<Vec<Ref>>,
        bytes: Option<Vec<u8>>,
    ) {
        while self.slots.len() <= index {
            self.slots.push(Slot::Free { next: None });
        }
        let body = match (pointers, bytes) {
            (Some(p), None) => Body::Pointers(p),
            (None, Some(b)) => Body::Bytes(b),
            _ => Body::Empty,
        };
        self.slots[index] = Slot::Live(LiveSlot {
            class,
            count: 0,
            body,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem() -> Memory {
        Memory::new(Profile::Small, 64)
    }

    #[test]
    fn allocate_reuses_free_list() {
        let mut m = mem();
        let a = m.alloc_pointers(2).unwrap();
        m.decr(a);
        let b = m.alloc_pointers(1).unwrap();
        assert_eq!(a, b, "freed slot should be reused before growing the table");
    }

    #[test]
    fn store_pointer_updates_refcounts() {
        let mut m = mem();
        let holder = m.alloc_pointers(1).unwrap();
        let target = m.alloc_pointers(0).unwrap();
        m.store_pointer(holder, 1, target).unwrap();
        assert_eq!(m.ref_count(target).unwrap(), 1);
        m.store_pointer(holder, 1, Ref::NIL).unwrap();
        // target is no longer referenced anywhere; it should have been
        // reclaimed (decremented to 0) and its slot recycled.
        assert!(!m.is_live(target) || m.ref_count(target).unwrap_or(0) == 0);
    }

    #[test]
    fn out_of_slots_is_reported() {
        let mut m = Memory::new(Profile::Small, 2); // 1 (nil) + 1 usable slot
        let _ = m.alloc_pointers(0).unwrap();
        assert_eq!(m.alloc_pointers(0), Err(MemoryError::OutOfSlots));
    }

    #[test]
    fn too_large_allocation_is_rejected() {
        let mut m = mem();
        assert!(matches!(
            m.alloc_pointers(MAX_OBJECT_SIZE + 1),
            Err(MemoryError::TooLarge { .. })
        ));
    }

    #[test]
    fn saturated_count_freezes_increment_and_decrement() {
        let mut m = Memory::new(Profile::Small, 8);
        let a = m.alloc_pointers(0).unwrap();
        let max = Profile::Small.max_count();
        for _ in 0..(max + 5) {
            m.incr(a);
        }
        assert_eq!(m.ref_count(a).unwrap(), max);
        for _ in 0..(max + 5) {
            m.decr(a);
        }
        // decrementing a saturated object is a no-op until reload.
        assert_eq!(m.ref_count(a).unwrap(), max);
        assert!(m.is_live(a));
    }

    #[test]
    fn nil_bypasses_refcounting_entirely() {
        let mut m = mem();
        m.incr(Ref::NIL);
        m.decr(Ref::NIL);
        m.decr(Ref::NIL);
        assert!(m.is_live(Ref::NIL));
    }

    #[test]
    fn reclaiming_a_container_releases_its_children() {
        let mut m = mem();
        let child = m.alloc_pointers(0).unwrap();
        let parent = m.alloc_pointers(1).unwrap();
        m.store_pointer(parent, 1, child).unwrap();
        assert_eq!(m.ref_count(child).unwrap(), 1);
        m.decr(parent);
        assert!(!m.is_live(parent));
        assert!(!m.is_live(child));
    }
}
