// 🔑 Keyed Index - open-addressing hash map from integer id to record handle
//
// Double hashing over a prime-sized slot array:
//   slot(k, i) = (h1(k) + i * h2(k)) mod capacity,  h2(k) in [1, capacity - 1]
// With a prime capacity every step size visits every slot, so a probe
// sequence either finds the key, an empty slot, or wraps around.
//
// The index never owns records. It maps an id to a handle (an arena slot)
// and removing an entry leaves the record itself alone.

const INITIAL_CAPACITY: usize = 101;

/// Grow once occupied + tombstoned slots exceed this share of the table.
const MAX_LOAD: f64 = 0.7;

#[derive(Debug, Clone, Copy)]
enum Slot<H> {
    Empty,
    /// Left behind by `remove` so probe chains through this slot stay intact
    Deleted,
    Occupied { key: i64, handle: H },
}

#[derive(Debug, Clone)]
pub struct KeyedIndex<H: Copy> {
    slots: Vec<Slot<H>>,
    len: usize,
    tombstones: usize,
}

impl<H: Copy> KeyedIndex<H> {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        KeyedIndex {
            slots: vec![Slot::Empty; next_prime(capacity.max(3))],
            len: 0,
            tombstones: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Associate `key` with `handle`. An existing entry for the key is replaced.
    pub fn insert(&mut self, key: i64, handle: H) {
        if (self.len + self.tombstones + 1) as f64 > self.slots.len() as f64 * MAX_LOAD {
            // Mostly tombstones: sweep them out at the same size instead of growing
            let target = if self.len * 2 < self.slots.len() {
                self.slots.len()
            } else {
                self.slots.len() * 2
            };
            self.rehash(target);
        }

        let capacity = self.slots.len();
        let mut index = hash_key(key) % capacity;
        let step = hash_step(key, capacity);
        let mut reusable: Option<usize> = None;

        for _ in 0..capacity {
            match self.slots[index] {
                Slot::Empty => break,
                Slot::Deleted => {
                    if reusable.is_none() {
                        reusable = Some(index);
                    }
                }
                Slot::Occupied { key: existing, .. } if existing == key => {
                    self.slots[index] = Slot::Occupied { key, handle };
                    return;
                }
                Slot::Occupied { .. } => {}
            }
            index = (index + step) % capacity;
        }

        let target = match reusable {
            Some(slot) => {
                self.tombstones -= 1;
                slot
            }
            None => index,
        };
        self.slots[target] = Slot::Occupied { key, handle };
        self.len += 1;
    }

    pub fn find(&self, key: i64) -> Option<H> {
        self.position(key).map(|index| match self.slots[index] {
            Slot::Occupied { handle, .. } => handle,
            // position() only returns occupied slots
            _ => unreachable!(),
        })
    }

    pub fn contains(&self, key: i64) -> bool {
        self.position(key).is_some()
    }

    /// Drop the entry for `key`, returning the handle it pointed at.
    pub fn remove(&mut self, key: i64) -> Option<H> {
        let index = self.position(key)?;
        let handle = match self.slots[index] {
            Slot::Occupied { handle, .. } => handle,
            _ => return None,
        };
        self.slots[index] = Slot::Deleted;
        self.len -= 1;
        self.tombstones += 1;
        Some(handle)
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = Slot::Empty;
        }
        self.len = 0;
        self.tombstones = 0;
    }

    fn position(&self, key: i64) -> Option<usize> {
        let capacity = self.slots.len();
        let mut index = hash_key(key) % capacity;
        let step = hash_step(key, capacity);

        for _ in 0..capacity {
            match self.slots[index] {
                Slot::Empty => return None,
                Slot::Occupied { key: existing, .. } if existing == key => return Some(index),
                _ => {}
            }
            index = (index + step) % capacity;
        }
        None
    }

    fn rehash(&mut self, min_capacity: usize) {
        let old = std::mem::replace(&mut self.slots, vec![Slot::Empty; next_prime(min_capacity)]);
        self.len = 0;
        self.tombstones = 0;

        for slot in old {
            if let Slot::Occupied { key, handle } = slot {
                self.insert(key, handle);
            }
        }
    }
}

impl<H: Copy> Default for KeyedIndex<H> {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_key(key: i64) -> usize {
    // Fibonacci hashing spreads consecutive ids across the table
    (key as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_right(17) as usize
}

fn hash_step(key: i64, capacity: usize) -> usize {
    let h = (key as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F) >> 7;
    1 + (h as usize % (capacity - 1))
}

fn next_prime(n: usize) -> usize {
    let mut candidate = n.max(2);
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut divisor = 3;
    while divisor * divisor <= n {
        if n % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    true
}

// ============================================================================
// TESTS
// ============================================================================
