// Copyright (c) 2019-present Dmitry Stepanov and Fyrox Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! A generational arena - a contiguous growable array that allows removing entries
//! from the middle without shifting, and without invalidating other handles.
//!
//! Every engine-owned object (properties, nodes, links) lives in a [`Pool`] and is
//! referred to only through a [`Handle`]. A handle stores a generation number
//! alongside its index so that a stale handle pointing at a freed-and-reused slot
//! can be detected instead of silently aliasing a different object.

use crate::visitor::{Visit, VisitResult, Visitor};
use std::{
    fmt::{Debug, Formatter},
    hash::{Hash, Hasher},
    marker::PhantomData,
    ops::{Index, IndexMut},
};

const INVALID_GENERATION: u32 = 0;

/// A non-owning reference to an object stored in a [`Pool`].
pub struct Handle<T> {
    index: u32,
    generation: u32,
    type_marker: PhantomData<T>,
}

impl<T> Handle<T> {
    /// A handle that never points to a valid object.
    pub const NONE: Handle<T> = Handle {
        index: 0,
        generation: INVALID_GENERATION,
        type_marker: PhantomData,
    };

    /// Creates a new handle from its raw parts. Mostly useful for deserialization.
    pub fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            type_marker: PhantomData,
        }
    }

    /// Index of the object inside its owning pool.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation of the object this handle was created for.
    pub fn generation(self) -> u32 {
        self.generation
    }

    /// A handle is valid (might point to a live object) if its generation is non-zero.
    /// It does *not* guarantee the object is still alive; use [`Pool::is_valid_handle`]
    /// for that.
    pub fn is_some(self) -> bool {
        self.generation != INVALID_GENERATION
    }

    /// Inverse of [`Self::is_some`].
    pub fn is_none(self) -> bool {
        !self.is_some()
    }

    /// Reinterprets this handle as a handle to a differently-typed object at the same
    /// index/generation. Used sparingly, e.g. when erasing the node-kind type parameter.
    pub fn transmute<U>(self) -> Handle<U> {
        Handle {
            index: self.index,
            generation: self.generation,
            type_marker: PhantomData,
        }
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::NONE
    }
}

impl<T> Copy for Handle<T> {}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Debug for Handle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.index, self.generation)
    }
}

impl<T> Visit for Handle<T> {
    fn visit(&mut self, name: &str, visitor: &mut Visitor) -> VisitResult {
        let mut region = visitor.enter_region(name)?;
        self.index.visit("Index", &mut region)?;
        self.generation.visit("Generation", &mut region)?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct PoolRecord<T> {
    generation: u32,
    payload: Option<T>,
}

impl<T> Default for PoolRecord<T> {
    fn default() -> Self {
        Self {
            generation: 1,
            payload: None,
        }
    }
}

/// A generational arena. Objects are never moved once spawned; removing an entry
/// leaves a vacant slot with a bumped generation that is reused by later spawns.
#[derive(Clone, Debug)]
pub struct Pool<T> {
    records: Vec<PoolRecord<T>>,
    free_stack: Vec<u32>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            free_stack: Vec::new(),
        }
    }

    /// Puts `payload` into the pool and returns a handle to it.
    pub fn spawn(&mut self, payload: T) -> Handle<T> {
        if let Some(index) = self.free_stack.pop() {
            let record = &mut self.records[index as usize];
            debug_assert!(record.payload.is_none());
            record.payload = Some(payload);
            Handle::new(index, record.generation)
        } else {
            let index = self.records.len() as u32;
            self.records.push(PoolRecord {
                generation: 1,
                payload: Some(payload),
            });
            Handle::new(index, 1)
        }
    }

    /// Removes the object a handle points to, returning it. Panics if the handle is stale.
    pub fn free(&mut self, handle: Handle<T>) -> T {
        self.try_free(handle)
            .expect("attempt to free an object with an invalid handle")
    }

    /// Removes the object a handle points to, returning it, or `None` if the handle is stale.
    pub fn try_free(&mut self, handle: Handle<T>) -> Option<T> {
        let record = self.records.get_mut(handle.index as usize)?;
        if record.generation != handle.generation {
            return None;
        }
        let payload = record.payload.take()?;
        record.generation = record.generation.wrapping_add(1).max(1);
        self.free_stack.push(handle.index);
        Some(payload)
    }

    /// Borrows the object a handle points to. Panics if the handle is stale.
    pub fn borrow(&self, handle: Handle<T>) -> &T {
        self.try_borrow(handle)
            .expect("attempt to borrow an object with an invalid handle")
    }

    /// Mutably borrows the object a handle points to. Panics if the handle is stale.
    pub fn borrow_mut(&mut self, handle: Handle<T>) -> &mut T {
        self.try_borrow_mut(handle)
            .expect("attempt to borrow an object with an invalid handle")
    }

    /// Borrows the object a handle points to, or `None` if the handle is stale.
    pub fn try_borrow(&self, handle: Handle<T>) -> Option<&T> {
        let record = self.records.get(handle.index as usize)?;
        if record.generation != handle.generation {
            return None;
        }
        record.payload.as_ref()
    }

    /// Mutably borrows the object a handle points to, or `None` if the handle is stale.
    pub fn try_borrow_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let record = self.records.get_mut(handle.index as usize)?;
        if record.generation != handle.generation {
            return None;
        }
        record.payload.as_mut()
    }

    /// True if `handle` currently points to a live object.
    pub fn is_valid_handle(&self, handle: Handle<T>) -> bool {
        self.records
            .get(handle.index as usize)
            .is_some_and(|r| r.generation == handle.generation && r.payload.is_some())
    }

    /// Builds a handle for the object currently stored at raw index `n`, if any.
    pub fn handle_from_index(&self, n: u32) -> Handle<T> {
        match self.records.get(n as usize) {
            Some(record) if record.payload.is_some() => Handle::new(n, record.generation),
            _ => Handle::NONE,
        }
    }

    /// Number of live objects in the pool.
    pub fn alive_count(&self) -> usize {
        self.records.iter().filter(|r| r.payload.is_some()).count()
    }

    /// Iterator over live objects, in pool (index) order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter().filter_map(|r| r.payload.as_ref())
    }

    /// Iterator over `(handle, &object)` pairs, in pool (index) order.
    pub fn pair_iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.records.iter().enumerate().filter_map(|(i, r)| {
            r.payload
                .as_ref()
                .map(|p| (Handle::new(i as u32, r.generation), p))
        })
    }

    /// Mutable iterator over live objects, in pool (index) order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.records.iter_mut().filter_map(|r| r.payload.as_mut())
    }

    /// Removes every object from the pool, keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.records.clear();
        self.free_stack.clear();
    }
}

impl<T> Index<Handle<T>> for Pool<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &Self::Output {
        self.borrow(handle)
    }
}

impl<T> IndexMut<Handle<T>> for Pool<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut Self::Output {
        self.borrow_mut(handle)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn spawn_free_reuses_slot_with_bumped_generation() {
        let mut pool = Pool::<String>::new();
        let a = pool.spawn("a".to_string());
        assert_eq!(pool.borrow(a), "a");
        let freed = pool.free(a);
        assert_eq!(freed, "a");
        assert!(!pool.is_valid_handle(a));

        let b = pool.spawn("b".to_string());
        assert_eq!(b.index(), a.index());
        assert_ne!(b.generation(), a.generation());
        assert!(pool.try_borrow(a).is_none());
        assert_eq!(pool.borrow(b), "b");
    }

    #[test]
    fn stale_handle_does_not_alias_new_object() {
        let mut pool = Pool::<i32>::new();
        let h1 = pool.spawn(1);
        pool.free(h1);
        let h2 = pool.spawn(2);
        assert!(pool.try_borrow(h1).is_none());
        assert_eq!(*pool.borrow(h2), 2);
    }

    #[test]
    fn none_handle_is_never_valid() {
        let pool = Pool::<i32>::new();
        assert!(!pool.is_valid_handle(Handle::NONE));
    }
}
