//! Values collected across nodes or across whole conversations.
//!
//! Accumulators are handed to the nodes which fill and drain them when a conversation is
//! built. Cloning an accumulator yields another handle to the same storage.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

pub struct Accumulator<T> {
    items: Rc<RefCell<VecDeque<T>>>,
}

impl<T> Clone for Accumulator<T> {
    fn clone(&self) -> Self {
        Self {
            items: Rc::clone(&self.items),
        }
    }
}

impl<T> Default for Accumulator<T> {
    fn default() -> Self {
        Self {
            items: Rc::new(RefCell::new(VecDeque::new())),
        }
    }
}

impl<T> fmt::Debug for Accumulator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Accumulator({} items)", self.len())
    }
}

impl<T> Accumulator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.items.borrow_mut().push_back(item);
    }

    /// Removes the oldest item.
    pub fn pop(&self) -> Option<T> {
        self.items.borrow_mut().pop_front()
    }

    pub fn drain(&self) -> Vec<T> {
        self.items.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl<T: Clone> Accumulator<T> {
    pub fn snapshot(&self) -> Vec<T> {
        self.items.borrow().iter().cloned().collect()
    }
}
