//! Ordered backlog of pending experiments.
//!
//! Insertion order is dispatch order. Reordering follows the drag gesture:
//! the moved element is removed from its old position and inserted at the new
//! one, so every other element keeps its relative order.

use crate::error::IndexError;
use crate::job::JobDescriptor;
use std::collections::VecDeque;

/// Pending job descriptors, head first.
#[derive(Debug, Clone, Default)]
pub struct QueueStore {
    items: VecDeque<JobDescriptor>,
}

impl QueueStore {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `job` at the tail.
    pub fn append(&mut self, job: JobDescriptor) {
        self.items.push_back(job);
    }

    /// Put `job` back at the head.
    pub fn push_front(&mut self, job: JobDescriptor) {
        self.items.push_front(job);
    }

    /// Remove and return the job at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<JobDescriptor, IndexError> {
        let len = self.items.len();
        self.items.remove(index).ok_or(IndexError { index, len })
    }

    /// Move the job at `from` so that it ends up at `to`.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<(), IndexError> {
        let len = self.items.len();
        if to >= len {
            return Err(IndexError { index: to, len });
        }
        let job = self.items.remove(from).ok_or(IndexError { index: from, len })?;
        self.items.insert(to, job);
        Ok(())
    }

    /// Remove and return the head, or `None` when there is nothing to dispatch.
    pub fn pop_front(&mut self) -> Option<JobDescriptor> {
        self.items.pop_front()
    }

    /// Job at `index`.
    pub fn get(&self, index: usize) -> Option<&JobDescriptor> {
        self.items.get(index)
    }

    /// Number of pending jobs.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &JobDescriptor> {
        self.items.iter()
    }

    /// Copy of the pending jobs, head first.
    pub fn to_vec(&self) -> Vec<JobDescriptor> {
        self.items.iter().cloned().collect()
    }
}
