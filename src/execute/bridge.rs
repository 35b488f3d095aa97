//! Table of active execute frames and calls waiting for a busy callee.
//!
//! Frames are keyed by callee: a StreamSheet is driven by at most one
//! caller at a time. Callers reach each other only through this table,
//! never through direct references.

use std::collections::VecDeque;

use crate::execute::{ExecuteCall, ExecuteFrame};

/// An `execute()` waiting for its target to become free
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub caller: String,
    pub cell: usize,
    pub call: ExecuteCall,
}

#[derive(Debug, Default)]
pub struct ExecuteBridge {
    frames: Vec<ExecuteFrame>,
    queued: VecDeque<PendingCall>,
}

impl ExecuteBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[ExecuteFrame] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.queued.is_empty()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Frame driving `callee`
    pub fn frame_for(&self, callee: &str) -> Option<&ExecuteFrame> {
        self.frames.iter().find(|f| f.callee == callee)
    }

    pub fn frame_for_mut(&mut self, callee: &str) -> Option<&mut ExecuteFrame> {
        self.frames.iter_mut().find(|f| f.callee == callee)
    }

    /// Callee currently driven by some caller
    pub fn is_busy(&self, callee: &str) -> bool {
        self.frame_for(callee).is_some()
    }

    /// Callers above `sheet` in its execute chain, nearest first
    pub fn ancestors(&self, sheet: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = sheet;
        while let Some(frame) = self.frame_for(current) {
            if chain.iter().any(|s| s == &frame.caller) || chain.len() > self.frames.len() {
                break;
            }
            chain.push(frame.caller.clone());
            current = &frame.caller;
        }
        chain
    }

    /// Calling `target` from `caller` would close a cycle
    pub fn would_cycle(&self, caller: &str, target: &str) -> bool {
        caller == target || self.ancestors(caller).iter().any(|s| s == target)
    }

    /// Depth a frame started by `caller` would get
    pub fn depth_for(&self, caller: &str) -> usize {
        self.frame_for(caller).map_or(1, |f| f.depth + 1)
    }

    pub fn push(&mut self, frame: ExecuteFrame) {
        self.frames.push(frame);
    }

    pub fn remove(&mut self, callee: &str) -> Option<ExecuteFrame> {
        let pos = self.frames.iter().position(|f| f.callee == callee)?;
        Some(self.frames.remove(pos))
    }

    pub fn enqueue(&mut self, pending: PendingCall) {
        self.queued.push_back(pending);
    }

    /// Oldest queued call for `callee`
    pub fn take_queued(&mut self, callee: &str) -> Option<PendingCall> {
        let pos = self.queued.iter().position(|p| p.call.target == callee)?;
        self.queued.remove(pos)
    }

    /// Queued calls made by or aimed at `sheet`
    pub fn take_queued_involving(&mut self, sheet: &str) -> Vec<PendingCall> {
        let (taken, kept): (Vec<_>, Vec<_>) = self
            .queued
            .drain(..)
            .partition(|p| p.caller == sheet || p.call.target == sheet);
        self.queued = kept.into();
        taken
    }

    /// Drop every frame and queued call
    pub fn clear(&mut self) -> (Vec<ExecuteFrame>, Vec<PendingCall>) {
        (self.frames.drain(..).collect(), self.queued.drain(..).collect())
    }

    /// Callees whose next step is due on `cycle`
    pub fn due_on_cycle(&self, cycle: u64) -> Vec<String> {
        self.frames
            .iter()
            .filter(|f| f.is_due_on_cycle(cycle))
            .map(|f| f.callee.clone())
            .collect()
    }

    /// Callees whose timed step is due at `now`
    pub fn due_at(&self, now: u64) -> Vec<String> {
        self.frames
            .iter()
            .filter(|f| f.is_due_at(now))
            .map(|f| f.callee.clone())
            .collect()
    }
}
