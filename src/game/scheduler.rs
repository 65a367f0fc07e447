use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::state::PlayerId;

pub type TaskId = u64;

/// 由宿主时钟驱动的延迟动作。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ScheduledAction {
    AiPick { player_id: PlayerId },
    SettleMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub due_ms: u64,
    pub action: ScheduledAction,
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // 按 (due, id) 组成小顶堆：截止时间早者优先，相同时先进先出。
        other
            .due_ms
            .cmp(&self.due_ms)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 单线程定时队列，不会自行触发，由持有者在推进时取出到期任务。
#[derive(Debug, Default, Clone)]
pub struct Scheduler {
    queue: BinaryHeap<ScheduledTask>,
    next_id: TaskId,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now_ms: u64, delay_ms: u64, action: ScheduledAction) -> TaskId {
        self.next_id += 1;
        let task = ScheduledTask {
            id: self.next_id,
            due_ms: now_ms.saturating_add(delay_ms),
            action,
        };
        debug!(id = task.id, due_ms = task.due_ms, action = ?task.action, "task scheduled");
        let id = task.id;
        self.queue.push(task);
        id
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|task| task.id != id);
        let cancelled = self.queue.len() != before;
        if cancelled {
            debug!(id, "task cancelled");
        }
        cancelled
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.queue.peek().map(|task| task.due_ms)
    }

    pub fn pop_due(&mut self, now_ms: u64) -> Option<ScheduledTask> {
        match self.queue.peek() {
            Some(task) if task.due_ms <= now_ms => self.queue.pop(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
