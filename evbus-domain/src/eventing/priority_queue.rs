use super::worker::lock;
use crate::domain_event::{DomainEvent, EventPriority};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// 各优先级缓冲区的当前长度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub critical: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.critical + self.high + self.normal + self.low
    }

    pub fn get(&self, priority: EventPriority) -> usize {
        match priority {
            EventPriority::Critical => self.critical,
            EventPriority::High => self.high,
            EventPriority::Normal => self.normal,
            EventPriority::Low => self.low,
        }
    }

    pub(crate) fn bump(&mut self, priority: EventPriority) {
        match priority {
            EventPriority::Critical => self.critical += 1,
            EventPriority::High => self.high += 1,
            EventPriority::Normal => self.normal += 1,
            EventPriority::Low => self.low += 1,
        }
    }
}

#[derive(Debug, Default)]
struct Tiers {
    queues: [VecDeque<DomainEvent>; 4],
    closed: bool,
}

/// 按优先级分层的 FIFO 缓冲区；关闭后拒绝入队
#[derive(Debug, Default)]
pub(crate) struct PriorityQueues {
    tiers: Mutex<Tiers>,
}

impl PriorityQueues {
    /// 入队；已关闭时原样退回事件
    pub(crate) fn push(&self, event: DomainEvent) -> Result<(), DomainEvent> {
        let mut tiers = lock(&self.tiers);
        if tiers.closed {
            return Err(event);
        }
        let idx = event.priority().index();
        tiers.queues[idx].push_back(event);
        Ok(())
    }

    /// 关闭入队；已缓冲的事件仍可取出
    pub(crate) fn close(&self) {
        lock(&self.tiers).closed = true;
    }

    pub(crate) fn pop(&self, priority: EventPriority) -> Option<DomainEvent> {
        lock(&self.tiers).queues[priority.index()].pop_front()
    }

    pub(crate) fn stats(&self) -> QueueStats {
        let tiers = lock(&self.tiers);
        let mut stats = QueueStats::default();
        for priority in EventPriority::ALL {
            let len = tiers.queues[priority.index()].len();
            match priority {
                EventPriority::Critical => stats.critical = len,
                EventPriority::High => stats.high = len,
                EventPriority::Normal => stats.normal = len,
                EventPriority::Low => stats.low = len,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, priority: EventPriority) -> DomainEvent {
        DomainEvent::builder()
            .id(id)
            .event_type("A")
            .priority(priority)
            .build()
    }

    #[test]
    fn tiers_are_fifo_and_independent() {
        let queues = PriorityQueues::default();
        queues.push(event("n1", EventPriority::Normal)).unwrap();
        queues.push(event("l1", EventPriority::Low)).unwrap();
        queues.push(event("n2", EventPriority::Normal)).unwrap();

        let stats = queues.stats();
        assert_eq!((stats.normal, stats.low, stats.total()), (2, 1, 3));

        assert_eq!(queues.pop(EventPriority::Normal).unwrap().id(), "n1");
        assert_eq!(queues.pop(EventPriority::Normal).unwrap().id(), "n2");
        assert!(queues.pop(EventPriority::Normal).is_none());
        assert_eq!(queues.pop(EventPriority::Low).unwrap().id(), "l1");
    }

    #[test]
    fn closed_queues_refuse_new_events_but_keep_buffered_ones() {
        let queues = PriorityQueues::default();
        queues.push(event("h1", EventPriority::High)).unwrap();
        queues.close();

        let rejected = queues.push(event("h2", EventPriority::High)).unwrap_err();
        assert_eq!(rejected.id(), "h2");
        assert_eq!(queues.pop(EventPriority::High).unwrap().id(), "h1");
        assert!(queues.pop(EventPriority::High).is_none());
    }
}
