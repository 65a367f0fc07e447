use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::{CardRef, MemoryEvent, RevealedFact};

/// 一次失败尝试中同时翻开的两张牌。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenedPair {
    pub first: CardRef,
    pub second: CardRef,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryStats {
    pub cards_known: usize,
    pub pairs_remembered: usize,
    /// 不限容量时为 `None`。
    pub capacity: Option<usize>,
}

/// 电脑对手对已翻开牌面的有限记忆。
///
/// 牌面信息按卡牌索引；翻开的牌对按先后顺序排队，超过 `capacity` 对时
/// 遗忘最早的一对。已配对的牌立即移除。
#[derive(Debug, Clone)]
pub struct AiMemory {
    capacity: Option<usize>,
    pairs: VecDeque<OpenedPair>,
    known: HashMap<CardRef, RevealedFact>,
}

impl AiMemory {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            pairs: VecDeque::new(),
            known: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn observe(&mut self, event: &MemoryEvent) {
        match event {
            MemoryEvent::Revealed { fact } => self.register_revealed(fact.clone()),
            MemoryEvent::Matched { first, second } => {
                self.forget(first);
                self.forget(second);
            }
            MemoryEvent::PairOpened { first, second } => {
                self.register_opened_pair(*first, *second);
            }
        }
    }

    pub fn register_revealed(&mut self, fact: RevealedFact) {
        self.known.insert(fact.card, fact);
    }

    pub fn forget(&mut self, card: &CardRef) {
        self.known.remove(card);
    }

    /// 记录一对失败的牌，超出容量时淘汰最早的牌对，返回被淘汰的牌。
    pub fn register_opened_pair(&mut self, first: CardRef, second: CardRef) -> Vec<CardRef> {
        self.pairs.push_back(OpenedPair { first, second });

        let mut evicted = Vec::new();
        while self.over_capacity() {
            let Some(oldest) = self.pairs.pop_front() else {
                break;
            };
            self.forget(&oldest.first);
            self.forget(&oldest.second);
            evicted.push(oldest.first);
            evicted.push(oldest.second);
        }
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "ai memory evicted oldest pairs");
        }
        evicted
    }

    fn over_capacity(&self) -> bool {
        match self.capacity {
            Some(capacity) => self.pairs.len() > capacity,
            None => false,
        }
    }

    pub fn get(&self, card: &CardRef) -> Option<&RevealedFact> {
        self.known.get(card)
    }

    pub fn contains(&self, card: &CardRef) -> bool {
        self.known.contains_key(card)
    }

    pub fn facts(&self) -> impl Iterator<Item = &RevealedFact> {
        self.known.values()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
        self.known.clear();
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            cards_known: self.known.len(),
            pairs_remembered: self.pairs.len(),
            capacity: self.capacity,
        }
    }
}
