//! Интрузивный двусвязный список поверх арены.
//!
//! `Registry<T>` хранит узлы в `Vec`-арене, связывая их индексами. Каждый
//! узел адресуется стабильным дескриптором [`NodeId`], поэтому удаление
//! выполняется за O(1) без поиска. Освободившиеся слоты переиспользуются
//! через список свободных ячеек.
//!
//! Штамп дескриптора берётся из глобального счётчика, так что `NodeId`
//! никогда не совпадёт с узлом, созданным позже в том же слоте или в другом
//! реестре. Это позволяет безопасно проверять «жив ли ещё узел» после того,
//! как реестр был пересоздан.

use std::sync::atomic::{AtomicU64, Ordering};

/// Глобальный источник штампов для [`NodeId`].
static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

/// Стабильный дескриптор узла реестра.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    slot: u32,
    stamp: u64,
}

struct Node<T> {
    value: T,
    stamp: u64,
    prev: Option<u32>,
    next: Option<u32>,
}

enum Slot<T> {
    Occupied(Node<T>),
    Vacant { next_free: Option<u32> },
}

/// Упорядоченная коллекция с O(1) вставкой в голову и O(1) удалением по
/// дескриптору. Обход идёт от головы к хвосту, то есть от самого нового узла
/// к самому старому.
pub struct Registry<T> {
    slots: Vec<Slot<T>>,
    free: Option<u32>,
    head: Option<u32>,
    len: usize,
}

/// Итератор по парам `(NodeId, &T)` от головы к хвосту.
pub struct Iter<'a, T> {
    registry: &'a Registry<T>,
    cursor: Option<u32>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: None,
            head: None,
            len: 0,
        }
    }

    /// Вставляет значение в голову списка и возвращает его дескриптор.
    pub fn prepend(
        &mut self,
        value: T,
    ) -> NodeId {
        let stamp = NEXT_STAMP.fetch_add(1, Ordering::Relaxed);
        let node = Node {
            value,
            stamp,
            prev: None,
            next: self.head,
        };

        let slot = match self.free {
            Some(idx) => {
                if let Slot::Vacant { next_free } = self.slots[idx as usize] {
                    self.free = next_free;
                }
                self.slots[idx as usize] = Slot::Occupied(node);
                idx
            }
            None => {
                self.slots.push(Slot::Occupied(node));
                (self.slots.len() - 1) as u32
            }
        };

        if let Some(old_head) = self.head {
            if let Some(Slot::Occupied(n)) = self.slots.get_mut(old_head as usize) {
                n.prev = Some(slot);
            }
        }
        self.head = Some(slot);
        self.len += 1;

        NodeId { slot, stamp }
    }

    /// Отсоединяет узел и возвращает его значение.
    ///
    /// Для уже удалённого или чужого дескриптора возвращает `None`.
    pub fn remove(
        &mut self,
        id: NodeId,
    ) -> Option<T> {
        if !self.contains(id) {
            return None;
        }

        let idx = id.slot as usize;
        let vacant = Slot::Vacant {
            next_free: self.free,
        };
        let Slot::Occupied(node) = std::mem::replace(&mut self.slots[idx], vacant) else {
            return None;
        };
        self.free = Some(id.slot);

        match node.prev {
            Some(prev) => self.set_next(prev, node.next),
            None => self.head = node.next,
        }
        if let Some(next) = node.next {
            self.set_prev(next, node.prev);
        }
        self.len -= 1;

        Some(node.value)
    }

    /// Проверяет, что узел всё ещё связан в этом реестре.
    pub fn contains(
        &self,
        id: NodeId,
    ) -> bool {
        self.node(id).is_some()
    }

    pub fn get(
        &self,
        id: NodeId,
    ) -> Option<&T> {
        self.node(id).map(|n| &n.value)
    }

    pub fn get_mut(
        &mut self,
        id: NodeId,
    ) -> Option<&mut T> {
        match self.slots.get_mut(id.slot as usize) {
            Some(Slot::Occupied(n)) if n.stamp == id.stamp => Some(&mut n.value),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Дескриптор головного (самого нового) узла.
    pub fn head(&self) -> Option<NodeId> {
        self.head.and_then(|idx| self.id_at(idx))
    }

    /// Дескриптор узла, следующего за `id`.
    ///
    /// `None`, если `id` последний или уже не связан.
    pub fn next_of(
        &self,
        id: NodeId,
    ) -> Option<NodeId> {
        self.node(id)?.next.and_then(|idx| self.id_at(idx))
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            registry: self,
            cursor: self.head,
        }
    }

    /// Извлекает все значения в порядке обхода, оставляя реестр пустым.
    pub fn drain(&mut self) -> std::vec::IntoIter<T> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        let mut slots = std::mem::take(&mut self.slots);

        while let Some(idx) = cursor {
            let slot = std::mem::replace(&mut slots[idx as usize], Slot::Vacant { next_free: None });
            match slot {
                Slot::Occupied(node) => {
                    cursor = node.next;
                    out.push(node.value);
                }
                Slot::Vacant { .. } => break,
            }
        }

        self.free = None;
        self.head = None;
        self.len = 0;
        out.into_iter()
    }

    fn node(
        &self,
        id: NodeId,
    ) -> Option<&Node<T>> {
        match self.slots.get(id.slot as usize) {
            Some(Slot::Occupied(n)) if n.stamp == id.stamp => Some(n),
            _ => None,
        }
    }

    fn id_at(
        &self,
        idx: u32,
    ) -> Option<NodeId> {
        match self.slots.get(idx as usize) {
            Some(Slot::Occupied(n)) => Some(NodeId {
                slot: idx,
                stamp: n.stamp,
            }),
            _ => None,
        }
    }

    fn set_next(
        &mut self,
        idx: u32,
        next: Option<u32>,
    ) {
        if let Some(Slot::Occupied(n)) = self.slots.get_mut(idx as usize) {
            n.next = next;
        }
    }

    fn set_prev(
        &mut self,
        idx: u32,
        prev: Option<u32>,
    ) {
        if let Some(Slot::Occupied(n)) = self.slots.get_mut(idx as usize) {
            n.prev = prev;
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Registry<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_list().entries(self.iter().map(|(_, v)| v)).finish()
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        match self.registry.slots.get(idx as usize) {
            Some(Slot::Occupied(n)) => {
                self.cursor = n.next;
                Some((
                    NodeId {
                        slot: idx,
                        stamp: n.stamp,
                    },
                    &n.value,
                ))
            }
            _ => {
                self.cursor = None;
                None
            }
        }
    }
}

impl<'a, T> IntoIterator for &'a Registry<T> {
    type Item = (NodeId, &'a T);
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
