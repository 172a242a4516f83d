#![forbid(unsafe_code)]

//! Ordered registry of every message element seen on the page.
//!
//! # Invariants
//!
//! - Ids are unique within the cache.
//! - `ordinal` strictly increases along the cache and matches document
//!   order as of the last [`MessageCache::rebuild`].
//!
//! # Identity
//!
//! A record's id is, in order of preference: an id this engine synthesized
//! earlier (persisted in `fallback_id_attribute`), the host's own
//! `id_attribute`, or a freshly synthesized `fallback-<ms>-<seq>` that is
//! written back so the next scan finds it again. Synthesizing is an identity
//! gap, logged and never fatal.

use core::time::Duration;
use std::collections::HashMap;

use crate::config::{PLACEHOLDER_ATTRIBUTE, VirtualizerConfig};
use crate::host::HostDom;
use crate::{debug, warn};

/// One message known to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord<N> {
    /// Stable identifier.
    pub id: String,
    /// Position in discovery order.
    pub ordinal: u64,
    /// The host's element carrying the message content.
    pub element: N,
    pub(crate) placeholder: Option<N>,
    pub(crate) height: f64,
}

impl<N> MessageRecord<N> {
    fn new(id: String, ordinal: u64, element: N) -> Self {
        Self {
            id,
            ordinal,
            element,
            placeholder: None,
            height: 0.0,
        }
    }

    /// Stand-in node, once one has been created.
    #[must_use]
    pub fn placeholder(&self) -> Option<&N> {
        self.placeholder.as_ref()
    }

    /// Height last measured before the element was detached.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.height
    }
}

/// How a record is currently represented in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// The real element is in the document.
    Attached,
    /// The placeholder stands in for it.
    Placeholder,
    /// Neither is in the document (the host removed it).
    Missing,
}

impl<N> MessageRecord<N> {
    #[must_use]
    pub fn presence<D: HostDom<Node = N>>(&self, dom: &D) -> Presence {
        if dom.is_connected(&self.element) {
            Presence::Attached
        } else if self.placeholder.as_ref().is_some_and(|p| dom.is_connected(p)) {
            Presence::Placeholder
        } else {
            Presence::Missing
        }
    }

    /// Whichever node currently occupies this record's slot.
    #[must_use]
    pub fn current_node<D: HostDom<Node = N>>(&self, dom: &D) -> Option<&N> {
        match self.presence(dom) {
            Presence::Attached => Some(&self.element),
            Presence::Placeholder => self.placeholder.as_ref(),
            Presence::Missing => None,
        }
    }
}

/// Ordered, deduplicated message registry.
#[derive(Debug, Clone)]
pub struct MessageCache<N> {
    records: Vec<MessageRecord<N>>,
    index: HashMap<String, usize>,
    next_ordinal: u64,
    fallback_seq: u64,
}

impl<N> Default for MessageCache<N> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            next_ordinal: 0,
            fallback_seq: 0,
        }
    }
}

impl<N: Clone + PartialEq> MessageCache<N> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&MessageRecord<N>> {
        self.records.get(idx)
    }

    #[must_use]
    pub fn records(&self) -> &[MessageRecord<N>] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut [MessageRecord<N>] {
        &mut self.records
    }

    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    #[must_use]
    pub fn contains_id(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Index of the record whose element is `element`.
    #[must_use]
    pub fn position_of_element(&self, element: &N) -> Option<usize> {
        self.records.iter().position(|r| r.element == *element)
    }

    #[must_use]
    pub fn last(&self) -> Option<&MessageRecord<N>> {
        self.records.last()
    }

    /// Rescan `container` and replace the whole cache.
    ///
    /// Placeholders this engine inserted are part of the scan, so records that
    /// are currently detached keep their slot. Returns the new size.
    pub fn rebuild<D: HostDom<Node = N>>(
        &mut self,
        dom: &D,
        container: &N,
        config: &VirtualizerConfig,
        now: Duration,
    ) -> usize {
        let nodes = dom.query_all(container, &config.message_or_placeholder_selector());
        let mut previous: HashMap<String, MessageRecord<N>> = self
            .records
            .drain(..)
            .map(|record| (record.id.clone(), record))
            .collect();
        self.index.clear();
        let mut orphans = 0usize;

        for node in nodes {
            if let Some(owner) = dom.attribute(&node, PLACEHOLDER_ATTRIBUTE) {
                match previous.remove(&owner) {
                    Some(mut record) if !self.index.contains_key(&owner) => {
                        record.placeholder = Some(node);
                        self.push(record);
                    }
                    _ => {
                        dom.remove(&node);
                        orphans += 1;
                    }
                }
                continue;
            }

            let id = self.resolve_id(dom, &node, config, now);
            let record = match previous.remove(&id) {
                Some(record) if record.element == node => record,
                _ => MessageRecord::new(id, 0, node),
            };
            self.push(record);
        }

        for (ordinal, record) in self.records.iter_mut().enumerate() {
            record.ordinal = ordinal as u64;
        }
        self.next_ordinal = self.records.len() as u64;

        debug!(
            target: "longchat::cache",
            size = self.records.len(),
            dropped = previous.len(),
            orphans,
            "message cache rebuilt"
        );
        self.records.len()
    }

    /// Fast path for one newly observed trailing element.
    ///
    /// Returns `false` without touching anything when the element's id is
    /// already cached.
    pub fn append<D: HostDom<Node = N>>(
        &mut self,
        dom: &D,
        element: &N,
        config: &VirtualizerConfig,
        now: Duration,
    ) -> bool {
        if let Some(id) = Self::existing_id(dom, element, config)
            && self.index.contains_key(&id)
        {
            debug!(target: "longchat::cache", %id, "already cached; append ignored");
            return false;
        }
        let id = self.resolve_id(dom, element, config, now);
        let ordinal = self.next_ordinal;
        self.push(MessageRecord::new(id, ordinal, element.clone()));
        true
    }

    fn push(&mut self, mut record: MessageRecord<N>) {
        if record.ordinal < self.next_ordinal {
            record.ordinal = self.next_ordinal;
        }
        self.next_ordinal = record.ordinal + 1;
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
    }

    /// Index of the record `element` belongs to, by id or by identity.
    pub(crate) fn cached_position<D: HostDom<Node = N>>(
        &self,
        dom: &D,
        element: &N,
        config: &VirtualizerConfig,
    ) -> Option<usize> {
        Self::existing_id(dom, element, config)
            .and_then(|id| self.position(&id))
            .filter(|idx| self.records[*idx].element == *element)
            .or_else(|| self.position_of_element(element))
    }

    pub(crate) fn existing_id<D: HostDom<Node = N>>(
        dom: &D,
        element: &N,
        config: &VirtualizerConfig,
    ) -> Option<String> {
        [&config.fallback_id_attribute, &config.id_attribute]
            .into_iter()
            .filter_map(|attr| dom.attribute(element, attr))
            .find(|id| !id.is_empty())
    }

    fn resolve_id<D: HostDom<Node = N>>(
        &mut self,
        dom: &D,
        element: &N,
        config: &VirtualizerConfig,
        now: Duration,
    ) -> String {
        let natural = [&config.fallback_id_attribute, &config.id_attribute]
            .into_iter()
            .filter_map(|attr| dom.attribute(element, attr))
            .filter(|id| !id.is_empty())
            .collect::<Vec<_>>();
        if let Some(id) = natural.iter().find(|id| !self.index.contains_key(*id)) {
            return id.clone();
        }

        let id = loop {
            self.fallback_seq += 1;
            let candidate = format!("fallback-{}-{:x}", now.as_millis(), self.fallback_seq);
            if !self.index.contains_key(&candidate) {
                break candidate;
            }
        };
        dom.set_attribute(element, &config.fallback_id_attribute, &id);
        match natural.first() {
            Some(duplicate) => warn!(
                target: "longchat::cache",
                %duplicate,
                fallback = %id,
                "duplicate message id; assigned fallback id"
            ),
            None => warn!(
                target: "longchat::cache",
                fallback = %id,
                "message has no stable id; assigned fallback id"
            ),
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem_dom::{MemoryDom, NodeId};

    fn setup(n: usize, with_ids: bool) -> (MemoryDom, NodeId, Vec<NodeId>) {
        let dom = MemoryDom::new();
        let main = dom.append_element(dom.body(), "main", &[], 0.0);
        let items = (0..n)
            .map(|i| {
                let id = format!("turn-{i}");
                if with_ids {
                    dom.append_element(main, "article", &[("data-testid", id.as_str())], 10.0)
                } else {
                    dom.append_element(main, "article", &[], 10.0)
                }
            })
            .collect();
        (dom, main, items)
    }

    fn config() -> VirtualizerConfig {
        VirtualizerConfig::default().with_message_selector("article")
    }

    #[test]
    fn rebuild_uses_host_ids_in_order() {
        let (dom, main, items) = setup(3, true);
        let mut cache = MessageCache::new();
        assert_eq!(cache.rebuild(&dom, &main, &config(), Duration::ZERO), 3);
        let ids: Vec<_> = cache.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["turn-0", "turn-1", "turn-2"]);
        let ordinals: Vec<_> = cache.records().iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, [0, 1, 2]);
        assert_eq!(cache.position_of_element(&items[2]), Some(2));
    }

    #[test]
    fn missing_ids_are_synthesized_and_persisted() {
        let (dom, main, items) = setup(5, false);
        let mut cache = MessageCache::new();
        cache.rebuild(&dom, &main, &config(), Duration::from_millis(1234));

        let mut ids: Vec<_> = cache.records().iter().map(|r| r.id.clone()).collect();
        for (record, item) in cache.records().iter().zip(&items) {
            assert!(record.id.starts_with("fallback-1234-"));
            assert_eq!(dom.attribute(item, "data-longchat-id"), Some(record.id.clone()));
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);

        // A second scan recognizes the persisted ids.
        let before: Vec<_> = cache.records().iter().map(|r| r.id.clone()).collect();
        cache.rebuild(&dom, &main, &config(), Duration::from_millis(9999));
        let after: Vec<_> = cache.records().iter().map(|r| r.id.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn duplicate_host_ids_get_distinct_fallbacks() {
        let dom = MemoryDom::new();
        let main = dom.append_element(dom.body(), "main", &[], 0.0);
        dom.append_element(main, "article", &[("data-testid", "same")], 10.0);
        let second = dom.append_element(main, "article", &[("data-testid", "same")], 10.0);

        let mut cache = MessageCache::new();
        cache.rebuild(&dom, &main, &config(), Duration::ZERO);
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.records()[0].id, "same");
        assert_ne!(cache.records()[1].id, "same");
        assert_eq!(dom.attribute(&second, "data-testid"), Some("same".into()));
    }

    #[test]
    fn append_rejects_known_ids() {
        let (dom, main, _) = setup(2, true);
        let mut cache = MessageCache::new();
        cache.rebuild(&dom, &main, &config(), Duration::ZERO);

        let fresh = dom.append_element(main, "article", &[("data-testid", "turn-2")], 10.0);
        assert!(cache.append(&dom, &fresh, &config(), Duration::ZERO));
        assert!(!cache.append(&dom, &fresh, &config(), Duration::ZERO));
        assert_eq!(cache.size(), 3);
        assert_eq!(cache.last().map(|r| r.ordinal), Some(2));
    }

    #[test]
    fn append_of_id_less_element_is_stable() {
        let (dom, main, _) = setup(1, true);
        let mut cache = MessageCache::new();
        cache.rebuild(&dom, &main, &config(), Duration::ZERO);

        let fresh = dom.append_element(main, "article", &[], 10.0);
        assert!(cache.append(&dom, &fresh, &config(), Duration::ZERO));
        assert!(!cache.append(&dom, &fresh, &config(), Duration::ZERO));
        assert_eq!(cache.size(), 2);
    }

    #[test]
    fn orphan_placeholders_are_removed() {
        let (dom, main, _) = setup(1, true);
        let stale = dom.create_placeholder(50.0, PLACEHOLDER_ATTRIBUTE, "gone").expect("placeholder");
        dom.append_child(main, stale);

        let mut cache = MessageCache::new();
        assert_eq!(cache.rebuild(&dom, &main, &config(), Duration::ZERO), 1);
        assert!(!dom.is_connected(&stale));
    }
}
