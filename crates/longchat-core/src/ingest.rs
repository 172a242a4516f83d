#![forbid(unsafe_code)]

//! Mutation ingest planning.
//!
//! A batch of child-list records is reduced to one decision: append these
//! trailing elements, rebuild from scratch, or do nothing. The manager then
//! runs the pipeline once for the whole batch, however many records it held
//! (streaming replies produce many per frame).
//!
//! # Classification
//!
//! | Observation | Result |
//! |-------------|--------|
//! | Added message after the current tail | appended |
//! | Added message already cached | ignored |
//! | Added placeholder | ignored (ours) |
//! | Added message before the tail | rebuild ([`RebuildReason::OutOfOrder`]) |
//! | Added message outside the container | rebuild ([`RebuildReason::OutsideContainer`]) |
//! | Added message reusing a cached id | rebuild ([`RebuildReason::DuplicateId`]) |
//! | Removed node holding a cached element | rebuild ([`RebuildReason::CachedRemoved`]) |
//! | Tail record vanished from the page | rebuild ([`RebuildReason::TailMissing`]) |

use core::fmt;

use crate::cache::MessageCache;
use crate::config::{PLACEHOLDER_ATTRIBUTE, VirtualizerConfig};
use crate::host::{HostDom, MutationBatch};

/// Why a batch could not be handled by appending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    OutOfOrder,
    OutsideContainer,
    DuplicateId,
    CachedRemoved,
    TailMissing,
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OutOfOrder => "message inserted before the tail",
            Self::OutsideContainer => "message outside the container",
            Self::DuplicateId => "message reuses a cached id",
            Self::CachedRemoved => "cached message removed",
            Self::TailMissing => "tail message no longer in the page",
        })
    }
}

/// What to do with one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestPlan<N> {
    /// New trailing elements, in document order.
    pub appends: Vec<N>,
    /// Set when appending is not enough.
    pub rebuild: Option<RebuildReason>,
}

impl<N> IngestPlan<N> {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.appends.is_empty() && self.rebuild.is_none()
    }
}

/// Message elements at or under `node`.
fn messages_in<D: HostDom>(dom: &D, node: &D::Node, selector: &str) -> Vec<D::Node> {
    if dom.matches(node, selector) {
        vec![node.clone()]
    } else {
        dom.query_all(node, selector)
    }
}

/// Classify `batch` against the current cache.
pub fn plan<D: HostDom>(
    dom: &D,
    cache: &MessageCache<D::Node>,
    container: &D::Node,
    config: &VirtualizerConfig,
    batch: &MutationBatch<D::Node>,
) -> IngestPlan<D::Node> {
    let selector = config.selectors.message.as_str();
    let mut out = IngestPlan {
        appends: Vec::new(),
        rebuild: None,
    };

    for removed in &batch.removed {
        if dom.attribute(removed, PLACEHOLDER_ATTRIBUTE).is_some() {
            continue;
        }
        if messages_in(dom, removed, selector)
            .iter()
            .any(|m| cache.cached_position(dom, m, config).is_some())
        {
            out.rebuild = Some(RebuildReason::CachedRemoved);
            return out;
        }
    }

    let mut tail = cache.last().and_then(|r| r.current_node(dom).cloned());
    for added in &batch.added {
        if !dom.is_connected(added) || dom.attribute(added, PLACEHOLDER_ATTRIBUTE).is_some() {
            continue;
        }
        for candidate in messages_in(dom, added, selector) {
            if out.appends.contains(&candidate)
                || cache.cached_position(dom, &candidate, config).is_some()
            {
                continue;
            }
            let reason = if !dom.contains(container, &candidate) {
                Some(RebuildReason::OutsideContainer)
            } else if MessageCache::existing_id(dom, &candidate, config)
                .is_some_and(|id| cache.contains_id(&id))
            {
                Some(RebuildReason::DuplicateId)
            } else {
                match &tail {
                    Some(t) if !dom.follows(&candidate, t) => Some(RebuildReason::OutOfOrder),
                    None if !cache.is_empty() => Some(RebuildReason::TailMissing),
                    _ => None,
                }
            };
            if reason.is_some() {
                out.appends.clear();
                out.rebuild = reason;
                return out;
            }
            tail = Some(candidate.clone());
            out.appends.push(candidate);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem_dom::{MemoryDom, NodeId};
    use core::time::Duration;

    fn config() -> VirtualizerConfig {
        VirtualizerConfig::default().with_message_selector("article")
    }

    fn setup(n: usize) -> (MemoryDom, NodeId, Vec<NodeId>, MessageCache<NodeId>) {
        let dom = MemoryDom::new();
        let main = dom.append_element(dom.body(), "main", &[], 0.0);
        let items = (0..n)
            .map(|i| {
                let id = format!("t{i}");
                dom.append_element(main, "article", &[("data-testid", id.as_str())], 10.0)
            })
            .collect();
        let mut cache = MessageCache::new();
        cache.rebuild(&dom, &main, &config(), Duration::ZERO);
        dom.clear_mutations();
        (dom, main, items, cache)
    }

    #[test]
    fn trailing_messages_append_in_order() {
        let (dom, main, _, cache) = setup(2);
        let a = dom.append_element(main, "article", &[("data-testid", "t2")], 10.0);
        let wrapper = dom.append_element(main, "div", &[], 0.0);
        let b = dom.append_element(wrapper, "article", &[("data-testid", "t3")], 10.0);
        let batch = dom.take_mutations();

        let p = plan(&dom, &cache, &main, &config(), &batch);
        assert_eq!(p.appends, vec![a, b]);
        assert_eq!(p.rebuild, None);
    }

    #[test]
    fn cached_and_placeholder_nodes_are_ignored() {
        let (dom, main, items, cache) = setup(2);
        let ph = dom.create_placeholder(10.0, PLACEHOLDER_ATTRIBUTE, "t0").expect("placeholder");
        dom.append_child(main, ph);
        let batch = MutationBatch::added(vec![items[1], ph]);
        assert!(plan(&dom, &cache, &main, &config(), &batch).is_noop());
    }

    #[test]
    fn insertion_before_tail_rebuilds() {
        let (dom, main, items, cache) = setup(2);
        let early = dom.create_element("article");
        dom.set_attribute(&early, "data-testid", "t-early");
        dom.insert_before(&main, &early, Some(&items[1]));
        let batch = dom.take_mutations();

        let p = plan(&dom, &cache, &main, &config(), &batch);
        assert_eq!(p.rebuild, Some(RebuildReason::OutOfOrder));
        assert!(p.appends.is_empty());
    }

    #[test]
    fn outside_container_and_duplicates_rebuild() {
        let (dom, main, _, cache) = setup(1);
        let stray = dom.append_element(dom.body(), "article", &[("data-testid", "x")], 10.0);
        let p = plan(&dom, &cache, &main, &config(), &MutationBatch::added(vec![stray]));
        assert_eq!(p.rebuild, Some(RebuildReason::OutsideContainer));

        let dup = dom.append_element(main, "article", &[("data-testid", "t0")], 10.0);
        let p = plan(&dom, &cache, &main, &config(), &MutationBatch::added(vec![dup]));
        assert_eq!(p.rebuild, Some(RebuildReason::DuplicateId));
    }

    #[test]
    fn removal_of_cached_message_rebuilds() {
        let (dom, main, items, cache) = setup(3);
        dom.remove(&items[1]);
        let batch = dom.take_mutations();
        let p = plan(&dom, &cache, &main, &config(), &batch);
        assert_eq!(p.rebuild, Some(RebuildReason::CachedRemoved));
    }

    #[test]
    fn vanished_tail_rebuilds() {
        let (dom, main, items, cache) = setup(2);
        let other = dom.append_element(dom.body(), "aside", &[], 0.0);
        dom.append_child(other, items[1]);
        dom.clear_mutations();
        dom.remove(&other);
        dom.clear_mutations();

        let fresh = dom.append_element(main, "article", &[("data-testid", "t9")], 10.0);
        let p = plan(&dom, &cache, &main, &config(), &MutationBatch::added(vec![fresh]));
        assert_eq!(p.rebuild, Some(RebuildReason::TailMissing));
    }
}
