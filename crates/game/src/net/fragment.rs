use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use log::debug;

/// Cuts `body` into slices of at most `max` bytes. An empty body still
/// produces one (empty) fragment.
pub(crate) fn split(body: &Bytes, max: usize) -> Vec<Bytes> {
    if body.len() <= max {
        return vec![body.clone()];
    }
    (0..body.len())
        .step_by(max)
        .map(|start| body.slice(start..(start + max).min(body.len())))
        .collect()
}

struct Partial {
    parts: Vec<Option<Bytes>>,
    received: usize,
    started: Instant,
}

/// Collects fragments keyed by channel and fragment group.
pub(crate) struct Reassembler {
    partials: HashMap<(u8, u16), Partial>,
    timeout: Duration,
    max_fragments: usize,
}

impl Reassembler {
    /// `max_fragments` bounds the `count` a remote may announce for one group.
    pub fn new(timeout: Duration, max_fragments: usize) -> Self {
        Self {
            partials: HashMap::new(),
            timeout,
            max_fragments,
        }
    }

    /// Fragment budget for packets of at most `max_packet_size` bytes.
    pub fn fragment_limit(max_packet_size: usize, fragment_body: usize) -> usize {
        max_packet_size / fragment_body.max(1) + 1
    }

    /// Returns the whole body once the last missing fragment arrives.
    pub fn insert(
        &mut self,
        channel: u8,
        group: u16,
        index: u16,
        count: u16,
        body: Bytes,
        now: Instant,
    ) -> Option<Bytes> {
        if count as usize > self.max_fragments || index >= count {
            debug!(
                "dropping fragment {}/{} of group {} on channel {}",
                index, count, group, channel
            );
            return None;
        }

        let partial = self
            .partials
            .entry((channel, group))
            .or_insert_with(|| Partial {
                parts: vec![None; count as usize],
                received: 0,
                started: now,
            });

        if partial.parts.len() != count as usize {
            // Group reused with a different shape; start over.
            *partial = Partial {
                parts: vec![None; count as usize],
                received: 0,
                started: now,
            };
        }

        let slot = partial.parts.get_mut(index as usize)?;
        if slot.is_none() {
            *slot = Some(body);
            partial.received += 1;
        }

        if partial.received < partial.parts.len() {
            return None;
        }

        let partial = self.partials.remove(&(channel, group))?;
        let total = partial.parts.iter().flatten().map(Bytes::len).sum();
        let mut whole = BytesMut::with_capacity(total);
        for part in partial.parts.into_iter().flatten() {
            whole.extend_from_slice(&part);
        }
        Some(whole.freeze())
    }

    /// Drops incomplete groups older than the timeout; returns how many.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.partials.len();
        let timeout = self.timeout;
        self.partials
            .retain(|_, p| now.duration_since(p.started) < timeout);
        before - self.partials.len()
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.partials.len()
    }
}
