use std::collections::HashMap;

use bytes::Bytes;

use super::flags::Delivery;
use super::tracking::order_greater_than;

/// Ordering state for one channel of one peer.
#[derive(Debug, Default)]
pub(crate) struct Channel {
    reliable_out: u16,
    sequenced_out: u16,
    reliable_expected: u16,
    reliable_held: HashMap<u16, (u32, Bytes)>,
    sequenced_latest: Option<u16>,
}

impl Channel {
    pub fn next_order(&mut self, delivery: Delivery) -> u16 {
        let counter = match delivery {
            Delivery::Reliable => &mut self.reliable_out,
            Delivery::Sequenced => &mut self.sequenced_out,
            Delivery::Unsequenced => return 0,
        };
        let order = *counter;
        *counter = counter.wrapping_add(1);
        order
    }

    /// Feeds one complete message and returns everything now deliverable,
    /// as `(send_id, body)` pairs in delivery order.
    pub fn receive(
        &mut self,
        delivery: Delivery,
        order: u16,
        send_id: u32,
        body: Bytes,
    ) -> Vec<(u32, Bytes)> {
        match delivery {
            Delivery::Unsequenced => vec![(send_id, body)],
            Delivery::Sequenced => {
                let fresh = self
                    .sequenced_latest
                    .is_none_or(|latest| order_greater_than(order, latest));
                if !fresh {
                    return Vec::new();
                }
                self.sequenced_latest = Some(order);
                vec![(send_id, body)]
            }
            Delivery::Reliable => {
                if order != self.reliable_expected {
                    if order_greater_than(order, self.reliable_expected) {
                        self.reliable_held.insert(order, (send_id, body));
                    }
                    return Vec::new();
                }

                let mut ready = vec![(send_id, body)];
                self.reliable_expected = self.reliable_expected.wrapping_add(1);
                while let Some(next) = self.reliable_held.remove(&self.reliable_expected) {
                    ready.push(next);
                    self.reliable_expected = self.reliable_expected.wrapping_add(1);
                }
                ready
            }
        }
    }

    #[cfg(test)]
    pub fn held(&self) -> usize {
        self.reliable_held.len()
    }
}
