use glam::Vec2;

use tether::PlayerInput;

#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
}

impl InputState {
    /// Unit movement along y. Pressing both cancels out.
    pub fn movement(&self) -> Vec2 {
        let mut y = 0.0;
        if self.up {
            y -= 1.0;
        }
        if self.down {
            y += 1.0;
        }
        Vec2::new(0.0, y)
    }

    pub fn to_input(&self, client_id: u32, sequence: u32, timestamp_ms: u64) -> PlayerInput {
        PlayerInput {
            client_id,
            timestamp_ms,
            sequence,
            movement: self.movement(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_to_player_input() {
        let input = InputState {
            up: true,
            down: false,
        };

        let message = input.to_input(3, 17, 1_000);

        assert_eq!(message.client_id, 3);
        assert_eq!(message.sequence, 17);
        assert_eq!(message.timestamp_ms, 1_000);
        assert_eq!(message.movement, Vec2::new(0.0, -1.0));
    }

    #[test]
    fn test_opposite_keys_cancel() {
        let input = InputState {
            up: true,
            down: true,
        };
        assert_eq!(input.movement(), Vec2::ZERO);
    }
}
