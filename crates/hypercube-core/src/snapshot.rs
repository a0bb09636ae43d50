//! Pure byte-layout dump of a [`crate::Machine`], matching the reference
//! tool's per-cycle frame format exactly (minus the frame's own filesystem
//! and `zip` plumbing, which is an external collaborator's job, not this
//! crate's).
//!
//! Per chip, in id order: every cell's `{flags; memory}`, then
//! `buffer_depth` buffer-slot messages (empty slots as a sentinel message
//! with `address = 0xFF`), then the 4 `listening` indices, then 4 partial
//! messages (same sentinel for empty). A trailing packed `u64` instruction
//! word follows every chip's data.

use crate::machine::Machine;
use crate::message::Message;

pub(crate) fn snapshot(machine: &Machine, instruction: u64) -> Vec<u8> {
    let message_bytes = machine.topology.message_bytes;
    let mut out = Vec::new();

    for chip in &machine.chips {
        for cell in &chip.cells {
            out.extend_from_slice(&cell.flags.to_le_bytes());
            out.extend_from_slice(&cell.memory);
        }

        for slot in 0..machine.topology.buffer_depth {
            match chip.router.buffer.get(slot) {
                Some(message) => write_message(&mut out, message),
                None => write_message(&mut out, &Message::sentinel(message_bytes)),
            }
        }

        for listener in chip.router.listening {
            out.extend_from_slice(&listener.to_le_bytes());
        }

        for partial in &chip.router.partials {
            match partial {
                Some(message) => write_message(&mut out, message),
                None => write_message(&mut out, &Message::sentinel(message_bytes)),
            }
        }
    }

    out.extend_from_slice(&instruction.to_le_bytes());
    out
}

fn write_message(out: &mut Vec<u8>, message: &Message) {
    out.extend_from_slice(&message.address.to_le_bytes());
    out.extend_from_slice(&message.payload);
    out.push(message.parity);
}
