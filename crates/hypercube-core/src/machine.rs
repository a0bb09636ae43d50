//! The top-level machine: `2^D` chips wired as a hypercube, the
//! petit-cycle counter, and the mode bits that govern it.

use crate::chip::{Chip, NewsDirection};
use crate::error::{ModeChangeError, RouterOverflowError};
use crate::flags;
use crate::message::Message;
use crate::router::ReceiveOutcome;
use crate::topology::Topology;

pub struct Machine {
    pub topology: Topology,
    pub chips: Vec<Chip>,
    pub petit_counter: u32,
    pub should_or: bool,
    pub slow_mode: bool,
    pub dump: bool,
    pub global_pin: bool,
    big_cycles_run: u64,
}

impl Machine {
    /// Builds a machine at [`Topology::DEFAULT`] (`D=12, P=4, M=4, B=7`).
    pub fn build() -> Self {
        Self::build_with_topology(Topology::DEFAULT)
    }

    /// Builds a machine at an arbitrary (already-validated) topology.
    /// Chips are wired into a full hypercube; each router's referer is the
    /// next chip in id order, wrapping — the same ring the reference
    /// implementation uses.
    pub fn build_with_topology(topology: Topology) -> Self {
        let chip_count = topology.chip_count();
        let chips = (0..chip_count)
            .map(|i| Chip::new(i as u32, (i + 1) % chip_count, topology))
            .collect();
        Machine {
            topology,
            chips,
            petit_counter: 0,
            should_or: false,
            slow_mode: false,
            dump: false,
            global_pin: false,
            big_cycles_run: 0,
        }
    }

    /// Runs one petit-cycle of the instruction against every chip.
    ///
    /// Order matters: every chip executes (broadcast + router forward
    /// phase) before any chip receives, so no router observes another's
    /// partial state for this tick.
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &mut self,
        addr_a: u16,
        addr_b: u16,
        flag_r: u8,
        flag_w: u8,
        flag_c: u8,
        sense: u8,
        mem_truth: u8,
        flag_truth: u8,
        news_dir: NewsDirection,
    ) {
        let petit_clock = self.petit_counter;
        let should_or = self.should_or;
        let slow_mode = self.slow_mode;

        let mut forwarded = Vec::new();
        for (idx, chip) in self.chips.iter_mut().enumerate() {
            if let Some((dim, message)) = chip.execute(
                addr_a, addr_b, flag_r, flag_w, flag_c, sense, mem_truth, flag_truth, news_dir,
                petit_clock, should_or, slow_mode,
            ) {
                forwarded.push((idx, dim, message));
            }
        }
        for (idx, dim, message) in forwarded {
            // `dim` is the inport/outport array index, which the wiring at
            // build time assigns to hypercube id-bit `D-1-dim` — not `dim`
            // itself.
            let id_bit = self.topology.dimensions - 1 - dim;
            let target = idx ^ (1usize << id_bit);
            self.chips[target].router.inports[dim as usize] = Some(message);
        }

        let mut overflowed = Vec::new();
        for (idx, chip) in self.chips.iter_mut().enumerate() {
            if let ReceiveOutcome::Overflow(message) = chip.receive(petit_clock, slow_mode) {
                overflowed.push((idx, message));
            }
        }
        for (idx, message) in overflowed {
            self.refer(idx, message);
        }

        let mut pin = false;
        for chip in &mut self.chips {
            for cell in &mut chip.cells {
                if cell.flags & flags::GLOBAL_BIT != 0 {
                    pin = true;
                }
                cell.flags &= !flags::GLOBAL_BIT;
            }
        }
        self.global_pin = pin;

        if self.dump {
            let instruction = pack_instruction(
                addr_a, addr_b, flag_r, flag_w, flag_c, sense, mem_truth, flag_truth, news_dir,
            );
            let _ = self.snapshot(instruction);
        }

        self.big_cycles_run += 1;
        self.petit_counter += 1;
        if self.petit_counter >= self.topology.petit_cycle_period(slow_mode) {
            self.petit_counter = 0;
        }
    }

    /// Walks the referer chain starting at the chip that overflowed. XORs
    /// that chip's own id into the message's home-router bits once up
    /// front, then tries each router in the chain in turn; whichever one
    /// actually has space XORs its own id in a second time on acceptance
    /// (in `Router::try_accept`). Only the origin and the eventual landing
    /// router contribute a XOR — routers the message merely bounces off
    /// while full do not. Panics (the documented fatal/abort path) if every
    /// router in the hypercube is full — the reference implementation
    /// instead recurses without bound and would exhaust the stack; this
    /// makes the same condition an explicit, catchable abort instead.
    fn refer(&mut self, origin_idx: usize, mut message: Message) {
        message.address ^= self.chips[origin_idx].router.id << self.topology.processors;

        let chip_count = self.topology.chip_count();
        let mut idx = self.chips[origin_idx].router.referer;
        for _ in 0..chip_count {
            match self.chips[idx].router.try_accept(message) {
                Ok(()) => return,
                Err(m) => {
                    message = m;
                    idx = self.chips[idx].router.referer;
                }
            }
        }
        panic!("{}", RouterOverflowError);
    }

    /// Valid only when `petit_counter == 0`.
    pub fn set_should_or(&mut self, value: bool) -> Result<(), ModeChangeError> {
        if self.petit_counter != 0 {
            return Err(ModeChangeError::WrongPhase);
        }
        self.should_or = value;
        Ok(())
    }

    /// Valid only when `petit_counter == 0`.
    pub fn set_slow_mode(&mut self, value: bool) -> Result<(), ModeChangeError> {
        if self.petit_counter != 0 {
            return Err(ModeChangeError::WrongPhase);
        }
        self.slow_mode = value;
        Ok(())
    }

    /// Valid only before the first big cycle has executed.
    pub fn set_dump(&mut self, value: bool) -> Result<(), ModeChangeError> {
        if self.big_cycles_run != 0 {
            return Err(ModeChangeError::MachineAlreadyRunning);
        }
        self.dump = value;
        Ok(())
    }

    /// Stalls the machine to petit-cycle 0 by issuing identity no-ops.
    /// Does not flush in-flight messages.
    pub fn petit_sync(&mut self) {
        use crate::cell::{IDF, IDM};
        while self.petit_counter != 0 {
            self.execute(0, 0, 0, 0, 0, 0, IDM, IDF, NewsDirection::North);
        }
    }

    /// True iff at least one router currently has a non-empty buffer.
    /// Named for parity with the reference `network_empty`, whose name is
    /// inverted from what it returns; the behaviour here matches that
    /// source exactly.
    pub fn network_empty(&self) -> bool {
        self.chips.iter().any(|c| c.router.router_empty_quirk())
    }

    pub fn global_pin(&self) -> bool {
        self.global_pin
    }

    /// Produces the per-chip cell/buffer/listening/partial byte layout a
    /// dump consumer expects, trailed by the packed instruction word. Pure;
    /// does not touch the filesystem. Callers that want an on-disk dump own
    /// that themselves.
    pub fn snapshot(&self, instruction: u64) -> Vec<u8> {
        crate::snapshot::snapshot(self, instruction)
    }
}

#[allow(clippy::too_many_arguments)]
fn pack_instruction(
    addr_a: u16,
    addr_b: u16,
    flag_r: u8,
    flag_w: u8,
    flag_c: u8,
    sense: u8,
    mem_truth: u8,
    flag_truth: u8,
    news_dir: NewsDirection,
) -> u64 {
    let mut ins: u64 = addr_a as u64;
    ins = (ins << 12) | addr_b as u64;
    ins = (ins << 4) | flag_r as u64;
    ins = (ins << 4) | flag_w as u64;
    ins = (ins << 4) | flag_c as u64;
    ins = (ins << 1) | sense as u64;
    ins = (ins << 8) | mem_truth as u64;
    ins = (ins << 8) | flag_truth as u64;
    ins = (ins << 2) | news_dir.as_u8() as u64;
    ins
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{IDF, IDM, SETZ};

    fn small_machine() -> Machine {
        Machine::build_with_topology(Topology::new(4, 2, 1, 3).unwrap())
    }

    #[test]
    fn petit_counter_wraps_after_full_period() {
        let mut m = small_machine();
        let period = m.topology.petit_cycle_period(false);
        for _ in 0..period {
            m.execute(0, 0, 0, 0, 0, 0, IDM, IDF, NewsDirection::North);
        }
        assert_eq!(m.petit_counter, 0);
    }

    #[test]
    fn mode_setters_fail_mid_cycle() {
        let mut m = small_machine();
        m.execute(0, 0, 0, 0, 0, 0, IDM, IDF, NewsDirection::North);
        assert!(m.petit_counter != 0);
        assert_eq!(m.set_should_or(true), Err(ModeChangeError::WrongPhase));
        assert_eq!(m.set_slow_mode(true), Err(ModeChangeError::WrongPhase));
    }

    #[test]
    fn dump_mode_fails_after_first_big_cycle() {
        let mut m = small_machine();
        m.execute(0, 0, 0, 0, 0, 0, IDM, IDF, NewsDirection::North);
        m.petit_sync();
        assert_eq!(
            m.set_dump(true),
            Err(ModeChangeError::MachineAlreadyRunning)
        );
    }

    #[test]
    fn global_pin_pulses_and_clears() {
        let mut m = small_machine();
        m.chips[7].cells[2].flags |= flags::GLOBAL_BIT;
        m.chips[9 % m.chips.len()].cells[0].flags |= flags::GLOBAL_BIT;
        m.execute(0, 0, 0, 0, 0, 0, SETZ, SETZ, NewsDirection::North);
        assert!(m.global_pin());
        assert_eq!(m.chips[7].cells[2].flags & flags::GLOBAL_BIT, 0);
        m.execute(0, 0, 0, 0, 0, 0, SETZ, SETZ, NewsDirection::North);
        assert!(!m.global_pin());
    }
}
