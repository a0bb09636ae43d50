//! A chip: `2^P` cells plus one router, sharing the chip's piece of the
//! petit-cycle schedule.

use crate::cell::Cell;
use crate::flags;
use crate::message::Message;
use crate::router::{ReceiveOutcome, Router};
use crate::topology::Topology;

/// NEWS shift direction, numbered as the host instruction encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsDirection {
    North,
    East,
    West,
    South,
}

impl NewsDirection {
    pub fn as_u8(self) -> u8 {
        match self {
            NewsDirection::North => 0,
            NewsDirection::East => 1,
            NewsDirection::West => 2,
            NewsDirection::South => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chip {
    pub cells: Vec<Cell>,
    pub router: Router,
    /// Scratch flag words reused across `execute` calls so the router
    /// phase doesn't need a `&mut Cell` per processor — see DESIGN.md.
    flag_scratch: Vec<u16>,
}

impl Chip {
    pub fn new(id: u32, referer: usize, topology: Topology) -> Self {
        let cells = vec![Cell::new(); topology.cells_per_chip()];
        let flag_scratch = vec![0u16; cells.len()];
        Chip {
            cells,
            router: Router::new(id, referer, topology),
            flag_scratch,
        }
    }

    /// Broadcasts one instruction to every cell, applies daisy-chain/NEWS
    /// wiring from the snapshotted results, then advances this chip's
    /// router by one petit-cycle. Returns the `(dimension, message)` this
    /// chip forwarded this cycle, if any — the caller (the machine) is
    /// responsible for placing it into the neighbouring chip's inport.
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
        petit_clock: u32,
        should_or: bool,
        slow_mode: bool,
    ) -> Option<(u32, Message)> {
        let topology = self.router.topology;

        let mut results = vec![0u8; self.cells.len()];
        for (i, cell) in self.cells.iter_mut().enumerate() {
            results[i] =
                cell.execute(addr_a, addr_b, flag_r, flag_w, flag_c, sense, mem_truth, flag_truth);
        }

        for i in 0..self.cells.len() - 1 {
            Self::set_flag_bit(&mut self.cells[i + 1].flags, flags::DAISY_CHAIN_BIT, results[i]);
        }

        let sqw = topology.square_side();
        match news_dir {
            NewsDirection::North => {
                for i in 0..self.cells.len().saturating_sub(sqw) {
                    Self::set_flag_bit(&mut self.cells[i].flags, flags::NEWS_BIT, results[i + sqw]);
                }
            }
            NewsDirection::South => {
                for i in sqw..self.cells.len() {
                    Self::set_flag_bit(&mut self.cells[i].flags, flags::NEWS_BIT, results[i - sqw]);
                }
            }
            NewsDirection::East => {
                // Source condition as-is: fires only on column 0, not the
                // `!= 0` one might expect. See DESIGN.md. Cell 0 is excluded:
                // the source reads `results[i-1]` there too, which is an
                // out-of-bounds stack read in C (silent UB) but would
                // underflow and panic here, so it's skipped rather than
                // reproduced.
                for i in 1..self.cells.len() {
                    if i % sqw == 0 {
                        Self::set_flag_bit(&mut self.cells[i].flags, flags::NEWS_BIT, results[i - 1]);
                    }
                }
            }
            NewsDirection::West => {
                for i in 0..self.cells.len() {
                    if i % sqw != sqw - 1 {
                        Self::set_flag_bit(&mut self.cells[i].flags, flags::NEWS_BIT, results[i + 1]);
                    }
                }
            }
        }

        for (slot, cell) in self.flag_scratch.iter_mut().zip(self.cells.iter()) {
            *slot = cell.flags;
        }

        let outcome = Self::router_phase(&mut self.router, &mut self.flag_scratch, petit_clock, should_or, slow_mode);

        for (cell, slot) in self.cells.iter_mut().zip(self.flag_scratch.iter()) {
            cell.flags = *slot;
        }

        outcome
    }

    fn router_phase(
        router: &mut Router,
        flag_scratch: &mut [u16],
        petit_clock: u32,
        should_or: bool,
        slow_mode: bool,
    ) -> Option<(u32, Message)> {
        let topology = router.topology;
        let inj = topology.injection_len();

        if petit_clock < inj {
            router.inject(petit_clock, flag_scratch);
            return None;
        }

        let k = petit_clock - inj;
        let dc = topology.slow_dimension_stride();
        let dim_span = if slow_mode {
            topology.dimensions * dc
        } else {
            topology.dimensions
        };

        if k >= dim_span {
            router.deliver(k - dim_span, should_or, flag_scratch);
            None
        } else if slow_mode {
            if k % dc == 0 {
                router.forward(k / dc).map(|m| (k / dc, m))
            } else {
                None
            }
        } else {
            router.forward(k).map(|m| (k, m))
        }
    }

    /// Symmetric to the router phase of `execute`, but for receiving.
    /// Must be called for every chip only after every chip has finished
    /// `execute` for this `petit_clock`.
    pub fn receive(&mut self, petit_clock: u32, slow_mode: bool) -> ReceiveOutcome {
        let topology = self.router.topology;
        let inj = topology.injection_len();
        if petit_clock < inj {
            return ReceiveOutcome::Idle;
        }
        let k = petit_clock - inj;
        let dc = topology.slow_dimension_stride();
        let dim_span = if slow_mode {
            topology.dimensions * dc
        } else {
            topology.dimensions
        };
        if k >= dim_span {
            return ReceiveOutcome::Idle;
        }

        if !slow_mode {
            self.router.receive(k)
        } else if k % dc == 0 {
            self.router.receive(k / dc)
        } else {
            ReceiveOutcome::Idle
        }
    }

    fn set_flag_bit(flags_word: &mut u16, mask: u16, value: u8) {
        if value != 0 {
            *flags_word |= mask;
        } else {
            *flags_word &= !mask;
        }
    }
}
