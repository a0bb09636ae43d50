//! Sizing parameters for the machine.
//!
//! The reference design treats `DIMENSIONS`/`PROCESSORS`/`MESSAGE_LENGTH`/
//! `BUFSIZE` as compile-time constants. Here they're plain data on a
//! `Copy` struct instead, so tests can build a small hypercube rather than
//! paying for the full 4096-chip default on every run. [`Topology::DEFAULT`]
//! reproduces the original constants exactly.

use std::fmt;

/// The four parameters that size every other structure in the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    /// Hypercube dimensions (`D`). The machine has `2^dimensions` chips.
    pub dimensions: u32,
    /// log2 of processors per chip (`P`). Each chip has `2^processors` cells.
    pub processors: u32,
    /// Message payload length in bytes (`M`).
    pub message_bytes: usize,
    /// Router buffer depth (`B`).
    pub buffer_depth: usize,
}

impl Topology {
    /// `D=12, P=4, M=4, B=7` — the parameters used throughout the design.
    pub const DEFAULT: Topology = Topology {
        dimensions: 12,
        processors: 4,
        message_bytes: 4,
        buffer_depth: 7,
    };

    /// Builds a topology, rejecting shapes the rest of the crate can't
    /// support: the NEWS network needs a square grid of cells, so
    /// `processors` must be even, and both `message_bytes` and
    /// `buffer_depth` must be nonzero.
    pub fn new(
        dimensions: u32,
        processors: u32,
        message_bytes: usize,
        buffer_depth: usize,
    ) -> Result<Self, TopologyError> {
        if processors % 2 != 0 {
            return Err(TopologyError::OddProcessors(processors));
        }
        if message_bytes == 0 {
            return Err(TopologyError::ZeroMessageBytes);
        }
        if buffer_depth == 0 {
            return Err(TopologyError::ZeroBufferDepth);
        }
        Ok(Topology {
            dimensions,
            processors,
            message_bytes,
            buffer_depth,
        })
    }

    /// `ADDRLEN = D + P`.
    pub const fn addr_len(&self) -> u32 {
        self.dimensions + self.processors
    }

    pub const fn chip_count(&self) -> usize {
        1usize << self.dimensions
    }

    pub const fn cells_per_chip(&self) -> usize {
        1usize << self.processors
    }

    /// `8 * message_bytes`.
    pub const fn payload_bits(&self) -> u32 {
        (self.message_bytes as u32) << 3
    }

    /// Length of the injection phase in petit-cycles: `ADDRLEN + 8M + 3`.
    pub const fn injection_len(&self) -> u32 {
        self.addr_len() + self.payload_bits() + 3
    }

    /// Petit-cycles one dimension occupies in slow mode: `ADDRLEN + 8M + 2`.
    pub const fn slow_dimension_stride(&self) -> u32 {
        self.addr_len() + self.payload_bits() + 2
    }

    /// Total petit-cycles in one big cycle, at which `petit_counter` wraps.
    pub const fn petit_cycle_period(&self, slow_mode: bool) -> u32 {
        let dim_span = if slow_mode {
            self.dimensions * self.slow_dimension_stride()
        } else {
            self.dimensions
        };
        self.injection_len() + dim_span + self.payload_bits() + 2
    }

    /// Side length of the square the NEWS network arranges cells into.
    pub const fn square_side(&self) -> usize {
        1usize << (self.processors / 2)
    }
}

/// A topology whose parameters can't be realised by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyError {
    OddProcessors(u32),
    ZeroMessageBytes,
    ZeroBufferDepth,
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyError::OddProcessors(p) => {
                write!(f, "processors ({p}) must be even for a square NEWS grid")
            }
            TopologyError::ZeroMessageBytes => write!(f, "message_bytes must be nonzero"),
            TopologyError::ZeroBufferDepth => write!(f, "buffer_depth must be nonzero"),
        }
    }
}

impl std::error::Error for TopologyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_reference_constants() {
        let t = Topology::DEFAULT;
        assert_eq!(t.addr_len(), 16);
        assert_eq!(t.chip_count(), 4096);
        assert_eq!(t.cells_per_chip(), 16);
        assert_eq!(t.payload_bits(), 32);
        assert_eq!(t.injection_len(), 16 + 32 + 3);
        assert_eq!(t.petit_cycle_period(false), 16 + 32 + 3 + 12 + 32 + 2);
    }

    #[test]
    fn rejects_odd_processors() {
        assert_eq!(
            Topology::new(4, 3, 4, 7),
            Err(TopologyError::OddProcessors(3))
        );
    }
}
