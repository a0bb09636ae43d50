//! Cycle-accurate core of a Connection-Machine-style SIMD hypercube
//! simulator: bit-serial cells, the chip that broadcasts one instruction to
//! all of them, the per-chip hypercube router, and the machine that drives
//! the petit-cycle schedule across the whole cube.
//!
//! Host-facing surface is [`Machine`]; everything else is exposed for
//! testing and for collaborators (dump consumers, command dispatch) that
//! need to reach below it.

mod cell;
mod chip;
mod error;
mod flags;
mod machine;
mod message;
mod observable;
mod router;
mod snapshot;
mod topology;

pub use cell::{Cell, AND, CPM, IDF, IDM, MAJ, OR, SETO, SETZ, XOR};
pub use chip::{Chip, NewsDirection};
pub use error::{ModeChangeError, RouterOverflowError};
pub use flags::{
    flag_bit, is_writable, DAISY_CHAIN_BIT, GLOBAL_BIT, NEWS_BIT, READ_ONLY_FLAGS, ROUTER_ACK_BIT,
    ROUTER_DATA_BIT,
};
pub use machine::Machine;
pub use message::Message;
pub use observable::{Observable, Value};
pub use router::{ReceiveOutcome, Router};
pub use topology::{Topology, TopologyError};
