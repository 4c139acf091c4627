//! Transfer engine for the balance sweeper: the Horizon ledger adapter, the
//! notification channels, and the polling state machine that ties them
//! together. `main.rs` wires these up from the environment.

pub mod notify;
pub mod pipeline;
pub mod rpc;
pub mod worker;

pub use notify::{LogNotifier, TelegramNotifier};
pub use pipeline::{build_transfer, BuildOutcome};
pub use rpc::HorizonLedger;
pub use worker::{
    launch_sweeper, EngineError, EngineSettings, EngineState, SweepReceipt, TransferEngine,
};
