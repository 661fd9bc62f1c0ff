pub mod config;
pub mod diagnostic;
pub mod logging;
pub mod report;
pub mod wallets;

pub use diagnostic::{
    Diagnostic,
    Step,
    StepError,
    StepKind,
    run,
};
pub use report::{
    Entry,
    Outcome,
    Report,
};
