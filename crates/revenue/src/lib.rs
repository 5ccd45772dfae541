//! Revenue attribution for the space and catering ledgers: payment-slot
//! normalization, category splitting, and balanced period roll-ups.

pub mod attributor;
pub mod classify;
pub mod ledger;
pub mod payment;
pub mod rules;

pub use attributor::{AttributionReport, RevenueAttributor, RuleUsage};
pub use classify::{Classifier, RemarkClass};
pub use ledger::{CateringSplit, Ledger, RevenueLedgerEntry, SpaceSplit};
pub use payment::{PaymentMethod, PaymentResolver, PaymentSlot, SplitPayment};
pub use rules::{normalize, Normalized, SlotRule};
