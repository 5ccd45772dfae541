//! Slot-order normalization for split payments.
//!
//! Source systems sometimes record the non-native payment in the first
//! slot. The rules below move it into slot 2 so slot 1 only ever carries
//! native or uncategorized money. Each rule is a pure pattern over the
//! record; `normalize` applies the first matching rule per pass until no
//! rule matches.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::payment::{PaymentMethod, PaymentSlot, SplitPayment};

/// Passes after which normalization gives up. Every rule empties or swaps
/// a slot, so real records settle within two passes.
const MAX_PASSES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRule {
    /// Both slots native: merge into slot 1.
    MergeNative,
    /// Review-site payment in slot 1 with native money in slot 2: swap.
    SwapReviewSite,
    /// Lone non-native payment in slot 1: move it to slot 2.
    MoveNonNativeToSecondary,
    /// Same method twice, or two non-native methods: merge into slot 2.
    MergeIntoSecondary,
}

impl SlotRule {
    /// Precedence order.
    pub const ALL: [SlotRule; 4] = [
        SlotRule::MergeNative,
        SlotRule::SwapReviewSite,
        SlotRule::MoveNonNativeToSecondary,
        SlotRule::MergeIntoSecondary,
    ];

    pub fn matches(&self, p: &SplitPayment) -> bool {
        match self {
            Self::MergeNative => p.slot1.is_native() && p.slot2.is_native(),
            Self::SwapReviewSite => {
                p.slot2.is_native() && p.slot1.has(&PaymentMethod::ThirdPartyReviewSite)
            }
            Self::MoveNonNativeToSecondary => p.slot1.is_non_native() && p.slot2.is_empty(),
            Self::MergeIntoSecondary => {
                !p.slot1.is_empty()
                    && !p.slot2.is_empty()
                    && (p.slot1.method == p.slot2.method
                        || (p.slot1.is_non_native() && p.slot2.is_non_native()))
            }
        }
    }

    pub fn apply(&self, p: SplitPayment) -> SplitPayment {
        let SplitPayment { slot1, slot2 } = p;
        match self {
            Self::MergeNative => SplitPayment {
                slot1: PaymentSlot {
                    method: slot1.method,
                    amount: slot1.amount + slot2.amount,
                },
                slot2: PaymentSlot::default(),
            },
            Self::SwapReviewSite | Self::MoveNonNativeToSecondary => SplitPayment {
                slot1: slot2,
                slot2: slot1,
            },
            Self::MergeIntoSecondary => SplitPayment {
                slot1: PaymentSlot::default(),
                slot2: PaymentSlot {
                    method: slot2.method,
                    amount: slot1.amount + slot2.amount,
                },
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::MergeNative => "merge_native",
            Self::SwapReviewSite => "swap_review_site",
            Self::MoveNonNativeToSecondary => "move_non_native_to_secondary",
            Self::MergeIntoSecondary => "merge_into_secondary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalized {
    pub payment: SplitPayment,
    /// Rules in the order they fired.
    pub applied: Vec<SlotRule>,
}

pub fn normalize(payment: SplitPayment) -> Normalized {
    let mut payment = payment;
    let mut applied = Vec::new();
    for _ in 0..MAX_PASSES {
        let Some(rule) = SlotRule::ALL.iter().find(|r| r.matches(&payment)) else {
            return Normalized { payment, applied };
        };
        payment = rule.apply(payment);
        applied.push(*rule);
    }
    warn!(rules = ?applied, "Slot normalization did not settle");
    Normalized { payment, applied }
}
