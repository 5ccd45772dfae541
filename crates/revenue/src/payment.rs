//! Canonical payment methods and the two-slot split payment carried by a
//! space booking.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    PlatformNative,
    WelfareCredit,
    MonthlySettlement,
    ThirdPartyReviewSite,
    Other(String),
}

impl PaymentMethod {
    pub fn is_native(&self) -> bool {
        matches!(self, Self::PlatformNative)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::PlatformNative => "platform_native",
            Self::WelfareCredit => "welfare_credit",
            Self::MonthlySettlement => "monthly_settlement",
            Self::ThirdPartyReviewSite => "third_party_review_site",
            Self::Other(raw) => raw,
        }
    }

    fn from_canonical(name: &str) -> Option<Self> {
        match name {
            "platform_native" => Some(Self::PlatformNative),
            "welfare_credit" => Some(Self::WelfareCredit),
            "monthly_settlement" => Some(Self::MonthlySettlement),
            "third_party_review_site" => Some(Self::ThirdPartyReviewSite),
            _ => None,
        }
    }
}

/// Maps raw payment codes onto `PaymentMethod` through the configured aliases.
#[derive(Debug, Clone)]
pub struct PaymentResolver {
    aliases: HashMap<String, String>,
}

impl PaymentResolver {
    pub fn new(aliases: &HashMap<String, String>) -> Self {
        Self {
            aliases: aliases.clone(),
        }
    }

    /// Blank codes (and stringified nulls) resolve to no method. Codes that
    /// are neither aliased nor canonical are kept as `Other`.
    pub fn resolve(&self, raw: Option<&str>) -> Option<PaymentMethod> {
        let code = raw?.trim();
        if matches!(code, "" | "nan" | "NaN" | "None" | "null") {
            return None;
        }
        let canonical = self.aliases.get(code).map(String::as_str).unwrap_or(code);
        Some(PaymentMethod::from_canonical(canonical).unwrap_or_else(|| PaymentMethod::Other(code.to_string())))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentSlot {
    pub method: Option<PaymentMethod>,
    pub amount: f64,
}

impl PaymentSlot {
    pub fn new(method: PaymentMethod, amount: f64) -> Self {
        Self {
            method: Some(method),
            amount,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.method.is_none()
    }

    pub fn is_native(&self) -> bool {
        self.method.as_ref().is_some_and(PaymentMethod::is_native)
    }

    /// Non-empty and not platform-native.
    pub fn is_non_native(&self) -> bool {
        self.method.as_ref().is_some_and(|m| !m.is_native())
    }

    pub fn has(&self, method: &PaymentMethod) -> bool {
        self.method.as_ref() == Some(method)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitPayment {
    pub slot1: PaymentSlot,
    pub slot2: PaymentSlot,
}

impl SplitPayment {
    pub fn total(&self) -> f64 {
        self.slot1.amount + self.slot2.amount
    }
}
