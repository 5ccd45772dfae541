//! Canonical input tables handed over by data preparation, and the
//! per-transaction `Event` projection the analysis modules consume.

use crate::error::{InsightsError, InsightsResult};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Identifier of a real member. Rows without one are guests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl MemberId {
    /// Upstream extracts stringify missing identifiers, so blanks and
    /// null spellings are treated as absent.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let trimmed = raw?.trim();
        match trimmed {
            "" | "nan" | "NaN" | "None" | "null" => None,
            id => Some(Self(id.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Space,
    Catering,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTags {
    pub channel: Channel,
    pub payment_method: Option<String>,
    pub remark: Option<String>,
}

/// One completed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub member: Option<MemberId>,
    pub timestamp: NaiveDateTime,
    pub amount: f64,
    pub order_id: String,
    pub tags: CategoryTags,
}

impl Event {
    pub fn is_guest(&self) -> bool {
        self.member.is_none()
    }
}

/// Events built from a source table plus the rows that could not be used.
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    pub events: Vec<Event>,
    pub skipped_rows: usize,
}

// ─── Source tables ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpaceBooking {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "datetime_format::deserialize")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "datetime_format::deserialize")]
    pub booking_start: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "datetime_format::deserialize")]
    pub booking_end: Option<NaiveDateTime>,
    #[serde(default)]
    pub actual_hours: Option<f64>,
    #[serde(default)]
    pub paid_amount: f64,
    #[serde(default)]
    pub payment_method_1: Option<String>,
    #[serde(default)]
    pub payment_amount_1: Option<f64>,
    #[serde(default)]
    pub payment_method_2: Option<String>,
    #[serde(default)]
    pub payment_amount_2: Option<f64>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default, deserialize_with = "flag_format::deserialize")]
    pub upgraded: bool,
    #[serde(default)]
    pub overtime_minutes: Option<f64>,
}

impl SpaceBooking {
    /// Member number, falling back to the phone number the booking was made with.
    pub fn identity(&self) -> Option<MemberId> {
        MemberId::parse(self.member_id.as_deref()).or_else(|| MemberId::parse(self.phone.as_deref()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CateringOrder {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default, deserialize_with = "datetime_format::deserialize")]
    pub ordered_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub products: Option<String>,
    #[serde(default)]
    pub net_amount: f64,
    #[serde(default)]
    pub discount: f64,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub refund_type: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberRecord {
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default)]
    pub tier: Option<i32>,
}

/// Daily revenue reported by an external feed outside the catering POS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplementRevenue {
    pub date: NaiveDate,
    #[serde(default)]
    pub takeaway: f64,
    #[serde(default)]
    pub group_purchase: f64,
}

/// Every table the engine reads. `None` means the table was not delivered at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceTables {
    #[serde(default)]
    pub space: Option<Vec<SpaceBooking>>,
    #[serde(default)]
    pub catering: Option<Vec<CateringOrder>>,
    #[serde(default)]
    pub members: Option<Vec<MemberRecord>>,
    #[serde(default)]
    pub supplement: Option<Vec<SupplementRevenue>>,
}

/// Unknown members carry this tier in tier summaries.
pub const UNKNOWN_TIER: i32 = -1;

/// Member number to membership tier lookup.
#[derive(Debug, Clone, Default)]
pub struct MemberDirectory {
    tiers: HashMap<MemberId, i32>,
}

impl MemberDirectory {
    pub fn from_records(records: &[MemberRecord]) -> Self {
        let tiers = records
            .iter()
            .filter_map(|r| {
                let id = MemberId::parse(r.member_id.as_deref())?;
                Some((id, r.tier.unwrap_or(UNKNOWN_TIER)))
            })
            .collect();
        Self { tiers }
    }

    pub fn tier_of(&self, member: &MemberId) -> i32 {
        self.tiers.get(member).copied().unwrap_or(UNKNOWN_TIER)
    }

    pub fn members(&self) -> impl Iterator<Item = &MemberId> {
        self.tiers.keys()
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

fn ensure_finite(table: &str, order_id: &str, value: f64) -> InsightsResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(InsightsError::data(
            table,
            format!("non-finite amount {value} on order `{order_id}`"),
        ))
    }
}

/// Space bookings as events. Members whose tier is listed in
/// `excluded_tiers` are dropped entirely.
pub fn space_events(
    bookings: &[SpaceBooking],
    directory: &MemberDirectory,
    excluded_tiers: &[i32],
) -> InsightsResult<EventBatch> {
    if !bookings.is_empty() && bookings.iter().all(|b| b.created_at.is_none()) {
        return Err(InsightsError::data(
            "space",
            "column `created_at` is missing or unparseable in every row",
        ));
    }
    let excluded: HashSet<i32> = excluded_tiers.iter().copied().collect();
    let mut batch = EventBatch::default();
    for booking in bookings {
        ensure_finite("space", &booking.order_id, booking.paid_amount)?;
        let member = booking.identity();
        if let Some(id) = &member {
            if excluded.contains(&directory.tier_of(id)) {
                continue;
            }
        }
        let Some(timestamp) = booking.created_at else {
            batch.skipped_rows += 1;
            continue;
        };
        batch.events.push(Event {
            member,
            timestamp,
            amount: booking.paid_amount,
            order_id: booking.order_id.clone(),
            tags: CategoryTags {
                channel: Channel::Space,
                payment_method: booking.payment_method_1.clone(),
                remark: booking.remark.clone(),
            },
        });
    }
    if batch.skipped_rows > 0 {
        warn!(table = "space", skipped = batch.skipped_rows, "Rows without creation time skipped");
    }
    Ok(batch)
}

pub fn catering_events(orders: &[CateringOrder]) -> InsightsResult<EventBatch> {
    if !orders.is_empty() && orders.iter().all(|o| o.ordered_at.is_none()) {
        return Err(InsightsError::data(
            "catering",
            "column `ordered_at` is missing or unparseable in every row",
        ));
    }
    let mut batch = EventBatch::default();
    for order in orders {
        ensure_finite("catering", &order.order_id, order.net_amount)?;
        let Some(timestamp) = order.ordered_at else {
            batch.skipped_rows += 1;
            continue;
        };
        batch.events.push(Event {
            member: MemberId::parse(order.member_id.as_deref()),
            timestamp,
            amount: order.net_amount,
            order_id: order.order_id.clone(),
            tags: CategoryTags {
                channel: Channel::Catering,
                payment_method: order.payment_method.clone(),
                remark: order.products.clone(),
            },
        });
    }
    if batch.skipped_rows > 0 {
        warn!(table = "catering", skipped = batch.skipped_rows, "Rows without order time skipped");
    }
    Ok(batch)
}

/// Accepts the timestamp spellings the upstream extracts produce; anything
/// unparseable becomes `None`, mirroring a coercing parse.
pub mod datetime_format {
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use serde::{Deserialize, Deserializer};

    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
        "%m/%d/%y %H:%M",
    ];

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .ok()
                    .map(|d| d.and_time(NaiveTime::MIN))
            })
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse))
    }
}

/// Boolean columns arrive either as JSON booleans or as marker strings.
pub mod flag_format {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawFlag {
        Bool(bool),
        Text(String),
        Number(f64),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<RawFlag> = Option::deserialize(deserializer)?;
        Ok(match raw {
            Some(RawFlag::Bool(b)) => b,
            Some(RawFlag::Number(n)) => n != 0.0,
            Some(RawFlag::Text(s)) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "是" | "yes" | "y" | "true" | "1"
            ),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_member_id_rejects_null_spellings() {
        assert_eq!(MemberId::parse(Some(" 1001 ")), Some(MemberId("1001".into())));
        assert_eq!(MemberId::parse(Some("nan")), None);
        assert_eq!(MemberId::parse(Some("")), None);
        assert_eq!(MemberId::parse(None), None);
    }

    #[test]
    fn test_space_identity_falls_back_to_phone() {
        let booking = SpaceBooking {
            member_id: Some("nan".into()),
            phone: Some("13800000000".into()),
            ..Default::default()
        };
        assert_eq!(booking.identity(), Some(MemberId("13800000000".into())));
    }

    #[test]
    fn test_space_events_drop_excluded_tiers_and_skip_missing_times() {
        let directory = MemberDirectory::from_records(&[
            MemberRecord { member_id: Some("staff".into()), tier: Some(0) },
            MemberRecord { member_id: Some("m1".into()), tier: Some(2) },
        ]);
        let bookings = vec![
            SpaceBooking {
                order_id: "a".into(),
                member_id: Some("staff".into()),
                created_at: Some(ts("2024-01-01 10:00:00")),
                paid_amount: 10.0,
                ..Default::default()
            },
            SpaceBooking {
                order_id: "b".into(),
                member_id: Some("m1".into()),
                created_at: Some(ts("2024-01-02 10:00:00")),
                paid_amount: 20.0,
                ..Default::default()
            },
            SpaceBooking {
                order_id: "c".into(),
                member_id: Some("m1".into()),
                created_at: None,
                paid_amount: 5.0,
                ..Default::default()
            },
            SpaceBooking {
                order_id: "d".into(),
                created_at: Some(ts("2024-01-03 10:00:00")),
                paid_amount: 8.0,
                ..Default::default()
            },
        ];
        let batch = space_events(&bookings, &directory, &[0]).unwrap();
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.skipped_rows, 1);
        assert!(batch.events[1].is_guest());
    }

    #[test]
    fn test_missing_timestamp_column_is_data_error() {
        let bookings = vec![SpaceBooking::default(), SpaceBooking::default()];
        let err = space_events(&bookings, &MemberDirectory::default(), &[]).unwrap_err();
        assert_eq!(err.kind(), "data_error");
    }

    #[test]
    fn test_non_finite_amount_is_data_error() {
        let orders = vec![CateringOrder {
            order_id: "x".into(),
            ordered_at: Some(ts("2024-01-01 08:00:00")),
            net_amount: f64::NAN,
            ..Default::default()
        }];
        assert!(catering_events(&orders).is_err());
    }

    #[test]
    fn test_deserialize_upstream_row() {
        let json = r#"{
            "order_id": "S-1",
            "member_id": "1001",
            "created_at": "2024-03-01 09:30",
            "booking_start": "bad value",
            "paid_amount": 88.0,
            "upgraded": "是"
        }"#;
        let booking: SpaceBooking = serde_json::from_str(json).unwrap();
        assert_eq!(booking.created_at, Some(ts("2024-03-01 09:30:00")));
        assert_eq!(booking.booking_start, None);
        assert!(booking.upgraded);
    }

    #[test]
    fn test_source_tables_absent_vs_empty() {
        let tables: SourceTables = serde_json::from_str(r#"{"space": []}"#).unwrap();
        assert!(tables.space.is_some());
        assert!(tables.catering.is_none());
    }
}
