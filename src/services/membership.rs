//! Membership tiers, payment webhook orders, and the expiry sweep.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};

use crate::constants::membership::{
    BASIC_MIN_AMOUNT, DAYS_PER_MONTH, PRO_MIN_AMOUNT, TIER_BASIC, TIER_FREE, TIER_PRO,
};
use crate::db::{AuditEntry, Store, User};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize)]
pub struct MembershipStatus {
    pub tier: String,
    pub is_active: bool,
    pub expire_at: Option<String>,
    pub days_left: i64,
    /// True when this check performed the lazy downgrade.
    pub expired: bool,
}

/// A paid order delivered by the payment platform webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentOrder {
    pub out_trade_no: String,
    /// Customer reference carrying our user id ("user_123" or "123").
    pub remark: String,
    #[serde(default = "default_months")]
    pub month: i64,
    pub total_amount: String,
    /// 2 = paid.
    pub status: i32,
}

const fn default_months() -> i64 {
    1
}

/// What happened to a webhook order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderOutcome {
    Ok { tier: String, expire_at: String },
    Ignored { message: String },
    Error { message: String },
}

pub struct MembershipService {
    store: Store,
}

impl MembershipService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Current membership state for a user, lazily downgrading an expired
    /// paid tier. Mirrors the sweep so a user never acts on a stale tier
    /// just because the nightly job has not run yet.
    pub async fn status_for(&self, user: &User) -> anyhow::Result<MembershipStatus> {
        if user.membership_expired() {
            self.downgrade(user).await?;
            return Ok(MembershipStatus {
                tier: TIER_FREE.to_string(),
                is_active: false,
                expire_at: user.membership_expire_at.clone(),
                days_left: 0,
                expired: true,
            });
        }

        let days_left = user
            .membership_expire_at
            .as_deref()
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map_or(0, |expiry| {
                (expiry.with_timezone(&Utc) - Utc::now()).num_days()
            });

        Ok(MembershipStatus {
            tier: user.membership_tier.clone(),
            is_active: user.membership_tier != TIER_FREE,
            expire_at: user.membership_expire_at.clone(),
            days_left,
            expired: false,
        })
    }

    /// Apply a paid order to the referenced user. An unexpired membership
    /// is extended; an expired or absent one restarts from now.
    pub async fn apply_order(&self, order: &PaymentOrder) -> anyhow::Result<OrderOutcome> {
        if order.status != 2 {
            return Ok(OrderOutcome::Ignored {
                message: "Order not paid".to_string(),
            });
        }

        let Some(user_id) = parse_user_ref(&order.remark) else {
            warn!("payment order {} carries an unparseable user reference", order.out_trade_no);
            return Ok(OrderOutcome::Error {
                message: "Invalid user id".to_string(),
            });
        };

        let amount: f64 = order.total_amount.parse().unwrap_or(0.0);
        let Some(tier) = tier_for_amount(amount) else {
            return Ok(OrderOutcome::Ignored {
                message: "Amount too low".to_string(),
            });
        };

        let Some(user) = self.store.get_user_by_id(user_id).await? else {
            return Ok(OrderOutcome::Error {
                message: "User not found".to_string(),
            });
        };

        let now = Utc::now();
        let extension = Duration::days(order.month.max(1) * DAYS_PER_MONTH);

        let base = user
            .membership_expire_at
            .as_deref()
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .filter(|expiry| *expiry > now)
            .unwrap_or(now);
        let new_expire = base + extension;

        let started_at = if user.membership_started_at.is_none() {
            Some(now.to_rfc3339())
        } else {
            None
        };

        self.store
            .update_user_membership(user_id, tier, Some(new_expire.to_rfc3339()), started_at)
            .await?;

        self.store
            .log_audit(
                AuditEntry::success("membership_order")
                    .by(user.id, &user.username)
                    .on("USER", Some(user.id), &user.username),
            )
            .await?;

        info!(
            user_id,
            tier,
            expire_at = %new_expire.to_rfc3339(),
            "membership order applied"
        );

        Ok(OrderOutcome::Ok {
            tier: tier.to_string(),
            expire_at: new_expire.to_rfc3339(),
        })
    }

    /// Downgrade every paid user whose expiry has passed. Runs daily from
    /// the scheduler; also safe to run ad hoc.
    pub async fn sweep_expired(&self) -> anyhow::Result<u32> {
        let expired = self.store.find_expired_memberships().await?;
        let mut downgraded = 0u32;

        for user in &expired {
            match self.downgrade(user).await {
                Ok(()) => downgraded += 1,
                Err(e) => warn!(user_id = user.id, "failed to downgrade membership: {e}"),
            }
        }

        if downgraded > 0 {
            info!(downgraded, "membership sweep complete");
        }
        Ok(downgraded)
    }

    async fn downgrade(&self, user: &User) -> anyhow::Result<()> {
        let old_tier = user.membership_tier.clone();
        self.store.downgrade_user_to_free(user.id).await?;
        self.store
            .log_audit(
                AuditEntry::success("membership_expired")
                    .by(user.id, &user.username)
                    .on("USER", Some(user.id), &user.username)
                    .with_details(&format!("downgraded from {old_tier} to {TIER_FREE}")),
            )
            .await?;
        info!(user_id = user.id, %old_tier, "membership expired, downgraded to free");
        Ok(())
    }
}

/// Order amounts select the tier.
#[must_use]
pub fn tier_for_amount(amount: f64) -> Option<&'static str> {
    if amount >= PRO_MIN_AMOUNT {
        Some(TIER_PRO)
    } else if amount >= BASIC_MIN_AMOUNT {
        Some(TIER_BASIC)
    } else {
        None
    }
}

/// "user_123" or a bare "123".
#[must_use]
pub fn parse_user_ref(remark: &str) -> Option<i32> {
    remark
        .trim()
        .strip_prefix("user_")
        .unwrap_or(remark.trim())
        .parse()
        .ok()
}

/// HMAC-SHA256 over the order's fields, sorted by key, keyed by the shared
/// webhook token. Hex-encoded.
#[must_use]
pub fn sign_order(order: &PaymentOrder, token: &str) -> String {
    let mut pairs = vec![
        ("month", order.month.to_string()),
        ("out_trade_no", order.out_trade_no.clone()),
        ("remark", order.remark.clone()),
        ("status", order.status.to_string()),
        ("total_amount", order.total_amount.clone()),
    ];
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let canonical = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    // HMAC accepts any key length.
    let mut mac =
        HmacSha256::new_from_slice(token.as_bytes()).expect("hmac accepts any key size");
    mac.update(canonical.as_bytes());

    mac.finalize()
        .into_bytes()
        .iter()
        .fold(String::with_capacity(64), |mut acc, b| {
            use std::fmt::Write;
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

#[must_use]
pub fn verify_order_signature(order: &PaymentOrder, signature: &str, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    // Hex output, so a plain comparison of equal-length strings suffices
    // after lowering.
    sign_order(order, token) == signature.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> PaymentOrder {
        PaymentOrder {
            out_trade_no: "202608070001".to_string(),
            remark: "user_42".to_string(),
            month: 1,
            total_amount: "19.00".to_string(),
            status: 2,
        }
    }

    #[test]
    fn amounts_map_to_tiers() {
        assert_eq!(tier_for_amount(49.0), Some(TIER_PRO));
        assert_eq!(tier_for_amount(120.0), Some(TIER_PRO));
        assert_eq!(tier_for_amount(19.0), Some(TIER_BASIC));
        assert_eq!(tier_for_amount(5.0), None);
    }

    #[test]
    fn user_refs_parse() {
        assert_eq!(parse_user_ref("user_42"), Some(42));
        assert_eq!(parse_user_ref("42"), Some(42));
        assert_eq!(parse_user_ref(" user_7 "), Some(7));
        assert_eq!(parse_user_ref("user_abc"), None);
        assert_eq!(parse_user_ref(""), None);
    }

    #[test]
    fn signature_round_trip() {
        let o = order();
        let sig = sign_order(&o, "shared-token");
        assert!(verify_order_signature(&o, &sig, "shared-token"));
        assert!(verify_order_signature(&o, &sig.to_uppercase(), "shared-token"));
        assert!(!verify_order_signature(&o, &sig, "other-token"));
        assert!(!verify_order_signature(&o, "deadbeef", "shared-token"));
    }

    #[test]
    fn signature_requires_token() {
        let o = order();
        let sig = sign_order(&o, "");
        assert!(!verify_order_signature(&o, &sig, ""));
    }

    #[test]
    fn tampered_order_fails_signature() {
        let o = order();
        let sig = sign_order(&o, "shared-token");
        let mut tampered = o;
        tampered.total_amount = "49.00".to_string();
        assert!(!verify_order_signature(&tampered, &sig, "shared-token"));
    }
}
