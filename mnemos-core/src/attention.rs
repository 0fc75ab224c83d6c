//! Economic Attention Networks (ECAN): attention scoring for memory items.
//!
//! Every memory item carries two importance values:
//!
//! - **STI** (short-term importance) pays a fixed *rent* every tick and is
//!   topped up on access. Items at or above [`ATTENTION_THRESHOLD`] form the
//!   working set; items whose STI has run down to [`FORGET_THRESHOLD`] are
//!   candidates for forgetting.
//! - **LTI** (long-term importance) pays no rent and grows slowly with access
//!   and co-access, marking items that keep coming back.
//!
//! All functions here are pure and total: inputs are clamped into range,
//! never rejected.
//!
//! Reference: Goertzel et al. (2008). "Economic Attention Networks."

use serde::{Deserialize, Serialize};

/// STI given to a freshly created item.
pub const STARTING_STI: f64 = 100.0;
/// LTI given to a freshly created item.
pub const STARTING_LTI: f64 = 50.0;
/// Upper bound on STI.
pub const MAX_STI: f64 = 200.0;
/// Upper bound on LTI.
pub const MAX_LTI: f64 = 200.0;
/// STI deducted per tick.
pub const RENT_RATE: f64 = 0.5;
/// Items with STI at or below this are forgettable.
pub const FORGET_THRESHOLD: f64 = 0.0;
/// Items with STI at or above this are in the working set.
pub const ATTENTION_THRESHOLD: f64 = 80.0;
/// STI added on access.
pub const ACCESS_BOOST_STI: f64 = 20.0;
/// LTI added on access and on co-access.
pub const ACCESS_BOOST_LTI: f64 = 2.0;

/// An (STI, LTI) pair, always within `[0, MAX_STI] × [0, MAX_LTI]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAttention")]
pub struct AttentionValue {
    /// Short-term importance.
    #[serde(rename = "STI")]
    sti: f64,
    /// Long-term importance.
    #[serde(rename = "LTI")]
    lti: f64,
}

/// Wire form of [`AttentionValue`]; loaded values are clamped on the way in.
#[derive(Deserialize)]
struct RawAttention {
    #[serde(rename = "STI")]
    sti: f64,
    #[serde(rename = "LTI")]
    lti: f64,
}

impl From<RawAttention> for AttentionValue {
    fn from(raw: RawAttention) -> Self {
        Self::new(raw.sti, raw.lti)
    }
}

fn clamp(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max)
    }
}

impl AttentionValue {
    /// Build a value, clamping both components into range.
    #[must_use]
    pub fn new(sti: f64, lti: f64) -> Self {
        Self {
            sti: clamp(sti, MAX_STI),
            lti: clamp(lti, MAX_LTI),
        }
    }

    /// Short-term importance.
    #[must_use]
    pub fn sti(self) -> f64 {
        self.sti
    }

    /// Long-term importance.
    #[must_use]
    pub fn lti(self) -> f64 {
        self.lti
    }

    /// Replace STI (clamped).
    #[must_use]
    pub fn with_sti(self, sti: f64) -> Self {
        Self::new(sti, self.lti)
    }

    /// Replace LTI (clamped).
    #[must_use]
    pub fn with_lti(self, lti: f64) -> Self {
        Self::new(self.sti, lti)
    }
}

impl Default for AttentionValue {
    fn default() -> Self {
        initialize(None, None)
    }
}

/// Anything that carries attention values.
pub trait Attentive {
    /// Current attention values.
    fn attention(&self) -> AttentionValue;

    /// Overwrite the attention values.
    fn set_attention(&mut self, value: AttentionValue);
}

impl Attentive for AttentionValue {
    fn attention(&self) -> AttentionValue {
        *self
    }

    fn set_attention(&mut self, value: AttentionValue) {
        *self = value;
    }
}

/// Attention values for a new item. Missing components take the starting
/// constants.
#[must_use]
pub fn initialize(base_sti: Option<f64>, base_lti: Option<f64>) -> AttentionValue {
    AttentionValue::new(
        base_sti.unwrap_or(STARTING_STI),
        base_lti.unwrap_or(STARTING_LTI),
    )
}

/// Charge one tick of rent: `STI' = max(0, STI - RENT_RATE)`. LTI is untouched.
#[must_use]
pub fn apply_rent<T: Attentive>(mut item: T) -> T {
    let av = item.attention();
    item.set_attention(av.with_sti(av.sti - RENT_RATE));
    item
}

/// Reward an access: STI and LTI both grow, capped at their maxima.
#[must_use]
pub fn boost_attention<T: Attentive>(mut item: T) -> T {
    let av = item.attention();
    item.set_attention(AttentionValue::new(
        av.sti + ACCESS_BOOST_STI,
        av.lti + ACCESS_BOOST_LTI,
    ));
    item
}

/// Whether the item has run out of short-term importance.
///
/// Advisory only; nothing is deleted here.
#[must_use]
pub fn should_forget<T: Attentive + ?Sized>(item: &T) -> bool {
    item.attention().sti <= FORGET_THRESHOLD
}

/// Whether the item is part of the active working set.
#[must_use]
pub fn in_working_set<T: Attentive + ?Sized>(item: &T) -> bool {
    item.attention().sti >= ATTENTION_THRESHOLD
}

/// Reinforce two items that were used together: both gain LTI.
#[must_use]
pub fn hebbian_boost<A: Attentive, B: Attentive>(mut a: A, mut b: B) -> (A, B) {
    let av = a.attention();
    a.set_attention(av.with_lti(av.lti + ACCESS_BOOST_LTI));
    let bv = b.attention();
    b.set_attention(bv.with_lti(bv.lti + ACCESS_BOOST_LTI));
    (a, b)
}
