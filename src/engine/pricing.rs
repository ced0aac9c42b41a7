use crate::ortb::NEGATIVE_BIDFLOOR;

/// Price the exchange answers the SPP with, after taking its margin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearedPrice {
    pub price: f64,
    /// Margin actually applied; lower than the configured rate when the
    /// full rate would have pushed the price under the floor.
    pub margin: f64,
}

/// Applies the floor and margin constraints to a DSP price.
///
/// A DSP price under the floor has no clearing price. When the configured
/// margin would push the effective price under the floor, the margin is
/// reduced to the largest rate that still clears: `1 - floor/price`,
/// clamped to `[0, margin]`.
pub fn clear_price(dsp_price: f64, bidfloor: f64, margin: f64) -> Option<ClearedPrice> {
    let floor = if bidfloor == NEGATIVE_BIDFLOOR {
        0.0
    } else {
        bidfloor
    };

    if dsp_price < floor {
        return None;
    }

    let effective = dsp_price - dsp_price * margin;
    if effective >= floor {
        return Some(ClearedPrice {
            price: effective,
            margin,
        });
    }

    if dsp_price <= 0.0 {
        return None;
    }

    // Largest rate that still clears. The DSP price is at or above the
    // floor here, so the reduced price is mathematically >= floor; the
    // max() guards against rounding landing it a ulp under.
    let reduced = (1.0 - floor / dsp_price).clamp(0.0, margin);
    let effective = (dsp_price - dsp_price * reduced).max(floor);

    Some(ClearedPrice {
        price: effective,
        margin: reduced,
    })
}
