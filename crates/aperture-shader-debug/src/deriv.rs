//! Quad derivative emulation for fragment debugging.
//!
//! A fragment quad is four lanes in a 2x2 pixel block, lane `i` at
//! `(x, y) = (i & 1, i >> 1)`:
//!
//! ```text
//!   lane 0 | lane 1
//!   -------+-------
//!   lane 2 | lane 3
//! ```
//!
//! Derivative instructions difference values across the quad. Coarse
//! derivatives use the top-left pair for every lane; fine derivatives use the
//! pair the lane itself belongs to. Neighbor lanes that were never rendered
//! are reconstructed from the anchor lane's value plus the interpolation
//! deltas the backend captured.

use aperture_spirv::{DerivAxis, DerivPrecision};

use crate::api::DerivativeDeltas;
use crate::value::{NumericValue, VarType};

/// Lanes in a fragment quad.
pub const QUAD_LANES: usize = 4;

/// The (x, y) offset of a quad lane within its 2x2 block.
pub fn quad_position(lane: usize) -> (u32, u32) {
    ((lane & 1) as u32, (lane >> 1) as u32)
}

/// The lane at a given (x, y) offset within the quad.
pub fn quad_lane(x: u32, y: u32) -> usize {
    ((y & 1) << 1 | (x & 1)) as usize
}

fn lane_f64(value: &NumericValue, index: usize) -> f64 {
    match value.ty {
        VarType::Double => f64::from_bits(value.words[index]),
        _ => f32::from_bits(value.words[index] as u32) as f64,
    }
}

fn set_lane_f64(value: &mut NumericValue, index: usize, v: f64) {
    match value.ty {
        VarType::Double => value.words[index] = v.to_bits(),
        _ => value.words[index] = (v as f32).to_bits() as u64,
    }
}

fn component_sub(a: &NumericValue, b: &NumericValue) -> NumericValue {
    let mut out = a.clone();
    for i in 0..out.lane_count() {
        set_lane_f64(&mut out, i, lane_f64(a, i) - lane_f64(b, i));
    }
    out
}

/// The derivative of `values` along `axis` as seen by `lane`.
///
/// `values` holds the operand's value in each quad lane at the point the
/// derivative instruction executes. Plain precision resolves to coarse.
pub fn quad_derivative(
    values: &[NumericValue; QUAD_LANES],
    lane: usize,
    axis: DerivAxis,
    precision: DerivPrecision,
) -> NumericValue {
    let (hi, lo) = match (axis, precision) {
        (DerivAxis::X, DerivPrecision::Fine) => {
            // Horizontal pair containing this lane.
            let base = lane & !1;
            (base + 1, base)
        }
        (DerivAxis::X, _) => (1, 0),
        (DerivAxis::Y, DerivPrecision::Fine) => {
            // Vertical pair containing this lane.
            let base = lane & 1;
            (base + 2, base)
        }
        (DerivAxis::Y, _) => (2, 0),
    };
    component_sub(&values[hi], &values[lo])
}

fn add_delta(value: &mut NumericValue, delta: &[f32; 4], sign: f64) {
    let n = value.lane_count().min(4);
    for i in 0..n {
        let v = lane_f64(value, i) + sign * delta[i] as f64;
        set_lane_f64(value, i, v);
    }
}

/// Rebuilds all four quad lanes of a fragment input from the anchor lane's
/// interpolated value and the backend's captured deltas.
///
/// The top-left lane is recovered first by walking the anchor's own quad
/// offsets back out, then the block is refilled: the top-right lane adds the
/// coarse x delta, the bottom-left the coarse y delta, and the diagonal the
/// coarse x delta plus the fine y delta of the right column.
pub fn reconstruct_quad(
    anchor_lane: usize,
    anchor: &NumericValue,
    deltas: &DerivativeDeltas,
) -> [NumericValue; QUAD_LANES] {
    let mut top_left = anchor.clone();
    let (ax, ay) = quad_position(anchor_lane);
    if ax == 1 {
        add_delta(&mut top_left, &deltas.ddx_coarse, -1.0);
    }
    if ay == 1 {
        let ddy = if ax == 1 {
            &deltas.ddy_fine
        } else {
            &deltas.ddy_coarse
        };
        add_delta(&mut top_left, ddy, -1.0);
    }

    let mut lanes = [
        top_left.clone(),
        top_left.clone(),
        top_left.clone(),
        top_left,
    ];
    add_delta(&mut lanes[1], &deltas.ddx_coarse, 1.0);
    add_delta(&mut lanes[2], &deltas.ddy_coarse, 1.0);
    add_delta(&mut lanes[3], &deltas.ddx_coarse, 1.0);
    add_delta(&mut lanes[3], &deltas.ddy_fine, 1.0);
    lanes[anchor_lane] = anchor.clone();
    lanes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scalar(v: f32) -> NumericValue {
        NumericValue::scalar_f32(v)
    }

    fn quad(v: [f32; 4]) -> [NumericValue; QUAD_LANES] {
        [scalar(v[0]), scalar(v[1]), scalar(v[2]), scalar(v[3])]
    }

    #[test]
    fn quad_positions_round_trip() {
        for lane in 0..QUAD_LANES {
            let (x, y) = quad_position(lane);
            assert_eq!(quad_lane(x, y), lane);
        }
    }

    #[test]
    fn coarse_uses_top_left_pair_everywhere() {
        let values = quad([1.0, 3.0, 7.0, 20.0]);
        for lane in 0..QUAD_LANES {
            let dx = quad_derivative(&values, lane, DerivAxis::X, DerivPrecision::Coarse);
            assert_eq!(dx.as_f32(0, 0), 2.0);
            let dy = quad_derivative(&values, lane, DerivAxis::Y, DerivPrecision::Coarse);
            assert_eq!(dy.as_f32(0, 0), 6.0);
        }
    }

    #[test]
    fn fine_uses_own_pair() {
        let values = quad([1.0, 3.0, 7.0, 20.0]);
        let dx0 = quad_derivative(&values, 0, DerivAxis::X, DerivPrecision::Fine);
        let dx3 = quad_derivative(&values, 3, DerivAxis::X, DerivPrecision::Fine);
        assert_eq!(dx0.as_f32(0, 0), 2.0);
        assert_eq!(dx3.as_f32(0, 0), 13.0);

        let dy1 = quad_derivative(&values, 1, DerivAxis::Y, DerivPrecision::Fine);
        assert_eq!(dy1.as_f32(0, 0), 17.0);
    }

    #[test]
    fn reconstruction_from_top_left_anchor() {
        let deltas = DerivativeDeltas {
            ddx_coarse: [2.0, 0.0, 0.0, 0.0],
            ddy_coarse: [6.0, 0.0, 0.0, 0.0],
            ddx_fine: [2.0, 0.0, 0.0, 0.0],
            ddy_fine: [17.0, 0.0, 0.0, 0.0],
        };
        let lanes = reconstruct_quad(0, &scalar(1.0), &deltas);
        assert_eq!(lanes[0].as_f32(0, 0), 1.0);
        assert_eq!(lanes[1].as_f32(0, 0), 3.0);
        assert_eq!(lanes[2].as_f32(0, 0), 7.0);
        assert_eq!(lanes[3].as_f32(0, 0), 20.0);
    }

    #[test]
    fn reconstruction_keeps_anchor_exact() {
        let deltas = DerivativeDeltas {
            ddx_coarse: [0.5, 0.0, 0.0, 0.0],
            ddy_coarse: [0.25, 0.0, 0.0, 0.0],
            ddx_fine: [0.5, 0.0, 0.0, 0.0],
            ddy_fine: [0.25, 0.0, 0.0, 0.0],
        };
        let lanes = reconstruct_quad(3, &scalar(4.0), &deltas);
        assert_eq!(lanes[3].as_f32(0, 0), 4.0);
        // Walking back out and forward again lands on the same value.
        assert_eq!(lanes[0].as_f32(0, 0) + 0.5 + 0.25, 4.0);
    }
}
