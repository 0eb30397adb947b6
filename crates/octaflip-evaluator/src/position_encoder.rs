//! Board → feature-vector encoding.
//!
//! Three one-hot planes of 64 cells each, relative to a perspective player:
//!
//! | Plane | Content                      |
//! |-------|------------------------------|
//! | 0     | perspective player's pieces  |
//! | 1     | opponent's pieces            |
//! | 2     | empty cells                  |
//!
//! Feature index is `plane * 64 + square`, with squares in row-major order.

use octaflip_engine::{Board, Player, Square};

use crate::network::Matrix;

pub const PLANE_COUNT: usize = 3;
pub const FEATURE_COUNT: usize = PLANE_COUNT * Square::COUNT;

pub type FeatureVector = [f32; FEATURE_COUNT];

#[must_use]
pub fn encode(board: &Board, perspective: Player) -> FeatureVector {
    let mut features = [0.0; FEATURE_COUNT];
    encode_into(board, perspective, &mut features);
    features
}

/// Writes the encoding of `board` into `out`, overwriting every element.
pub fn encode_into(board: &Board, perspective: Player, out: &mut [f32]) {
    assert_eq!(out.len(), FEATURE_COUNT);
    let planes = [
        board.pieces(perspective),
        board.pieces(perspective.opponent()),
        board.empty_mask(),
    ];
    for (plane, mask) in out.chunks_exact_mut(Square::COUNT).zip(planes) {
        for (i, cell) in plane.iter_mut().enumerate() {
            *cell = if mask >> i & 1 == 1 { 1.0 } else { 0.0 };
        }
    }
}

/// Encodes many positions into one `batch × FEATURE_COUNT` matrix.
#[must_use]
pub fn encode_batch<'a, I>(positions: I) -> Matrix
where
    I: IntoIterator<Item = (&'a Board, Player)>,
{
    let positions = positions.into_iter();
    let mut data = Vec::with_capacity(positions.size_hint().0 * FEATURE_COUNT);
    let mut rows = 0;
    for (board, perspective) in positions {
        let start = data.len();
        data.resize(start + FEATURE_COUNT, 0.0);
        encode_into(board, perspective, &mut data[start..]);
        rows += 1;
    }
    Matrix::from_vec(rows, FEATURE_COUNT, data).expect("data length matches rows × features")
}
