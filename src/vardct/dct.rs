//! 8x8 inverse DCT and coefficient scan order.

use std::f32::consts::PI;

pub const BLOCK_DIM: usize = 8;
pub const BLOCK_SIZE: usize = BLOCK_DIM * BLOCK_DIM;

/// Zigzag scan: `ZIGZAG_ORDER[i]` is the natural position of the i-th coefficient.
pub const ZIGZAG_ORDER: [usize; BLOCK_SIZE] = [
    0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

fn cos_table() -> [[f32; BLOCK_DIM]; BLOCK_DIM] {
    let mut t = [[0.0f32; BLOCK_DIM]; BLOCK_DIM];
    for (x, row) in t.iter_mut().enumerate() {
        for (u, v) in row.iter_mut().enumerate() {
            let cu = if u == 0 { 1.0 / 2.0f32.sqrt() } else { 1.0 };
            *v = 0.5 * cu * ((((2 * x + 1) * u) as f32 * PI) / 16.0).cos();
        }
    }
    t
}

/// Separable form of the baseline JPEG IDCT. Input and output are row-major
/// with the vertical frequency first. A DC-only block of value `D` yields `D / 8`.
pub fn idct_8x8(input: &[f32; BLOCK_SIZE], output: &mut [f32; BLOCK_SIZE]) {
    let t = cos_table();
    let mut tmp = [0.0f32; BLOCK_SIZE];
    for u in 0..BLOCK_DIM {
        for y in 0..BLOCK_DIM {
            let mut sum = 0.0f32;
            for v in 0..BLOCK_DIM {
                sum += t[y][v] * input[u * BLOCK_DIM + v];
            }
            tmp[u * BLOCK_DIM + y] = sum;
        }
    }
    for x in 0..BLOCK_DIM {
        for y in 0..BLOCK_DIM {
            let mut sum = 0.0f32;
            for u in 0..BLOCK_DIM {
                sum += t[x][u] * tmp[u * BLOCK_DIM + y];
            }
            output[x * BLOCK_DIM + y] = sum;
        }
    }
}
