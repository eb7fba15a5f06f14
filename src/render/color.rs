//! Conversions from the frame's internal color space to RGB.

use crate::image::Plane;

/// Bias of the opsin absorbance model.
pub const OPSIN_BIAS: f32 = 0.0037930732552754493;

/// Inverse of the opsin absorbance matrix, row-major.
pub const OPSIN_INVERSE_MATRIX: [[f32; 3]; 3] = [
    [11.031566901960783, -9.866943921568629, -0.16462299647058826],
    [-3.254147380392157, 4.418770392156863, -0.16462299647058826],
    [-3.6588512862745097, 2.7129230470588235, 1.9459282392156863],
];

/// Channels in `(Cb, Y, Cr)` order, all centered at zero, become `(R, G, B)`.
pub fn ycbcr_to_rgb(planes: &mut [Plane<f32>]) {
    let [cb_plane, y_plane, cr_plane] = planes else {
        return;
    };
    for i in 0..y_plane.data().len() {
        let cb = cb_plane.data()[i];
        let y = y_plane.data()[i];
        let cr = cr_plane.data()[i];
        let r = y + 1.402 * cr + 0.5;
        let g = y - 0.344136 * cb - 0.714136 * cr + 0.5;
        let b = y + 1.772 * cb + 0.5;
        cb_plane.data_mut()[i] = r;
        y_plane.data_mut()[i] = g;
        cr_plane.data_mut()[i] = b;
    }
}

/// XYB to linear RGB.
pub fn xyb_to_linear_rgb(planes: &mut [Plane<f32>]) {
    let [x_plane, y_plane, b_plane] = planes else {
        return;
    };
    let bias_cbrt = OPSIN_BIAS.cbrt();
    for i in 0..y_plane.data().len() {
        let x = x_plane.data()[i];
        let y = y_plane.data()[i];
        let b = b_plane.data()[i];
        let gamma = [y + x + bias_cbrt, y - x + bias_cbrt, b + bias_cbrt];
        let mixed = gamma.map(|g| g * g * g - OPSIN_BIAS);
        let m = &OPSIN_INVERSE_MATRIX;
        let rgb: [f32; 3] =
            std::array::from_fn(|r| m[r][0] * mixed[0] + m[r][1] * mixed[1] + m[r][2] * mixed[2]);
        x_plane.data_mut()[i] = rgb[0];
        y_plane.data_mut()[i] = rgb[1];
        b_plane.data_mut()[i] = rgb[2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(planes: &[Plane<f32>]) -> [f32; 3] {
        [planes[0].get(0, 0), planes[1].get(0, 0), planes[2].get(0, 0)]
    }

    #[test]
    fn test_ycbcr_gray_axis() {
        let mut planes = vec![
            Plane::filled(1, 1, 0.0f32),
            Plane::filled(1, 1, 0.25f32),
            Plane::filled(1, 1, 0.0f32),
        ];
        ycbcr_to_rgb(&mut planes);
        assert_eq!(pixel(&planes), [0.75, 0.75, 0.75]);
    }

    #[test]
    fn test_xyb_black_and_gray() {
        let mut black = vec![Plane::new(1, 1); 3];
        xyb_to_linear_rgb(&mut black);
        for v in pixel(&black) {
            assert!(v.abs() < 1e-5);
        }

        // Equal L and M with S matching them is a neutral color.
        let mut gray = vec![
            Plane::filled(1, 1, 0.0f32),
            Plane::filled(1, 1, 0.5f32),
            Plane::filled(1, 1, 0.5f32),
        ];
        xyb_to_linear_rgb(&mut gray);
        let [r, g, b] = pixel(&gray);
        assert!((r - g).abs() < 1e-3 && (g - b).abs() < 1e-3, "{r} {g} {b}");
        assert!(r > 0.0);
    }
}
