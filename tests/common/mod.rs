// Codestream builder shared by the integration tests.
//
// Writes the fields in the order the decoder reads them, with the loop filter
// disabled so decoded samples can be compared exactly.

#![allow(dead_code)]

use jxlexp_rs::bit_reader::{BitReader, BitWriter};
use jxlexp_rs::dimensions::FrameDimensions;
use jxlexp_rs::entropy::{write_signed, write_unsigned};
use jxlexp_rs::frame_header::{
    BLEND_MODE_ENC, DOWNSAMPLE_ENC, FrameEncoding, LAST_PASS_ENC, NUM_DOWNSAMPLE_ENC,
    NUM_PASSES_ENC, Passes, UPSAMPLING_ENC,
};
use jxlexp_rs::image::Rect;
use jxlexp_rs::metadata::{BIT_DEPTH_ENC, CODESTREAM_SIGNATURE, NUM_EXTRA_ENC, SIZE_ENC};
use jxlexp_rs::toc::TOC_ENTRY_ENC;
use jxlexp_rs::vardct::coefficients::ceil_log2_nonzero;
use jxlexp_rs::vardct::quantizer::{GLOBAL_SCALE_ENC, QUANT_DC_ENC};
use jxlexp_rs::{FrameDecoder, SectionInfo};

/// Test image: an 8-bit pattern with enough structure to give every
/// resolution level nonzero residuals.
pub fn sample(x: usize, y: usize) -> i32 {
    ((x * 7 + y * 3 + (x * y) % 17) % 256) as i32
}

/// The sample a modular decoder shows for `(x, y)` when only the levels down
/// to `min_level` have arrived.
pub fn sample_at_level(x: usize, y: usize, min_level: u32) -> i32 {
    let mask = !((1usize << min_level) - 1);
    sample(x & mask, y & mask)
}

pub fn level(x: usize, y: usize) -> i32 {
    ((x | y).trailing_zeros() as i32).min(3)
}

fn parent(x: usize, y: usize, level: i32) -> (usize, usize) {
    let mask = !((1usize << (level + 1)) - 1);
    (x & mask, y & mask)
}

pub fn passes(num_passes: usize, downsample: &[u32], last_pass: &[u32]) -> Passes {
    Passes {
        num_passes,
        shift: vec![0; num_passes],
        downsample: downsample.to_vec(),
        last_pass: last_pass.to_vec(),
    }
}

#[derive(Debug, Clone)]
pub struct FrameParams {
    pub encoding: FrameEncoding,
    pub group_size_shift: u32,
    pub passes: Passes,
    pub is_last: bool,
    pub save_as_reference: usize,
}

impl FrameParams {
    pub fn modular(group_size_shift: u32, passes: Passes) -> Self {
        Self {
            encoding: FrameEncoding::Modular,
            group_size_shift,
            passes,
            is_last: true,
            save_as_reference: 0,
        }
    }

    pub fn vardct() -> Self {
        Self {
            encoding: FrameEncoding::VarDct,
            group_size_shift: 1,
            passes: Passes::default(),
            is_last: true,
            save_as_reference: 0,
        }
    }
}

/// 8-bit image metadata without extra channels or animation.
pub fn metadata_bytes(xsize: usize, ysize: usize, is_gray: bool) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write(16, CODESTREAM_SIGNATURE);
    w.write_u32(&SIZE_ENC, xsize as u32).unwrap();
    w.write_u32(&SIZE_ENC, ysize as u32).unwrap();
    w.write_u32(&BIT_DEPTH_ENC, 8).unwrap();
    w.write_bool(is_gray);
    w.write_bool(false);
    w.write_bool(false);
    w.write_u32(&NUM_EXTRA_ENC, 0).unwrap();
    w.finish()
}

/// A regular frame header with the loop filter off.
pub fn write_frame_header(w: &mut BitWriter, p: &FrameParams) {
    w.write_bool(false);
    w.write(2, 0);
    w.write(1, p.encoding as u32);
    w.write(8, 0);
    // Not YCbCr.
    w.write_bool(false);
    w.write_u32(&UPSAMPLING_ENC, 1).unwrap();
    if p.encoding == FrameEncoding::Modular {
        w.write(2, p.group_size_shift);
    }

    let passes = &p.passes;
    w.write_u32(&NUM_PASSES_ENC, passes.num_passes as u32).unwrap();
    if passes.num_passes > 1 {
        w.write_u32(&NUM_DOWNSAMPLE_ENC, passes.downsample.len() as u32)
            .unwrap();
        for &shift in &passes.shift[..passes.num_passes - 1] {
            w.write(2, shift);
        }
        for &d in &passes.downsample {
            w.write_u32(&DOWNSAMPLE_ENC, d).unwrap();
        }
        for &l in &passes.last_pass {
            w.write_u32(&LAST_PASS_ENC, l).unwrap();
        }
    }

    // No custom size, replace blending.
    w.write_bool(false);
    w.write_u32(&BLEND_MODE_ENC, 0).unwrap();
    w.write_bool(p.is_last);
    if !p.is_last {
        w.write(2, p.save_as_reference as u32);
        // save_before_color_transform
        w.write_bool(false);
    }

    // Loop filter: explicit, no gaborish, no EPF.
    w.write_bool(false);
    w.write_bool(false);
    w.write(2, 0);
}

/// Frame header, TOC and section payloads.
pub fn frame_bytes(p: &FrameParams, sections: &[Vec<u8>]) -> Vec<u8> {
    let mut w = BitWriter::new();
    write_frame_header(&mut w, p);
    for s in sections {
        w.write_u32(&TOC_ENTRY_ENC, s.len() as u32).unwrap();
    }
    w.zero_pad_to_byte();
    for s in sections {
        w.append_bytes(s);
    }
    w.finish()
}

pub fn codestream(xsize: usize, ysize: usize, is_gray: bool, frames: &[Vec<u8>]) -> Vec<u8> {
    let mut out = metadata_bytes(xsize, ysize, is_gray);
    for f in frames {
        out.extend_from_slice(f);
    }
    out
}

/// Readers over every section of the frame whose TOC `br` just finished.
pub fn section_infos<'d>(fd: &FrameDecoder, br: &BitReader<'d>) -> Vec<SectionInfo<'d>> {
    let pos = br.total_bits_consumed() / 8;
    fd.section_offsets()
        .iter()
        .zip(fd.section_sizes())
        .enumerate()
        .map(|(id, (&offset, &size))| {
            SectionInfo::new(id, br.sub_reader(pos + offset as usize, size as usize))
        })
        .collect()
}

/// Picks sections by id, in the given order.
pub fn pick<'d>(all: &[SectionInfo<'d>], ids: &[usize]) -> Vec<SectionInfo<'d>> {
    ids.iter().map(|&id| all[id].clone()).collect()
}

/// Modular DC global of a gray frame: default DC quantization only.
pub fn modular_dc_global(w: &mut BitWriter) {
    w.write_bool(true);
}

/// Level-3 samples of a gray modular DC group covering `rect`.
pub fn modular_dc_group(w: &mut BitWriter, rect: Rect) {
    for y in (0..rect.ysize).step_by(8) {
        for x in (0..rect.xsize).step_by(8) {
            let (ax, ay) = (rect.x0 + x, rect.y0 + y);
            let pred = if x >= 8 {
                sample(ax - 8, ay)
            } else if y >= 8 {
                sample(ax, ay - 8)
            } else {
                0
            };
            write_signed(w, sample(ax, ay) - pred);
        }
    }
}

/// Residuals of levels `max_shift` down to `min_shift` of a gray modular group.
pub fn modular_pass(w: &mut BitWriter, rect: Rect, (min_shift, max_shift): (i32, i32)) {
    if min_shift > max_shift || max_shift >= 3 {
        return;
    }
    for s in (min_shift.max(0)..=max_shift).rev() {
        for y in 0..rect.ysize {
            for x in 0..rect.xsize {
                let (ax, ay) = (rect.x0 + x, rect.y0 + y);
                if level(ax, ay) != s {
                    continue;
                }
                let (px, py) = parent(ax, ay, s);
                write_signed(w, sample(ax, ay) - sample(px, py));
            }
        }
    }
}

pub fn bytes_of(f: impl FnOnce(&mut BitWriter)) -> Vec<u8> {
    let mut w = BitWriter::new();
    f(&mut w);
    w.finish()
}

/// VarDCT DC global with default tables.
pub fn vardct_dc_global() -> Vec<u8> {
    bytes_of(|w| {
        w.write_bool(true);
        w.write_u32(&GLOBAL_SCALE_ENC, 32768).unwrap();
        w.write_u32(&QUANT_DC_ENC, 16).unwrap();
        w.write_bool(true);
        w.write_bool(true);
    })
}

/// A VarDCT DC group whose quantized DC is `dc[c]` everywhere, with DCT8
/// blocks at quant field 1.
pub fn vardct_flat_dc_group(block_rect: Rect, dc: [i32; 3]) -> Vec<u8> {
    bytes_of(|w| {
        for value in dc {
            for i in 0..block_rect.area() {
                write_signed(w, if i == 0 { value } else { 0 });
            }
        }
        for _ in 0..block_rect.area() {
            write_unsigned(w, 0);
            write_unsigned(w, 0);
        }
    })
}

/// VarDCT AC global: library matrices, one histogram, default orders and a
/// 5-bit bound per context.
pub fn vardct_ac_global(num_groups: usize, num_passes: usize) -> Vec<u8> {
    vardct_ac_global_with(num_groups, num_passes, |w| w.write(2, 0))
}

/// Explicit AC matrices: `3 * 64` integer steps in natural order, scaled by
/// `den`.
pub fn raw_quant_matrices(w: &mut BitWriter, den: f32, table: &[u32]) {
    w.write(2, 2);
    w.write(32, den.to_bits());
    for &v in table {
        write_unsigned(w, v);
    }
}

/// VarDCT AC global whose dequantization matrices are written by `matrices`.
pub fn vardct_ac_global_with(
    num_groups: usize,
    num_passes: usize,
    matrices: impl FnOnce(&mut BitWriter),
) -> Vec<u8> {
    bytes_of(|w| {
        matrices(w);
        w.write(ceil_log2_nonzero(num_groups), 0);
        for _ in 0..num_passes {
            w.write_bool(false);
            for _ in 0..3 {
                w.write(5, 8);
            }
        }
    })
}

/// One VarDCT pass in which every block of the group has no coefficients.
pub fn vardct_empty_pass(num_blocks: usize) -> Vec<u8> {
    bytes_of(|w| {
        for _ in 0..num_blocks * 3 {
            write_unsigned(w, 0);
        }
    })
}

/// A color VarDCT codestream with one DC group whose quantized DC is `dc[c]`
/// everywhere, a single pass of empty AC groups and the given AC global.
pub fn vardct_flat_stream(xsize: usize, ysize: usize, dc: [i32; 3], ac_global: Vec<u8>) -> Vec<u8> {
    let dim = FrameDimensions::new(xsize, ysize, 1, 256, true);
    let mut sections = vec![
        vardct_dc_global(),
        vardct_flat_dc_group(dim.dc_group_block_rect(0), dc),
        ac_global,
    ];
    for g in 0..dim.num_groups {
        sections.push(vardct_empty_pass(dim.group_block_rect(g).area()));
    }
    codestream(xsize, ysize, false, &[frame_bytes(&FrameParams::vardct(), &sections)])
}

/// A complete gray modular frame carrying `sample` at `xsize` x `ysize`.
pub fn modular_frame(p: &FrameParams, xsize: usize, ysize: usize) -> Vec<u8> {
    let dim = FrameDimensions::new(xsize, ysize, 1, 128 << p.group_size_shift, false);
    let num_passes = p.passes.num_passes;
    if dim.num_groups == 1 && num_passes == 1 {
        let section = bytes_of(|w| {
            modular_dc_global(w);
            modular_dc_group(w, dim.dc_group_rect(0));
            modular_pass(w, dim.group_rect(0), p.passes.downsampling_bracket(0));
        });
        return frame_bytes(p, &[section]);
    }
    let mut sections = vec![bytes_of(modular_dc_global)];
    for g in 0..dim.num_dc_groups {
        sections.push(bytes_of(|w| modular_dc_group(w, dim.dc_group_rect(g))));
    }
    sections.push(Vec::new());
    for pass in 0..num_passes {
        for g in 0..dim.num_groups {
            let bracket = p.passes.downsampling_bracket(pass);
            sections.push(bytes_of(|w| modular_pass(w, dim.group_rect(g), bracket)));
        }
    }
    frame_bytes(p, &sections)
}
