// Progressive decoding of lossless modular frames built in memory.
//
// Sections are submitted out of order and over several calls; after every
// step the rendered samples are compared with what the arrived resolution
// levels allow.

mod common;

use common::{
    FrameParams, codestream, modular_frame, passes, pick, sample, sample_at_level,
    section_infos,
};
use jxlexp_rs::bit_reader::BitReader;
use jxlexp_rs::image::ImageBundle;
use jxlexp_rs::{
    DecoderState, FrameDecoder, FrameError, ImageMetadata, SectionInfo, SectionStatus,
    ThreadPool,
};

const XSIZE: usize = 256;
const YSIZE: usize = 128;

use SectionStatus::{Done, Duplicate, Partial, Skipped};

/// Two 128x128 groups, one DC group; pass 0 completes 2x, pass 1 full
/// resolution. Sections: 0 DC global, 1 DC group, 2 AC global, 3-4 pass 0,
/// 5-6 pass 1.
fn two_pass_stream() -> Vec<u8> {
    let params = FrameParams::modular(0, passes(2, &[2], &[0]));
    codestream(XSIZE, YSIZE, true, &[modular_frame(&params, XSIZE, YSIZE)])
}

fn open(data: &[u8]) -> (DecoderState, BitReader<'_>) {
    let mut br = BitReader::new(data);
    let metadata = ImageMetadata::read(&mut br).unwrap();
    (DecoderState::new(metadata), br)
}

fn init<'d>(fd: &mut FrameDecoder, br: &mut BitReader<'d>, allow_partial: bool) -> Vec<SectionInfo<'d>> {
    fd.init_frame(br, ImageBundle::new(), false, allow_partial, false, true)
        .unwrap();
    section_infos(fd, br)
}

/// Asserts the rendered gray plane shows every level down to `min_level`.
fn assert_levels(image: &ImageBundle, min_level: u32) {
    assert_eq!((image.xsize, image.ysize), (XSIZE, YSIZE));
    let plane = &image.color[0];
    for y in 0..YSIZE {
        for x in 0..XSIZE {
            let expected = sample_at_level(x, y, min_level) as f32 / 255.0;
            let got = plane.get(x, y);
            assert!(
                (got - expected).abs() < 1e-6,
                "({x}, {y}): got {got}, expected {expected}"
            );
        }
    }
}

#[test]
fn test_reverse_order_over_three_calls() {
    let data = two_pass_stream();
    let (mut state, mut br) = open(&data);
    let pool = ThreadPool::new(2).unwrap();
    let mut fd = FrameDecoder::new(&mut state, &pool);
    let all = init(&mut fd, &mut br, false);
    assert_eq!(all.len(), 7);

    // Nothing these need has arrived yet.
    let status = fd.process_sections(&pick(&all, &[6, 5, 2])).unwrap();
    assert_eq!(status, vec![Skipped, Skipped, Skipped]);
    assert!(!fd.progress().decoded_dc_global);

    let status = fd.process_sections(&pick(&all, &[4, 3, 1, 0, 2])).unwrap();
    assert_eq!(status, vec![Done; 5]);
    assert_eq!(fd.progress().decoded_passes_per_ac_group, vec![1, 1]);
    assert!(!fd.has_everything());

    assert!(fd.flush().unwrap());
    assert_levels(fd.decoded(), 1);

    let status = fd.process_sections(&pick(&all, &[5, 6])).unwrap();
    assert_eq!(status, vec![Done, Done]);
    assert!(fd.has_everything());
    fd.finalize_frame().unwrap();
    assert_levels(fd.decoded(), 0);
}

#[test]
fn test_duplicates_are_reported_and_ignored() {
    let data = two_pass_stream();
    let (mut state, mut br) = open(&data);
    let pool = ThreadPool::sequential();
    let mut fd = FrameDecoder::new(&mut state, &pool);
    let all = init(&mut fd, &mut br, false);

    let status = fd.process_sections(&pick(&all, &[0, 0, 1])).unwrap();
    assert_eq!(status, vec![Done, Duplicate, Done]);
    let status = fd.process_sections(&pick(&all, &[1, 2, 3, 4])).unwrap();
    assert_eq!(status, vec![Duplicate, Done, Done, Done]);
    assert_eq!(fd.progress().decoded_passes_per_ac_group, vec![1, 1]);

    let status = fd.process_sections(&pick(&all, &[5, 6, 3])).unwrap();
    assert_eq!(status, vec![Done, Done, Duplicate]);
    fd.finalize_frame().unwrap();
    assert_levels(fd.decoded(), 0);
}

#[test]
fn test_pass_gap_waits_for_the_missing_pass() {
    let data = two_pass_stream();
    let (mut state, mut br) = open(&data);
    let pool = ThreadPool::sequential();
    let mut fd = FrameDecoder::new(&mut state, &pool);
    let all = init(&mut fd, &mut br, false);

    // Group 1 gets pass 1 without pass 0.
    let status = fd.process_sections(&pick(&all, &[0, 1, 2, 3, 5, 6])).unwrap();
    assert_eq!(status, vec![Done, Done, Done, Done, Done, Skipped]);
    assert_eq!(fd.progress().decoded_passes_per_ac_group, vec![2, 0]);

    let status = fd.process_sections(&pick(&all, &[6, 4])).unwrap();
    assert_eq!(status, vec![Done, Done]);
    assert_eq!(fd.progress().decoded_passes_per_ac_group, vec![2, 2]);
    fd.finalize_frame().unwrap();
    assert_levels(fd.decoded(), 0);
}

#[test]
fn test_truncated_dc_global_rolls_back() {
    let data = two_pass_stream();
    let (mut state, mut br) = open(&data);
    let pool = ThreadPool::sequential();
    let mut fd = FrameDecoder::new(&mut state, &pool);
    let all = init(&mut fd, &mut br, true);

    let mut first = all.clone();
    first[0] = SectionInfo::new(0, BitReader::new(&[]));
    let status = fd.process_sections(&first).unwrap();
    assert_eq!(status[0], Partial);
    assert!(status[1..].iter().all(|&s| s == Skipped));
    assert!(!fd.progress().decoded_dc_global);
    assert_eq!(fd.progress().num_sections_done, 0);

    let status = fd.process_sections(&all).unwrap();
    assert_eq!(status, vec![Done; 7]);
    fd.finalize_frame().unwrap();
    assert_levels(fd.decoded(), 0);
}

#[test]
fn test_corrupt_dc_global_is_fatal() {
    let data = two_pass_stream();
    let (mut state, mut br) = open(&data);
    let pool = ThreadPool::sequential();
    let mut fd = FrameDecoder::new(&mut state, &pool);
    let all = init(&mut fd, &mut br, true);

    // Explicit DC quantization with a zero step, sent with every other section.
    let bad = [0u8; 4];
    let mut batch = all.clone();
    batch[0] = SectionInfo::new(0, BitReader::new(&bad));
    assert_eq!(
        fd.process_sections(&batch),
        Err(FrameError::InvalidQuantTable)
    );
    let progress = fd.progress();
    assert!(!progress.decoded_dc_global);
    assert_eq!(progress.decoded_dc_groups, vec![false]);
    assert!(!progress.decoded_ac_global);
    assert_eq!(progress.decoded_passes_per_ac_group, vec![0, 0]);
}

#[test]
fn test_truncated_dc_global_without_permission_fails() {
    let data = two_pass_stream();
    let (mut state, mut br) = open(&data);
    let pool = ThreadPool::sequential();
    let mut fd = FrameDecoder::new(&mut state, &pool);
    init(&mut fd, &mut br, false);

    let sections = [SectionInfo::new(0, BitReader::new(&[]))];
    assert_eq!(fd.process_sections(&sections), Err(FrameError::NeedMoreData));
    assert!(!fd.progress().decoded_dc_global);
}

#[test]
fn test_empty_dc_global_uses_defaults_with_dc_permission() {
    let data = two_pass_stream();
    let (mut state, mut br) = open(&data);
    let pool = ThreadPool::sequential();
    let mut fd = FrameDecoder::new(&mut state, &pool);
    fd.init_frame(&mut br, ImageBundle::new(), false, false, true, true)
        .unwrap();
    let all = section_infos(&fd, &br);

    // The coded DC global only selects the default tables, so an empty one
    // decodes to the same state.
    let empty = [SectionInfo::new(0, BitReader::new(&[]))];
    assert_eq!(fd.process_sections(&empty).unwrap(), vec![Done]);
    assert!(fd.progress().decoded_dc_global);
    assert_eq!(fd.process_sections(&all[1..]).unwrap(), vec![Done; 6]);
    fd.finalize_frame().unwrap();
    assert_levels(fd.decoded(), 0);
}

#[test]
fn test_max_passes_caps_the_frame() {
    let data = two_pass_stream();
    let (mut state, mut br) = open(&data);
    let pool = ThreadPool::sequential();
    let mut fd = FrameDecoder::new(&mut state, &pool);
    let all = init(&mut fd, &mut br, false);
    fd.set_max_passes(1);

    let status = fd.process_sections(&all).unwrap();
    assert_eq!(status, vec![Done, Done, Done, Done, Done, Skipped, Skipped]);
    assert!(fd.has_everything());
    fd.finalize_frame().unwrap();
    assert_levels(fd.decoded(), 1);
}

#[test]
fn test_invalid_ids_and_lifecycle_errors() {
    let data = two_pass_stream();
    let (mut state, mut br) = open(&data);
    let pool = ThreadPool::sequential();
    let mut fd = FrameDecoder::new(&mut state, &pool);
    let all = init(&mut fd, &mut br, false);

    let bogus = [SectionInfo::new(7, BitReader::new(&[]))];
    assert_eq!(fd.process_sections(&bogus), Err(FrameError::InvalidSection));
    assert_eq!(fd.process_sections(&[]), Ok(Vec::new()));

    fd.process_sections(&pick(&all, &[0, 1, 2])).unwrap();
    assert_eq!(fd.finalize_frame(), Err(FrameError::NotFullyDecoded));
    assert_eq!(fd.finalize_frame(), Err(FrameError::FinalizedTwice));
    assert_eq!(
        fd.process_sections(&pick(&all, &[3])),
        Err(FrameError::InvalidOperation)
    );
}

#[test]
fn test_finalize_twice() {
    let data = two_pass_stream();
    let (mut state, mut br) = open(&data);
    let pool = ThreadPool::sequential();
    let mut fd = FrameDecoder::new(&mut state, &pool);
    let all = init(&mut fd, &mut br, false);
    assert_eq!(fd.process_sections(&all).unwrap(), vec![Done; 7]);
    fd.finalize_frame().unwrap();
    assert!(fd.is_finalized());
    assert_eq!(fd.finalize_frame(), Err(FrameError::FinalizedTwice));
}

#[test]
fn test_partial_frame_finalizes_with_placeholders() {
    let data = two_pass_stream();
    let (mut state, mut br) = open(&data);
    let pool = ThreadPool::sequential();
    let mut fd = FrameDecoder::new(&mut state, &pool);
    let all = init(&mut fd, &mut br, true);

    fd.process_sections(&pick(&all, &[0, 1, 2, 3, 4])).unwrap();
    fd.finalize_frame().unwrap();
    assert_levels(fd.decoded(), 1);
}

#[test]
fn test_single_section_matches_general_layout() {
    const SIDE: usize = 128;
    let single = FrameParams::modular(0, passes(1, &[], &[]));
    let data = codestream(SIDE, SIDE, true, &[modular_frame(&single, SIDE, SIDE)]);
    // Two passes without a downsampling schedule: pass 0 carries nothing.
    let general = FrameParams::modular(0, passes(2, &[], &[]));
    let general_data = codestream(SIDE, SIDE, true, &[modular_frame(&general, SIDE, SIDE)]);

    let pool = ThreadPool::sequential();
    let decode = |data: &[u8], expected_sections: usize| {
        let (mut state, mut br) = open(data);
        let mut fd = FrameDecoder::new(&mut state, &pool);
        let all = init(&mut fd, &mut br, false);
        assert_eq!(all.len(), expected_sections);
        assert_eq!(fd.process_sections(&all).unwrap(), vec![Done; expected_sections]);
        fd.finalize_frame().unwrap();
        fd.take_decoded()
    };
    let a = decode(&data, 1);
    let b = decode(&general_data, 5);
    assert_eq!(a.color, b.color);
    for (x, y) in [(0, 0), (1, 0), (77, 93), (127, 127)] {
        assert_eq!(a.color[0].get(x, y), sample(x, y) as f32 / 255.0);
    }
}

#[test]
fn test_single_section_resumes_after_truncation() {
    const SIDE: usize = 128;
    let params = FrameParams::modular(0, passes(1, &[], &[]));
    let data = codestream(SIDE, SIDE, true, &[modular_frame(&params, SIDE, SIDE)]);
    let (mut state, mut br) = open(&data);
    let pool = ThreadPool::sequential();
    let mut fd = FrameDecoder::new(&mut state, &pool);
    let all = init(&mut fd, &mut br, true);
    assert_eq!(all.len(), 1);

    let full = all[0].br.data();
    let head = [SectionInfo::new(0, BitReader::new(&full[..full.len() / 2]))];
    assert_eq!(fd.process_sections(&head).unwrap(), vec![Partial]);
    assert!(fd.progress().decoded_dc_global);
    assert!(fd.progress().decoded_dc_groups[0]);
    assert!(fd.progress().decoded_ac_global);
    assert_eq!(fd.progress().decoded_passes_per_ac_group, vec![0]);

    assert_eq!(fd.process_sections(&all).unwrap(), vec![Done]);
    assert_eq!(fd.process_sections(&all).unwrap(), vec![Duplicate]);
    fd.finalize_frame().unwrap();
    let image = fd.decoded();
    for (x, y) in [(0, 0), (3, 5), (64, 1), (127, 126)] {
        assert_eq!(image.color[0].get(x, y), sample(x, y) as f32 / 255.0);
    }
}

#[test]
fn test_single_section_rejects_other_ids() {
    const SIDE: usize = 64;
    let params = FrameParams::modular(0, passes(1, &[], &[]));
    let data = codestream(SIDE, SIDE, true, &[modular_frame(&params, SIDE, SIDE)]);
    let (mut state, mut br) = open(&data);
    let pool = ThreadPool::sequential();
    let mut fd = FrameDecoder::new(&mut state, &pool);
    let all = init(&mut fd, &mut br, false);
    let twice = [all[0].clone(), all[0].clone()];
    assert_eq!(fd.process_sections(&twice), Err(FrameError::InvalidSection));
    let other = [SectionInfo::new(1, BitReader::new(&[]))];
    assert_eq!(fd.process_sections(&other), Err(FrameError::InvalidSection));
}
