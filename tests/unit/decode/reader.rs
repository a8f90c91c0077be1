use super::*;

fn range(a: i64, b: i64) -> FrameRange {
    FrameRange::new(FrameIndex(a), FrameIndex(b)).unwrap()
}

#[test]
fn scanline_decode_produces_only_requested_rows() {
    let r = ProceduralReader::new("grad", range(1, 10), 8, 6);
    let img = r.decode_rows(FrameIndex(2), &[0, 3, 5, 40]).unwrap();
    assert_eq!(img.row_numbers().collect::<Vec<_>>(), vec![0, 3, 5]);
    assert_eq!(img.row(3).unwrap().len(), 8 * 4);
    assert_eq!(r.rows_decoded(), 3);
    assert_eq!(r.frames_decoded(), 1);
}

#[test]
fn whole_frame_decode_filters_down_without_scanlines() {
    let r = ProceduralReader::new("grad", range(1, 10), 4, 4).with_scanlines(false);
    assert!(!r.supports_scanlines());
    let img = r.decode_rows(FrameIndex(1), &[1, 2]).unwrap();
    assert_eq!(img.row_count(), 2);
    assert_eq!(r.rows_decoded(), 4);
}

#[test]
fn frames_outside_range_fail() {
    let r = ProceduralReader::new("grad", range(1, 3), 4, 4);
    assert!(matches!(
        r.info(FrameIndex(9)),
        Err(PlayheadError::Decode(_))
    ));
    assert!(r.decode_frame(FrameIndex(0)).is_err());
}

#[test]
fn pixels_vary_with_position_and_frame() {
    let r = ProceduralReader::new("grad", range(0, 9), 10, 10);
    let img = r.decode_frame(FrameIndex(5)).unwrap();
    let row = img.row(4).unwrap();
    assert_eq!(&row[8..12], &r.pixel(FrameIndex(5), 2, 4));
    assert_ne!(r.pixel(FrameIndex(0), 2, 4), r.pixel(FrameIndex(5), 2, 4));
}

#[test]
fn merge_unions_rows() {
    let r = ProceduralReader::new("grad", range(0, 0), 4, 8);
    let mut a = r.decode_rows(FrameIndex(0), &[0, 1]).unwrap();
    let b = r.decode_rows(FrameIndex(0), &[1, 6]).unwrap();
    a.merge(b);
    assert_eq!(a.row_numbers().collect::<Vec<_>>(), vec![0, 1, 6]);
}
