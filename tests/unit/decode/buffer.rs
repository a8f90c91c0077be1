use super::*;
use crate::decode::reader::ProceduralReader;
use crate::foundation::core::FrameRange;

fn reader(scanlines: bool) -> Arc<ProceduralReader> {
    Arc::new(
        ProceduralReader::new(
            "grad",
            FrameRange::new(FrameIndex(1), FrameIndex(20)).unwrap(),
            8,
            16,
        )
        .with_scanlines(scanlines),
    )
}

#[test]
fn scanline_context_difference_and_union() {
    let mut ctx = ScanLineContext::new([1, 2, 3]);
    assert_eq!(ctx.missing(&[3, 4, 4, 5, 2]), vec![4, 5]);
    ctx.merge([3, 4, 5]);
    assert_eq!(ctx.rows().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    assert_eq!(ctx.len(), 5);
    assert!(ctx.contains(4));
}

#[test]
fn incremental_decode_only_fetches_new_rows() {
    let src = reader(true);
    let mut buf = DecodeBuffer::new(src.clone(), 4);
    buf.request(FrameIndex(1), Some(&[0, 1, 2, 3]), DecodeSync::Sync)
        .unwrap();
    assert_eq!(src.rows_decoded(), 4);

    buf.request(FrameIndex(1), Some(&[2, 3, 4, 5]), DecodeSync::Sync)
        .unwrap();
    assert_eq!(src.rows_decoded(), 6);
    assert_eq!(buf.stats().rows_reused, 2);

    let desc = buf.find_scanlines(FrameIndex(1)).unwrap();
    assert_eq!(
        desc.scanlines().unwrap().rows().collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4, 5]
    );
    let img = buf.image(FrameIndex(1)).unwrap().unwrap();
    assert_eq!(img.row_count(), 6);

    buf.request(FrameIndex(1), Some(&[1, 5]), DecodeSync::Sync)
        .unwrap();
    assert_eq!(src.rows_decoded(), 6);
    assert_eq!(buf.len(), 1);
}

#[test]
fn async_requests_are_joined_on_access() {
    let src = reader(true);
    let mut buf = DecodeBuffer::new(src.clone(), 4);
    buf.request(FrameIndex(3), Some(&[7, 8]), DecodeSync::Async)
        .unwrap();
    assert!(buf.find_scanlines(FrameIndex(3)).unwrap().is_pending());

    let img = buf.image(FrameIndex(3)).unwrap().unwrap();
    assert_eq!(img.row_numbers().collect::<Vec<_>>(), vec![7, 8]);
    assert!(!buf.find_scanlines(FrameIndex(3)).unwrap().is_pending());
    assert_eq!(buf.stats().async_decodes, 1);
}

#[test]
fn whole_frame_readers_ignore_row_lists() {
    let src = reader(false);
    let mut buf = DecodeBuffer::new(src.clone(), 4);
    buf.request(FrameIndex(2), Some(&[0]), DecodeSync::Sync)
        .unwrap();
    buf.request(FrameIndex(2), Some(&[1]), DecodeSync::Sync)
        .unwrap();
    assert_eq!(src.frames_decoded(), 1);
    assert!(buf.find_whole(FrameIndex(2)).is_some());
    assert!(buf.find_scanlines(FrameIndex(2)).is_none());
    assert_eq!(buf.image(FrameIndex(2)).unwrap().unwrap().row_count(), 16);
}

#[test]
fn lookup_modes_are_disjoint() {
    let src = reader(true);
    let mut buf = DecodeBuffer::new(src.clone(), 4);
    let info = src.info(FrameIndex(4)).unwrap();
    buf.register_cached(FrameIndex(4), info);
    assert!(buf.find_cached(FrameIndex(4)).is_some());
    assert!(buf.find_scanlines(FrameIndex(4)).is_none());
    assert!(buf.find_whole(FrameIndex(4)).is_none());
    assert!(buf.image(FrameIndex(4)).unwrap().is_none());
    assert_eq!(buf.header(FrameIndex(4)).unwrap(), info);
}

#[test]
fn eviction_prefers_oldest_completed_fresh_decode() {
    let src = reader(true);
    let mut buf = DecodeBuffer::new(src.clone(), 3);
    let info = src.info(FrameIndex(1)).unwrap();
    buf.register_cached(FrameIndex(1), info);
    buf.request(FrameIndex(2), Some(&[0]), DecodeSync::Sync)
        .unwrap();
    buf.request(FrameIndex(3), Some(&[0]), DecodeSync::Sync)
        .unwrap();
    buf.request(FrameIndex(4), Some(&[0]), DecodeSync::Sync)
        .unwrap();

    assert_eq!(buf.len(), 3);
    assert!(buf.find_cached(FrameIndex(1)).is_some());
    assert!(buf.find_scanlines(FrameIndex(2)).is_none());
    assert!(buf.find_scanlines(FrameIndex(4)).is_some());
    assert_eq!(buf.stats().evictions, 1);
}

#[test]
fn all_pending_blocks_on_oldest() {
    let src = reader(true);
    let mut buf = DecodeBuffer::new(src.clone(), 2);
    buf.request(FrameIndex(1), Some(&[0]), DecodeSync::Async)
        .unwrap();
    buf.request(FrameIndex(2), Some(&[0]), DecodeSync::Async)
        .unwrap();
    buf.request(FrameIndex(3), Some(&[0]), DecodeSync::Sync)
        .unwrap();
    assert!(buf.find_scanlines(FrameIndex(1)).is_none());
    assert!(buf.find_scanlines(FrameIndex(3)).is_some());
    assert_eq!(buf.len(), 2);
}

#[test]
fn prefetch_skips_buffered_and_out_of_range_frames() {
    let src = reader(true);
    let mut buf = DecodeBuffer::new(src.clone(), 4);
    buf.prefetch(FrameIndex(21), Some(&[0])).unwrap();
    assert!(buf.is_empty());
    buf.prefetch(FrameIndex(5), Some(&[0, 1])).unwrap();
    buf.prefetch(FrameIndex(5), Some(&[0, 1])).unwrap();
    assert_eq!(buf.stats().async_decodes, 1);
    buf.request(FrameIndex(5), Some(&[0, 1]), DecodeSync::Sync)
        .unwrap();
    assert_eq!(src.rows_decoded(), 2);
}

#[test]
fn decode_errors_propagate() {
    let src = reader(true);
    let mut buf = DecodeBuffer::new(src, 2);
    let err = buf
        .request(FrameIndex(99), Some(&[0]), DecodeSync::Sync)
        .unwrap_err();
    assert!(matches!(err, PlayheadError::Decode(_)));
}
