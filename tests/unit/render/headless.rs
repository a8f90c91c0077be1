use super::*;

fn rect(w: u32, h: u32) -> TextureRect {
    TextureRect::from_visible(
        &(0..h as i32).collect::<Vec<_>>(),
        &(0..w as i32).collect::<Vec<_>>(),
    )
    .unwrap()
}

#[test]
fn visible_lists_define_the_texture_rect() {
    let r = TextureRect::from_visible(&[2, 4, 6], &[10, 11]).unwrap();
    assert_eq!((r.x, r.y, r.r, r.t, r.w, r.h), (10, 2, 12, 7, 2, 3));
    assert_eq!(r.byte_len(ByteMode::Float), 2 * 3 * 16);
    assert!(TextureRect::from_visible(&[], &[1]).is_none());
}

#[test]
fn transfer_rows_are_bounded() {
    let mut buf = TransferBuffer::new(rect(3, 2), ByteMode::Byte);
    assert_eq!(buf.row_stride(), 12);
    buf.row_mut(1).unwrap()[0] = 9;
    assert!(buf.row_mut(2).is_none());
    assert_eq!(buf.data()[12], 9);
}

#[test]
fn uploads_are_recorded_and_released_once() {
    let mut s = HeadlessSurface::new(Viewport::new(4, 4));
    let buf = s.allocate_transfer(rect(2, 2), ByteMode::Byte);
    let a = s.upload(FrameIndex(1), &buf).unwrap();
    let b = s.upload(FrameIndex(2), &buf).unwrap();
    assert_ne!(a, b);
    s.show_texture(FrameIndex(1), a);
    assert_eq!(
        s.shown(),
        &[
            (FrameIndex(1), FrameSource::Rendered),
            (FrameIndex(2), FrameSource::Rendered),
            (FrameIndex(1), FrameSource::TextureCache),
        ]
    );
    s.release_textures(&[a, a]);
    assert_eq!(s.live_textures(), 1);
    assert_eq!(s.released_textures(), 1);
}

#[test]
fn cached_bytes_must_match_the_rect() {
    let mut s = HeadlessSurface::new(Viewport::new(4, 4));
    let r = rect(2, 1);
    assert!(s.show_cached_frame(FrameIndex(3), r, ByteMode::Byte, &[0; 7]).is_err());
    s.show_cached_frame(FrameIndex(3), r, ByteMode::Byte, &[1; 8])
        .unwrap();
    assert_eq!(s.shown_frames(), vec![FrameIndex(3)]);
    assert_eq!(s.last_image().unwrap().2, vec![1; 8]);
}

#[test]
fn notifications_are_recorded_until_cleared() {
    let mut s = HeadlessSurface::new(Viewport::new(4, 4));
    s.frame_cached(FrameIndex(5));
    s.fps_changed(23.9);
    s.playback_changed(true, true);
    assert_eq!(s.cached_notices(), &[FrameIndex(5)]);
    assert_eq!(s.fps_readouts(), &[23.9]);
    s.clear_history();
    assert!(s.cached_notices().is_empty());
    assert!(s.playback_events().is_empty());
}

#[test]
fn texture_keeps_the_depth_it_was_uploaded_with() {
    let mut s = HeadlessSurface::new(Viewport::new(4, 4));
    let buf = s.allocate_transfer(rect(1, 1), ByteMode::Float);
    let t = s.upload(FrameIndex(1), &buf).unwrap();
    s.params_mut().byte_mode = ByteMode::Byte;
    s.show_texture(FrameIndex(1), t);
    let (_, mode, bytes) = s.last_image().unwrap();
    assert_eq!(*mode, ByteMode::Float);
    assert_eq!(bytes.len(), 16);
}
