use super::*;

#[test]
fn frame_range_is_inclusive_and_validates() {
    assert!(FrameRange::new(FrameIndex(3), FrameIndex(2)).is_err());

    let r = FrameRange::new(FrameIndex(-2), FrameIndex(2)).unwrap();
    assert_eq!(r.len_frames(), 5);
    assert!(r.contains(FrameIndex(-2)));
    assert!(r.contains(FrameIndex(2)));
    assert!(!r.contains(FrameIndex(3)));
    assert_eq!(r.clamp(FrameIndex(10)), FrameIndex(2));
    assert_eq!(r.clamp(FrameIndex(-10)), FrameIndex(-2));
    assert!(!r.is_single());
    assert!(FrameRange::single(FrameIndex(7)).is_single());
}

#[test]
fn frame_range_union_covers_both() {
    let a = FrameRange::new(FrameIndex(1), FrameIndex(10)).unwrap();
    let b = FrameRange::new(FrameIndex(5), FrameIndex(30)).unwrap();
    let u = a.union(b);
    assert_eq!(u.first, FrameIndex(1));
    assert_eq!(u.last, FrameIndex(30));
}

#[test]
fn fps_validates_and_reports_duration() {
    assert!(Fps::new(0, 1).is_err());
    assert!(Fps::new(24, 0).is_err());
    let fps = Fps::new(25, 1).unwrap();
    assert!((fps.as_f64() - 25.0).abs() < 1e-9);
    assert_eq!(fps.frame_duration(), Duration::from_millis(40));
}

#[test]
fn rect_intersection_and_union() {
    let a = RectI::new(0, 0, 10, 10);
    let b = RectI::new(5, -5, 20, 5);
    assert_eq!(a.intersect(b), RectI::new(5, 0, 10, 5));
    assert_eq!(a.union(b), RectI::new(0, -5, 20, 10));

    let disjoint = RectI::new(50, 50, 60, 60);
    assert!(a.intersect(disjoint).is_empty());
    assert_eq!(a.union(RectI::default()), a);
    assert_eq!(a.width(), 10);
    assert_eq!(RectI::new(4, 4, 2, 2).width(), 0);
    assert!(a.contains_row(9));
    assert!(!a.contains_row(10));
}

#[test]
fn format_equality_uses_aspect_bits() {
    let a = Format::new(1920, 1080);
    let mut b = Format::new(1920, 1080);
    assert_eq!(a, b);
    b.pixel_aspect = 2.0;
    assert_ne!(a, b);
}

#[test]
fn channel_offsets_follow_rgba_order() {
    let offsets: Vec<usize> = (ChannelSet::RED | ChannelSet::ALPHA).offsets().collect();
    assert_eq!(offsets, vec![0, 3]);
    assert_eq!(ChannelSet::RGBA.offsets().count(), 4);
    assert_eq!(ChannelSet::empty().offsets().count(), 0);
}

#[test]
fn lut_curves_fix_endpoints() {
    for lut in [LutId::Linear, LutId::Srgb, LutId::Rec709] {
        assert!(lut.apply(0.0).abs() < 1e-6, "{lut:?}");
        assert!((lut.apply(1.0) - 1.0).abs() < 1e-3, "{lut:?}");
        assert_eq!(LutId::from_id(lut.id()), Some(lut));
    }
    assert!(LutId::Srgb.apply(0.18) > 0.18);
    assert_eq!(LutId::from_id(9), None);
}

#[test]
fn byte_mode_sizes() {
    assert_eq!(ByteMode::Byte.bytes_per_pixel(), 4);
    assert_eq!(ByteMode::Float.bytes_per_pixel(), 16);
    assert_eq!(ByteMode::from_id(ByteMode::Float.id()), Some(ByteMode::Float));
}
