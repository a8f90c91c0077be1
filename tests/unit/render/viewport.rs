use super::*;

fn format() -> Format {
    Format::new(8, 8)
}

#[test]
fn unit_zoom_maps_one_to_one() {
    let vp = Viewport::new(4, 6);
    let rows = vp.visible_rows(&format(), format().window);
    assert_eq!(rows, vec![0, 1, 2, 3, 4, 5]);
    let cols = vp.visible_columns(&format(), format().window);
    assert_eq!(cols, vec![0, 1, 2, 3]);
}

#[test]
fn zoom_out_skips_rows() {
    let mut vp = Viewport::new(8, 4);
    vp.zoom = 0.5;
    assert_eq!(vp.visible_rows(&format(), format().window), vec![1, 3, 5, 7]);
}

#[test]
fn zoom_in_deduplicates_rows() {
    let mut vp = Viewport::new(8, 8);
    vp.zoom = 2.0;
    assert_eq!(vp.visible_rows(&format(), format().window), vec![0, 1, 2, 3]);
}

#[test]
fn pan_and_bounds_clip() {
    let mut vp = Viewport::new(8, 8);
    vp.pan_y = 2.0;
    let rows = vp.visible_rows(&format(), RectI::new(0, 0, 8, 3));
    assert_eq!(rows, vec![0, 1, 2]);
    vp.zoom = 0.0;
    assert!(vp.visible_rows(&format(), format().window).is_empty());
}

#[test]
fn fit_centres_the_format() {
    let mut vp = Viewport::new(200, 100);
    vp.fit_to(&Format::new(100, 100));
    assert!((vp.zoom - 1.0).abs() < 1e-9);
    assert!((vp.pan_x - 50.0).abs() < 1e-9);
    assert!(vp.pan_y.abs() < 1e-9);

    let mut vp = Viewport::new(100, 100);
    vp.fit_to(&Format::new(400, 200));
    assert!((vp.zoom - 0.25).abs() < 1e-9);
    assert!((vp.pan_y - 25.0).abs() < 1e-9);
    assert_eq!(vp.visible_rows(&Format::new(400, 200), Format::new(400, 200).window).len(), 50);
}

#[test]
fn wide_pixels_fill_the_fitted_width() {
    let anamorphic = Format {
        window: RectI::new(0, 0, 100, 100),
        pixel_aspect: 2.0,
    };
    let mut vp = Viewport::new(400, 100);
    vp.fit_to(&anamorphic);
    assert!((vp.zoom - 1.0).abs() < 1e-9);
    assert!((vp.pan_x - 100.0).abs() < 1e-9);

    let cols = vp.visible_columns(&anamorphic, anamorphic.window);
    assert_eq!(cols.len(), 100);
    assert_eq!((cols[0], cols[99]), (0, 99));
    assert_eq!(vp.visible_rows(&anamorphic, anamorphic.window).len(), 100);
}
