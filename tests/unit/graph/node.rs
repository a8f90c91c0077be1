use super::*;
use crate::decode::reader::ProceduralReader;
use crate::foundation::core::{FrameIndex, FrameRange};

fn ctx<'a>(decoded: Option<&'a DecodedImage>) -> RowContext<'a> {
    RowContext {
        y: 1,
        channels: ChannelSet::RGBA,
        project: RectI::new(0, 0, 4, 4),
        decoded,
    }
}

fn filled(v: [f32; 4]) -> RowPixels {
    let mut p = RowPixels::zeroed(0, 4);
    for px in p.data_mut().chunks_exact_mut(4) {
        px.copy_from_slice(&v);
    }
    p
}

#[test]
fn op_kinds_and_slots() {
    assert_eq!(NodeOp::Over.kind(), NodeKind::Filter);
    assert_eq!(NodeOp::Viewer.kind(), NodeKind::Output);
    assert_eq!(NodeOp::Constant { rgba: [0.0; 4] }.kind(), NodeKind::Input);
    assert_eq!(NodeOp::Over.max_inputs(), 2);
    assert_eq!(Node::new("v", NodeOp::Viewer).inputs(), &[None]);
}

#[test]
fn writer_is_a_single_input_output() {
    let sink = Arc::new(Mutex::new(crate::render::sink::InMemorySink::new()));
    let op = NodeOp::Writer(WriterRef::new("out", sink));
    assert_eq!(op.kind(), NodeKind::Output);
    assert_eq!(op.max_inputs(), 1);
    let w = op.writer().unwrap();
    assert_eq!(w.name(), "out");
    assert_eq!(w.range(), None);
    assert_eq!(w.encoding().lut, LutId::Linear);
    assert!(NodeOp::Viewer.writer().is_none());
}

#[test]
fn gain_scales_selected_channels_only() {
    let node = Node::new("g", NodeOp::Gain { rgba: [2.0, 2.0, 2.0, 2.0] });
    let input = filled([0.25, 0.5, 0.1, 1.0]);
    let mut out = RowPixels::zeroed(0, 4);
    let mut c = ctx(None);
    c.channels = ChannelSet::RED;
    node.evaluate_row(&c, &[Some(&input)], &mut out).unwrap();
    assert_eq!(out.pixel(0), Some([0.5, 0.5, 0.1, 1.0]));
}

#[test]
fn over_composites_premultiplied() {
    let node = Node::new("o", NodeOp::Over);
    let a = filled([0.5, 0.0, 0.0, 0.5]);
    let b = filled([0.0, 1.0, 0.0, 1.0]);
    let mut out = RowPixels::zeroed(0, 4);
    node.evaluate_row(&ctx(None), &[Some(&a), Some(&b)], &mut out)
        .unwrap();
    assert_eq!(out.pixel(3), Some([0.5, 0.5, 0.0, 1.0]));

    let mut only_b = RowPixels::zeroed(0, 4);
    node.evaluate_row(&ctx(None), &[None, Some(&b)], &mut only_b)
        .unwrap();
    assert_eq!(only_b, b);
}

#[test]
fn constant_covers_project_window() {
    let node = Node::new("c", NodeOp::Constant { rgba: [1.0, 0.0, 0.0, 0.5] });
    let mut out = RowPixels::zeroed(-2, 6);
    node.evaluate_row(&ctx(None), &[], &mut out).unwrap();
    assert_eq!(out.pixel(-1), Some([0.0; 4]));
    assert_eq!(out.pixel(0), Some([0.5, 0.0, 0.0, 0.5]));
    assert_eq!(out.pixel(5), Some([0.0; 4]));
}

#[test]
fn reader_copies_decoded_row_and_requires_data() {
    let reader = Arc::new(ProceduralReader::new(
        "r",
        FrameRange::single(FrameIndex(0)),
        4,
        4,
    ));
    let node = Node::new("read", NodeOp::reader(reader.clone()));
    let image = reader.decode_rows(FrameIndex(0), &[1]).unwrap();
    let mut out = RowPixels::zeroed(0, 4);
    node.evaluate_row(&ctx(Some(&image)), &[], &mut out).unwrap();
    assert_eq!(out.pixel(2), Some(reader.pixel(FrameIndex(0), 2, 1)));

    let err = node
        .evaluate_row(&ctx(None), &[], &mut RowPixels::zeroed(0, 4))
        .unwrap_err();
    assert!(matches!(err, PlayheadError::Decode(_)));
}
