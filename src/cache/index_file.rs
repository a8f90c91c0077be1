//! Versioned, line-oriented persistence of the frame-cache index.
//!
//! Line 1 is [`INDEX_VERSION_TAG`]. Every following line describes one fragment with
//! tab-separated fields:
//!
//! ```text
//! source  frame  zoom  exposure  lut  rank  graph_hash  fragment  width  rows
//! byte_mode  tex_x  tex_y  tex_r  tex_t  data_x  data_y  data_r  data_t
//! disp_x  disp_y  disp_r  disp_t  pixel_aspect  channels
//! ```
//!
//! Backslash, tab and newline inside the source name are escaped as `\\`, `\t` and `\n`.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::cache::frame::{FrameKey, SourceId};
use crate::foundation::core::{ByteMode, ChannelSet, Format, FrameIndex, LutId, RectI};
use crate::foundation::error::{PlayheadError, PlayheadResult};
use crate::graph::hash::GraphHash;
use crate::render::surface::TextureRect;

pub(crate) const INDEX_FILE_NAME: &str = "frame_cache.idx";
pub(crate) const INDEX_VERSION_TAG: &str = "playhead-frame-cache v2";

const FIELD_COUNT: usize = 25;

/// One persisted fragment.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct IndexRecord {
    pub(crate) key: FrameKey,
    pub(crate) rank: usize,
    pub(crate) fragment: String,
    pub(crate) rect: TextureRect,
}

pub(crate) fn write_index(path: &Path, records: &[IndexRecord]) -> PlayheadResult<()> {
    let tmp = path.with_extension("idx.tmp");
    {
        let f = File::create(&tmp)?;
        let mut w = BufWriter::new(f);
        writeln!(w, "{INDEX_VERSION_TAG}")?;
        for rec in records {
            writeln!(w, "{}", format_record(rec))?;
        }
        w.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read the index at `path`. `Ok(None)` when no index exists.
pub(crate) fn read_index(path: &Path) -> PlayheadResult<Option<Vec<IndexRecord>>> {
    let f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut lines = BufReader::new(f).lines();
    let version = lines.next().transpose()?.unwrap_or_default();
    if version.trim_end() != INDEX_VERSION_TAG {
        return Err(PlayheadError::cache(format!(
            "index version mismatch: found '{}'",
            version.trim_end()
        )));
    }
    let mut out = Vec::new();
    for (n, line) in lines.enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let rec = parse_record(&line)
            .map_err(|e| PlayheadError::cache(format!("index line {}: {e}", n + 2)))?;
        out.push(rec);
    }
    Ok(Some(out))
}

fn format_record(rec: &IndexRecord) -> String {
    let k = &rec.key;
    let d = k.data_window;
    let w = k.display_window.window;
    let t = rec.rect;
    [
        escape_field(&k.source.name),
        k.source.frame.0.to_string(),
        k.zoom.to_string(),
        k.exposure.to_string(),
        k.lut.id().to_string(),
        rec.rank.to_string(),
        k.graph_hash.to_string(),
        escape_field(&rec.fragment),
        t.w.to_string(),
        t.h.to_string(),
        k.byte_mode.id().to_string(),
        t.x.to_string(),
        t.y.to_string(),
        t.r.to_string(),
        t.t.to_string(),
        d.x.to_string(),
        d.y.to_string(),
        d.r.to_string(),
        d.t.to_string(),
        w.x.to_string(),
        w.y.to_string(),
        w.r.to_string(),
        w.t.to_string(),
        k.display_window.pixel_aspect.to_string(),
        k.channels.bits().to_string(),
    ]
    .join("\t")
}

fn parse_record(line: &str) -> Result<IndexRecord, String> {
    let f: Vec<&str> = line.split('\t').collect();
    if f.len() != FIELD_COUNT {
        return Err(format!("expected {FIELD_COUNT} fields, found {}", f.len()));
    }
    let int = |i: usize| f[i].parse::<i32>().map_err(|e| format!("field {i}: {e}"));
    let uint = |i: usize| f[i].parse::<u32>().map_err(|e| format!("field {i}: {e}"));
    let id = |i: usize| f[i].parse::<u8>().map_err(|e| format!("field {i}: {e}"));

    let key = FrameKey {
        source: SourceId {
            name: unescape_field(f[0])?,
            frame: FrameIndex(f[1].parse().map_err(|e| format!("frame: {e}"))?),
        },
        zoom: f[2].parse().map_err(|e| format!("zoom: {e}"))?,
        exposure: f[3].parse().map_err(|e| format!("exposure: {e}"))?,
        lut: LutId::from_id(id(4)?).ok_or("unknown lut id")?,
        graph_hash: GraphHash(
            u64::from_str_radix(f[6], 16).map_err(|e| format!("graph hash: {e}"))?,
        ),
        byte_mode: ByteMode::from_id(id(10)?).ok_or("unknown byte mode")?,
        channels: ChannelSet::from_bits(id(24)?).ok_or("unknown channel bits")?,
        data_window: RectI::new(int(15)?, int(16)?, int(17)?, int(18)?),
        display_window: Format {
            window: RectI::new(int(19)?, int(20)?, int(21)?, int(22)?),
            pixel_aspect: f[23].parse().map_err(|e| format!("pixel aspect: {e}"))?,
        },
    };
    Ok(IndexRecord {
        key,
        rank: f[5].parse().map_err(|e| format!("rank: {e}"))?,
        fragment: unescape_field(f[7])?,
        rect: TextureRect {
            x: int(11)?,
            y: int(12)?,
            r: int(13)?,
            t: int(14)?,
            w: uint(8)?,
            h: uint(9)?,
        },
    })
}

fn escape_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_field(s: &str) -> Result<String, String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            other => return Err(format!("bad escape sequence '\\{}'", other.unwrap_or(' '))),
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/cache/index_file.rs"]
mod tests;
