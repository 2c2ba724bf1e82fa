use std::collections::VecDeque;

use crate::capture::domain::media_backend::{OverlayGraph, Pull, SourceParams};
use crate::capture::infrastructure::resource_ledger::ResourceGuard;
use crate::capture::infrastructure::synthetic_backend::{SyntheticFaults, SyntheticFrame};
use crate::capture::infrastructure::yuv;
use crate::overlay::domain::expression::{evaluate, FrameVariables};
use crate::overlay::domain::filter_chain::{parse_filter_chain, FilterStage};
use crate::shared::pixel_format::PixelFormat;
use crate::shared::reader_error::ReaderError;

const DRAWBOX_OPTIONS: &[&str] = &[
    "x", "y", "width", "w", "height", "h", "color", "c", "thickness", "t", "replace",
];
const DRAWTEXT_OPTIONS: &[&str] = &[
    "fontfile", "font", "text", "textfile", "fontcolor", "fontsize", "x", "y", "alpha",
    "expansion", "line_spacing", "box", "boxcolor", "borderw", "bordercolor", "shadowcolor",
    "shadowx", "shadowy",
];

#[derive(Clone, Copy, Debug, PartialEq)]
struct Color {
    rgb: [u8; 3],
    alpha: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Rect {
    x: i64,
    y: i64,
    width: i64,
    height: i64,
}

#[derive(Debug, PartialEq)]
enum DrawOp {
    Fill(Rect, Color),
    Outline(Rect, i64, Color),
    /// Block glyphs, one cell per character. `true` marks blank cells.
    Text {
        x: i64,
        y: i64,
        size: i64,
        cells: Vec<bool>,
        color: Color,
    },
}

struct QueuedFrame {
    data: Vec<u8>,
    pts: Option<i64>,
}

/// A software stand-in for a libavfilter graph.
///
/// Understands `drawbox`, `drawtext` and `null`. Option expressions are
/// evaluated once against the source geometry when the graph is built, and
/// text is drawn as solid blocks since no font is loaded.
pub struct SyntheticGraph {
    width: usize,
    height: usize,
    source_format: PixelFormat,
    ops: Vec<DrawOp>,
    queue: VecDeque<QueuedFrame>,
    canvas: Vec<u8>,
    reject_push: bool,
    end_after: Option<usize>,
    pulled: usize,
    _guard: ResourceGuard,
}

impl SyntheticGraph {
    pub(super) fn build(
        source: &SourceParams,
        sink_format: PixelFormat,
        description: &str,
        faults: &SyntheticFaults,
        guard: ResourceGuard,
    ) -> Result<Self, ReaderError> {
        let source_format: PixelFormat = source
            .pixel_format
            .parse()
            .map_err(|e: crate::shared::pixel_format::UnknownPixelFormat| {
                ReaderError::FilterGraph(e.to_string())
            })?;
        if source_format.rgb_offsets().is_none() {
            return Err(ReaderError::FilterGraph(format!(
                "synthetic graph cannot read {source_format}"
            )));
        }
        if sink_format != PixelFormat::Uyvy422 {
            return Err(ReaderError::FilterGraph(format!(
                "synthetic graph cannot produce {sink_format}"
            )));
        }

        let vars = FrameVariables::new(source.width as f64, source.height as f64);
        let mut ops = Vec::new();
        for stage in parse_filter_chain(description)? {
            log::debug!("synthetic graph stage {stage}");
            match stage.name.as_str() {
                "null" => {}
                "drawbox" => ops.push(drawbox(&stage, vars)?),
                "drawtext" => ops.push(drawtext(&stage, vars)?),
                other => {
                    return Err(ReaderError::FilterGraph(format!("no such filter: '{other}'")))
                }
            }
        }

        Ok(Self {
            width: source.width as usize,
            height: source.height as usize,
            source_format,
            ops,
            queue: VecDeque::new(),
            canvas: Vec::new(),
            reject_push: faults.reject_push,
            end_after: faults.graph_end_after,
            pulled: 0,
            _guard: guard,
        })
    }

    fn load_canvas(&mut self, data: &[u8]) {
        let bpp = self.source_format.packed_bytes_per_pixel().unwrap_or(4);
        let [r, g, b] = self.source_format.rgb_offsets().unwrap_or([0, 1, 2]);
        self.canvas.clear();
        self.canvas.extend(
            data.chunks_exact(bpp)
                .flat_map(|px| [px[r], px[g], px[b]]),
        );
    }

    fn blend(&mut self, rect: Rect, color: Color) {
        let x0 = rect.x.clamp(0, self.width as i64) as usize;
        let y0 = rect.y.clamp(0, self.height as i64) as usize;
        let x1 = (rect.x + rect.width).clamp(0, self.width as i64) as usize;
        let y1 = (rect.y + rect.height).clamp(0, self.height as i64) as usize;
        let a = color.alpha.clamp(0.0, 1.0);
        for y in y0..y1 {
            for x in x0..x1 {
                let at = (y * self.width + x) * 3;
                for (channel, &target) in self.canvas[at..at + 3].iter_mut().zip(&color.rgb) {
                    *channel = (*channel as f32 * (1.0 - a) + target as f32 * a).round() as u8;
                }
            }
        }
    }

    fn draw(&mut self, op: &DrawOp) {
        match op {
            DrawOp::Fill(rect, color) => self.blend(*rect, *color),
            DrawOp::Outline(rect, t, color) => {
                let Rect {
                    x,
                    y,
                    width,
                    height,
                } = *rect;
                let t = *t;
                let edges = [
                    Rect {
                        x,
                        y,
                        width,
                        height: t,
                    },
                    Rect {
                        x,
                        y: y + height - t,
                        width,
                        height: t,
                    },
                    Rect {
                        x,
                        y: y + t,
                        width: t,
                        height: height - 2 * t,
                    },
                    Rect {
                        x: x + width - t,
                        y: y + t,
                        width: t,
                        height: height - 2 * t,
                    },
                ];
                for edge in edges {
                    self.blend(edge, *color);
                }
            }
            DrawOp::Text { x, y, size, cells, color } => {
                let advance = (size / 2).max(1);
                for (i, &blank) in cells.iter().enumerate() {
                    if blank {
                        continue;
                    }
                    let cell = Rect {
                        x: x + i as i64 * advance,
                        y: *y,
                        width: (advance - 1).max(1),
                        height: *size,
                    };
                    self.blend(cell, *color);
                }
            }
        }
    }
}

impl OverlayGraph for SyntheticGraph {
    type Frame = SyntheticFrame;

    fn push(&mut self, frame: &SyntheticFrame) -> Result<(), ReaderError> {
        if self.reject_push {
            return Err(ReaderError::FilterPush("synthetic graph rejected the frame".into()));
        }
        if frame.format != Some(self.source_format)
            || frame.width as usize != self.width
            || frame.height as usize != self.height
        {
            return Err(ReaderError::FilterPush(format!(
                "frame {}x{} {:?} does not match graph source {}x{} {}",
                frame.width, frame.height, frame.format, self.width, self.height,
                self.source_format
            )));
        }
        self.queue.push_back(QueuedFrame {
            data: frame.data.clone(),
            pts: frame.pts,
        });
        Ok(())
    }

    fn pull(&mut self, frame: &mut SyntheticFrame) -> Result<Pull, ReaderError> {
        if self.end_after.is_some_and(|n| self.pulled >= n) {
            return Ok(Pull::EndOfStream);
        }
        let Some(queued) = self.queue.pop_front() else {
            return Ok(Pull::WouldBlock);
        };

        self.load_canvas(&queued.data);
        let ops = std::mem::take(&mut self.ops);
        for op in &ops {
            self.draw(op);
        }
        self.ops = ops;

        yuv::rgb_to_uyvy(&self.canvas, self.width, self.height, &mut frame.data);
        frame.format = Some(PixelFormat::Uyvy422);
        frame.width = self.width as u32;
        frame.height = self.height as u32;
        frame.pts = queued.pts;
        frame.best_effort = queued.pts;
        self.pulled += 1;
        Ok(Pull::Ready)
    }
}

fn check_options(stage: &FilterStage, known: &[&str]) -> Result<(), ReaderError> {
    match stage
        .options
        .iter()
        .filter_map(|o| o.key.as_deref())
        .find(|k| !known.contains(k))
    {
        Some(key) => Err(ReaderError::FilterGraph(format!(
            "option '{key}' not found for filter '{}'",
            stage.name
        ))),
        None => Ok(()),
    }
}

fn eval(stage: &FilterStage, expr: &str, vars: FrameVariables) -> Result<i64, ReaderError> {
    evaluate(expr, vars)
        .map(|v| v as i64)
        .map_err(|e| ReaderError::FilterGraph(format!("{}: {e}", stage.name)))
}

fn drawbox(stage: &FilterStage, vars: FrameVariables) -> Result<DrawOp, ReaderError> {
    check_options(stage, DRAWBOX_OPTIONS)?;
    let arg = |keys: &[&str], position: usize, default: &'static str| {
        stage
            .get(keys)
            .or_else(|| stage.positional(position))
            .unwrap_or(default)
    };

    // Zero means "as large as the input".
    let sizing = vars.for_box(None);
    let width = match eval(stage, arg(&["width", "w"], 2, "0"), sizing)? {
        0 => vars.width as i64,
        w => w,
    };
    let height = match eval(stage, arg(&["height", "h"], 3, "0"), sizing)? {
        0 => vars.height as i64,
        h => h,
    };
    let vars = vars.for_box(Some((width as f64, height as f64)));
    let x = eval(stage, arg(&["x"], 0, "0"), vars)?;
    let y = eval(stage, arg(&["y"], 1, "0"), vars)?;
    let color = parse_color(arg(&["color", "c"], 4, "black"))?;
    let rect = Rect {
        x,
        y,
        width,
        height,
    };

    match arg(&["thickness", "t"], 5, "3") {
        "fill" => Ok(DrawOp::Fill(rect, color)),
        t => Ok(DrawOp::Outline(rect, eval(stage, t, vars)?.max(0), color)),
    }
}

fn drawtext(stage: &FilterStage, vars: FrameVariables) -> Result<DrawOp, ReaderError> {
    check_options(stage, DRAWTEXT_OPTIONS)?;
    if stage.get(&["textfile"]).is_some() {
        return Err(ReaderError::FilterGraph(
            "drawtext: textfile is not supported by the synthetic graph".into(),
        ));
    }
    let text = stage.get(&["text"]).ok_or_else(|| {
        ReaderError::FilterGraph("drawtext: either text or a valid file must be provided".into())
    })?;

    let size = match stage.get(&["fontsize"]) {
        Some(s) => eval(stage, s, vars)?,
        None => 16,
    };
    Ok(DrawOp::Text {
        x: eval(stage, stage.get(&["x"]).unwrap_or("0"), vars)?,
        y: eval(stage, stage.get(&["y"]).unwrap_or("0"), vars)?,
        size,
        cells: unescape_expansion(text)
            .chars()
            .map(char::is_whitespace)
            .collect(),
        color: parse_color(stage.get(&["fontcolor"]).unwrap_or("black"))?,
    })
}

/// Resolves drawtext's own backslash escapes (`\%`, `\\`).
fn unescape_expansion(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            other => out.push(other),
        }
    }
    out
}

/// Parses `name[@alpha]`, `0xRRGGBB[@alpha]` or `#RRGGBB[@alpha]`.
fn parse_color(spec: &str) -> Result<Color, ReaderError> {
    let invalid = || ReaderError::FilterGraph(format!("cannot parse color '{spec}'"));
    let (name, alpha) = match spec.split_once('@') {
        Some((name, alpha)) => (name, alpha.parse::<f32>().map_err(|_| invalid())?),
        None => (spec, 1.0),
    };
    if !(0.0..=1.0).contains(&alpha) {
        return Err(invalid());
    }

    let rgb = match name.to_ascii_lowercase().as_str() {
        "black" => [0, 0, 0],
        "white" => [255, 255, 255],
        "red" => [255, 0, 0],
        "green" => [0, 128, 0],
        "blue" => [0, 0, 255],
        "yellow" => [255, 255, 0],
        "gray" | "grey" => [128, 128, 128],
        hex => {
            let digits = hex
                .strip_prefix("0x")
                .or_else(|| hex.strip_prefix('#'))
                .ok_or_else(invalid)?;
            if digits.len() != 6 {
                return Err(invalid());
            }
            let value = u32::from_str_radix(digits, 16).map_err(|_| invalid())?;
            [(value >> 16) as u8, (value >> 8) as u8, value as u8]
        }
    };
    Ok(Color { rgb, alpha })
}
