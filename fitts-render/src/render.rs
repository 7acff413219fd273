use ab_glyph::{Font, FontVec, Glyph, PxScale, ScaleFont, point};
use anyhow::{Context, Result, bail};
use bytemuck::{cast_slice, cast_slice_mut};
use fitts_core::{SessionPhase, SessionView, Target};
use fitts_timing::Timer;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, PremultipliedColorU8, Rect, Transform};

const BACKGROUND: [u8; 3] = [240, 240, 240];
const GUIDE_LINE: [u8; 3] = [180, 180, 180];
const TARGET: [u8; 3] = [200, 0, 0];
const POINTER: [u8; 3] = [0, 100, 255];
const TEXT: [u8; 3] = [0, 0, 0];

/// Half-length of the crosshair arms
const POINTER_ARM: u32 = 10;
const POINTER_DOT: f32 = 3.0;

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Loads the UI font. An explicit path must load; otherwise common system
/// locations are tried and `None` means text will not be drawn.
pub fn load_font(explicit: Option<&Path>) -> Result<Option<FontVec>> {
    if let Some(path) = explicit {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .with_context(|| format!("parsing font {}", path.display()))?;
        return Ok(Some(font));
    }

    for candidate in FONT_CANDIDATES {
        let Ok(bytes) = std::fs::read(candidate) else {
            continue;
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                tracing::debug!(path = candidate, "font loaded");
                return Ok(Some(font));
            }
            Err(err) => tracing::debug!(path = candidate, %err, "unusable font"),
        }
    }
    tracing::warn!("no usable font found, on-screen text is disabled");
    Ok(None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TextStyle {
    Title,
    Body,
    Small,
}

impl TextStyle {
    fn size_px(self) -> f32 {
        match self {
            TextStyle::Title => 32.0,
            TextStyle::Body => 22.0,
            TextStyle::Small => 16.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TextLine {
    text: String,
    style: TextStyle,
    y: f32,
}

impl TextLine {
    fn new(text: impl Into<String>, style: TextStyle, y: f32) -> Self {
        Self {
            text: text.into(),
            style,
            y,
        }
    }
}

/// Whole seconds left, rounded up so the display never shows 0 early.
fn countdown_seconds(remaining_ms: u64) -> u64 {
    remaining_ms.div_ceil(1000)
}

/// Text to draw for the current phase, horizontally centred at `y`.
fn phase_text(view: &SessionView, height: f32) -> Vec<TextLine> {
    use TextStyle::*;
    let mid = height / 2.0;
    let progress = |(current, total): (usize, usize)| format!("Trial {current} of {total}");

    match view.phase {
        SessionPhase::StartScreen => vec![
            TextLine::new("Fitts' Law Experiment", Title, mid - 40.0),
            TextLine::new("Click to begin a short trial session.", Body, mid + 10.0),
            TextLine::new(
                "Try clicking the targets as fast and accurately as you can.",
                Body,
                mid + 40.0,
            ),
        ],
        SessionPhase::Trial => {
            let mut lines = vec![TextLine::new("Trial Session", Title, 30.0)];
            if let Some(p) = view.progress {
                lines.push(TextLine::new(progress(p), Small, height - 30.0));
            }
            lines
        }
        SessionPhase::Transition => vec![
            TextLine::new("Trial Session Complete!", Title, mid - 60.0),
            TextLine::new(
                "Press 'C' to continue or 'R' to repeat the trial.",
                Body,
                mid - 20.0,
            ),
        ],
        SessionPhase::Countdown => {
            let seconds = countdown_seconds(view.countdown_remaining_ms.unwrap_or(0));
            vec![
                TextLine::new("Get ready!", Title, mid - 60.0),
                TextLine::new(seconds.to_string(), Title, mid - 15.0),
            ]
        }
        SessionPhase::Experiment => {
            let mut lines = vec![TextLine::new("Main Experiment", Title, 30.0)];
            if let Some(p) = view.progress {
                lines.push(TextLine::new(progress(p), Small, height - 30.0));
            }
            lines
        }
        SessionPhase::BreakScreen => vec![
            TextLine::new("Take a short break!", Title, mid - 30.0),
            TextLine::new(
                format!(
                    "You've completed {} out of {} trials.",
                    view.completed_targets, view.total_targets
                ),
                Body,
                mid,
            ),
            TextLine::new("Press 'C' to continue when ready.", Body, mid + 40.0),
        ],
        SessionPhase::End => {
            let mut lines = vec![
                TextLine::new("Experiment Complete!", Title, mid - 40.0),
                TextLine::new(
                    format!(
                        "Average Reaction Time: {:.2} ms",
                        view.mean_reaction_time_ms.unwrap_or(0.0)
                    ),
                    Body,
                    mid,
                ),
            ];
            if view.log_saved {
                lines.push(TextLine::new("Log saved. Press Esc to exit.", Small, mid + 40.0));
            }
            lines
        }
    }
}

fn color(rgb: [u8; 3]) -> Color {
    Color::from_rgba8(rgb[0], rgb[1], rgb[2], 255)
}

/// Rasterizes one line of text into a tight, transparent pixmap.
/// Returns `None` for text with no visible glyphs.
pub fn render_text_pixmap<F: Font>(text: &str, font_size: f32, font: &F, color: Color) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    // layout with baseline at ascent
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    let outlines: Vec<_> = glyphs
        .into_iter()
        .filter_map(|g| font.outline_glyph(g))
        .collect();
    if outlines.is_empty() {
        return None;
    }

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for out in &outlines {
        let b = out.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;

    let stride = w as usize;
    let dst = pm.pixels_mut();
    let cu = [
        (color.red() * 255.0) as u8,
        (color.green() * 255.0) as u8,
        (color.blue() * 255.0) as u8,
        (color.alpha() * 255.0) as u8,
    ];

    for out in &outlines {
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x).floor() as i32;
            let iy = (y as f32 + b.min.y - min_y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            // premultiplied source over existing coverage
            let a_lin = (cov * cu[3] as f32 / 255.0).clamp(0.0, 1.0);
            let sa = (a_lin * 255.0) as u8;
            let inv = 1.0 - (sa as f32 / 255.0);
            let bg = dst[i];
            let mix = |s: u8, d: u8| ((s as f32 * a_lin) as u8).saturating_add((d as f32 * inv) as u8);
            let a = sa.saturating_add((bg.alpha() as f32 * inv) as u8);
            let r = mix(cu[0], bg.red()).min(a);
            let g = mix(cu[1], bg.green()).min(a);
            let bl = mix(cu[2], bg.blue()).min(a);
            if let Some(px) = PremultipliedColorU8::from_rgba(r, g, bl, a) {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}

/// Per-string pixmap cache. Session text is drawn from a small, mostly
/// fixed set of strings, so every distinct line is rasterized once.
struct TextCache {
    font: FontVec,
    map: HashMap<(TextStyle, String), Arc<Pixmap>>,
}

impl TextCache {
    fn new(font: FontVec) -> Self {
        Self {
            font,
            map: HashMap::new(),
        }
    }

    fn get_or_render(&mut self, style: TextStyle, text: &str) -> Option<Arc<Pixmap>> {
        if let Some(p) = self.map.get(&(style, text.to_string())) {
            return Some(Arc::clone(p));
        }
        let pm = Arc::new(render_text_pixmap(text, style.size_px(), &self.font, color(TEXT))?);
        self.map.insert((style, text.to_string()), Arc::clone(&pm));
        Some(pm)
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    pub clear: Duration,
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
    pub dirty_count: usize,
}

/// Draws the session into an offscreen canvas and presents only the
/// regions that changed since the previous frame.
pub struct SkiaRenderer {
    width: u32,
    height: u32,

    text_cache: Option<TextCache>,
    target_cache: HashMap<u32, Arc<Pixmap>>,
    pointer_pixmap: Arc<Pixmap>,

    // background with guide line; source for clearing dirty regions
    background: Pixmap,
    canvas: Pixmap,
    dirty_regions: Vec<Rect>,
    first_frame: bool,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32, font: Option<FontVec>) -> Result<Self> {
        let background = render_background(width, height)?;
        Ok(Self {
            width,
            height,
            text_cache: font.map(TextCache::new),
            target_cache: HashMap::new(),
            pointer_pixmap: Arc::new(render_pointer().context("pointer pixmap")?),
            canvas: background.clone(),
            background,
            dirty_regions: Vec::with_capacity(16),
            first_frame: true,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.width = width;
        self.height = height;
        self.background = render_background(width, height)?;
        self.canvas = self.background.clone();
        self.dirty_regions.clear();
        self.first_frame = true;
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn has_text(&self) -> bool {
        self.text_cache.is_some()
    }

    pub fn cached_text_count(&self) -> usize {
        self.text_cache.as_ref().map_or(0, TextCache::len)
    }

    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }

    /// Renders `view` and copies the changed regions into `frame_buffer`
    /// (RGBA8, `width * height * 4` bytes).
    pub fn render_frame<T: Timer>(
        &mut self,
        view: &SessionView,
        frame_buffer: &mut [u8],
        timer: &T,
    ) -> Result<FrameStats> {
        let expected = self.width as usize * self.height as usize * 4;
        if frame_buffer.len() != expected {
            bail!(
                "frame buffer is {} bytes, expected {} for {}x{}",
                frame_buffer.len(),
                expected,
                self.width,
                self.height
            );
        }

        if self.first_frame {
            self.first_frame = false;
            self.canvas = self.background.clone();
            frame_buffer.copy_from_slice(self.canvas.data());
            self.dirty_regions.clear();
        }

        let old_dirty = std::mem::take(&mut self.dirty_regions);

        let t = timer.now();
        self.clear_dirty(&old_dirty);
        let clear = timer.elapsed(t);

        let t = timer.now();
        self.draw_view(view)?;
        let draw = timer.elapsed(t);

        let mut present = old_dirty;
        present.extend_from_slice(&self.dirty_regions);
        coalesce_dirty(&mut present);

        let t = timer.now();
        for rect in &present {
            self.copy_dirty_region(*rect, frame_buffer);
        }
        let copy = timer.elapsed(t);

        Ok(FrameStats {
            clear,
            draw,
            copy,
            total: clear + draw + copy,
            dirty_count: present.len(),
        })
    }

    fn draw_view(&mut self, view: &SessionView) -> Result<()> {
        if self.text_cache.is_some() {
            let center_x = self.width as f32 / 2.0;
            for line in phase_text(view, self.height as f32) {
                self.blit_text(&line, center_x);
            }
        }

        if let Some(target) = view.target {
            self.blit_target(&target)?;
        }

        let pm = Arc::clone(&self.pointer_pixmap);
        let half = (pm.width() / 2) as i32;
        self.blit(&pm, (view.pointer.0 - half, view.pointer.1 - half));
        Ok(())
    }

    fn blit_text(&mut self, line: &TextLine, center_x: f32) {
        let Some(cache) = self.text_cache.as_mut() else {
            return;
        };
        let Some(pm) = cache.get_or_render(line.style, &line.text) else {
            return;
        };
        let x = (center_x - pm.width() as f32 * 0.5) as i32;
        let y = (line.y - pm.height() as f32 * 0.5) as i32;
        self.blit(&pm, (x, y));
    }

    fn blit_target(&mut self, target: &Target) -> Result<()> {
        let pm = match self.target_cache.get(&target.size) {
            Some(pm) => Arc::clone(pm),
            None => {
                let pm = Arc::new(
                    render_target(target.size)
                        .with_context(|| format!("target pixmap of size {}", target.size))?,
                );
                self.target_cache.insert(target.size, Arc::clone(&pm));
                pm
            }
        };
        let half = (pm.width() / 2) as i32;
        self.blit(&pm, (target.x - half, target.y - half));
        Ok(())
    }

    /// Composites a premultiplied pixmap at `top_left`, clipped to the
    /// canvas, and records the touched region.
    fn blit(&mut self, pm: &Pixmap, top_left: (i32, i32)) {
        let (x, y) = top_left;
        let (w, h) = (pm.width() as i32, pm.height() as i32);
        let (cw, ch) = (self.width as i32, self.height as i32);

        if x + w <= 0 || y + h <= 0 || x >= cw || y >= ch {
            return;
        }

        let dst_x = x.max(0) as usize;
        let dst_y = y.max(0) as usize;
        let src_x = (-x).max(0) as usize;
        let src_y = (-y).max(0) as usize;
        let copy_w = (w as usize - src_x).min(cw as usize - dst_x);
        let copy_h = (h as usize - src_y).min(ch as usize - dst_y);

        let src: &[[u8; 4]] = cast_slice(pm.data());
        let dst: &mut [[u8; 4]] = cast_slice_mut(self.canvas.data_mut());
        let src_stride = pm.width() as usize;
        let dst_stride = self.width as usize;

        for row in 0..copy_h {
            let s_row = (src_y + row) * src_stride + src_x;
            let d_row = (dst_y + row) * dst_stride + dst_x;
            let s_px = &src[s_row..s_row + copy_w];
            let d_px = &mut dst[d_row..d_row + copy_w];

            if s_px.iter().all(|p| p[3] == 255) {
                d_px.copy_from_slice(s_px);
                continue;
            }
            for (d, s) in d_px.iter_mut().zip(s_px) {
                let inv = 255 - s[3] as u32;
                if inv == 255 {
                    continue;
                }
                for c in 0..4 {
                    d[c] = (s[c] as u32 + (d[c] as u32 * inv + 127) / 255) as u8;
                }
            }
        }

        if let Some(rect) =
            Rect::from_xywh(dst_x as f32, dst_y as f32, copy_w as f32, copy_h as f32)
        {
            self.dirty_regions.push(rect);
        }
    }

    fn clear_dirty(&mut self, dirty: &[Rect]) {
        let stride = self.width as usize * 4;
        let bg = self.background.data();
        let canvas = self.canvas.data_mut();

        for rect in dirty {
            let Some((x0, y0, x1, y1)) = clip_rect(rect, self.width, self.height) else {
                continue;
            };
            for y in y0..y1 {
                let off = y * stride + x0 * 4;
                let len = (x1 - x0) * 4;
                canvas[off..off + len].copy_from_slice(&bg[off..off + len]);
            }
        }
    }

    fn copy_dirty_region(&self, dirty: Rect, frame_buffer: &mut [u8]) {
        let Some((x0, y0, x1, y1)) = clip_rect(&dirty, self.width, self.height) else {
            return;
        };
        let stride = self.width as usize * 4;
        let canvas = self.canvas.data();
        for row in y0..y1 {
            let off = row * stride + x0 * 4;
            let len = (x1 - x0) * 4;
            frame_buffer[off..off + len].copy_from_slice(&canvas[off..off + len]);
        }
    }
}

/// Pixel bounds of `rect` inside a `width` x `height` surface.
fn clip_rect(rect: &Rect, width: u32, height: u32) -> Option<(usize, usize, usize, usize)> {
    let x0 = rect.x().floor().clamp(0.0, width as f32) as usize;
    let y0 = rect.y().floor().clamp(0.0, height as f32) as usize;
    let x1 = rect.right().ceil().min(width as f32) as usize;
    let y1 = rect.bottom().ceil().min(height as f32) as usize;
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
}

/// Merges touching rects on the same row band to cut copy calls.
fn coalesce_dirty(rects: &mut Vec<Rect>) {
    rects.sort_by(|a, b| a.y().total_cmp(&b.y()).then(a.x().total_cmp(&b.x())));
    let mut out: Vec<Rect> = Vec::with_capacity(rects.len());
    for r in rects.drain(..) {
        if let Some(last) = out.last_mut() {
            let same_row = (r.y() - last.y()).abs() < 1.0 && (r.height() - last.height()).abs() < 1.0;
            let touching = r.x() <= last.right() + 1.0;
            if same_row && touching {
                let nx = last.x().min(r.x());
                let nx2 = last.right().max(r.right());
                if let Some(merged) = Rect::from_xywh(nx, last.y(), nx2 - nx, last.height()) {
                    *last = merged;
                    continue;
                }
            }
        }
        out.push(r);
    }
    *rects = out;
}

fn render_background(width: u32, height: u32) -> Result<Pixmap> {
    let mut pm = Pixmap::new(width, height)
        .with_context(|| format!("canvas of {width}x{height}"))?;
    pm.fill(color(BACKGROUND));

    let mut paint = Paint::default();
    paint.anti_alias = false;
    paint.set_color(color(GUIDE_LINE));
    let line_y = (height / 2) as f32 - 1.0;
    if let Some(line) = Rect::from_xywh(0.0, line_y, width as f32, 2.0) {
        pm.fill_rect(line, &paint, Transform::identity(), None);
    }
    Ok(pm)
}

/// Filled circle of diameter `size`, one pixel of padding on each side.
fn render_target(size: u32) -> Option<Pixmap> {
    let side = size + 2;
    let mut pm = Pixmap::new(side, side)?;
    let mut paint = Paint::default();
    paint.set_color(color(TARGET));

    let c = side as f32 / 2.0;
    let path = PathBuilder::from_circle(c, c, size as f32 / 2.0)?;
    pm.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    Some(pm)
}

/// Crosshair with a centre dot; the cursor sits on the centre pixel.
fn render_pointer() -> Option<Pixmap> {
    let side = POINTER_ARM * 2 + 4;
    let c = side / 2;
    let mut pm = Pixmap::new(side, side)?;

    let mut paint = Paint::default();
    paint.anti_alias = false;
    paint.set_color(color(POINTER));

    let arm = (POINTER_ARM * 2) as f32;
    let h = Rect::from_xywh((c - POINTER_ARM) as f32, c as f32 - 1.0, arm, 2.0)?;
    let v = Rect::from_xywh(c as f32 - 1.0, (c - POINTER_ARM) as f32, 2.0, arm)?;
    pm.fill_rect(h, &paint, Transform::identity(), None);
    pm.fill_rect(v, &paint, Transform::identity(), None);

    paint.anti_alias = true;
    let dot = PathBuilder::from_circle(c as f32, c as f32, POINTER_DOT)?;
    pm.fill_path(&dot, &paint, FillRule::Winding, Transform::identity(), None);
    Some(pm)
}
