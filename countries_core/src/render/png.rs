use crate::config::RenderConfig;
use crate::models::CountryRecord;
use crate::render::text::TextPainter;
use crate::render::traits::{SummaryInput, SummaryRenderer};
use crate::{Error, Result};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 600;

const GRADIENT_TOP: [u8; 3] = [0x1e, 0x3a, 0x8a];
const GRADIENT_BOTTOM: [u8; 3] = [0x3b, 0x82, 0xf6];
const WHITE: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);
const ACCENT: Rgba<u8> = Rgba([0xfb, 0xbf, 0x24, 0xff]);
const BORDER: Rgba<u8> = Rgba([0x60, 0xa5, 0xfa, 0xff]);
const ROW_TEXT: Rgba<u8> = Rgba([0xe5, 0xe7, 0xeb, 0xff]);
const FOOTER: Rgba<u8> = Rgba([0xcb, 0xd5, 0xe1, 0xff]);
const BAR_TRACK: Rgba<u8> = Rgba([0x1e, 0x40, 0xaf, 0xff]);

const ROW_TOP: i32 = 225;
const ROW_STEP: i32 = 55;
const BAR_LEFT: i32 = 100;
const BAR_MAX_WIDTH: u32 = 550;
const BAR_HEIGHT: u32 = 12;

/// Fonts tried when none is configured.
const FALLBACK_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

/// Writes `summary.png` into the configured cache directory.
///
/// Each render writes its own uniquely named temp file in the cache directory
/// and renames it into place, so readers see either the previous image or a
/// complete new one even when renders overlap.
#[derive(Debug, Clone)]
pub struct PngSummaryRenderer {
    config: RenderConfig,
}

impl PngSummaryRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn image_path(&self) -> PathBuf {
        self.config.image_path()
    }

    async fn load_font(&self) -> Option<Vec<u8>> {
        if let Some(path) = &self.config.font_path {
            match tokio::fs::read(path).await {
                Ok(bytes) => return Some(bytes),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "summary font unreadable; drawing without text"
                    );
                    return None;
                }
            }
        }
        for candidate in FALLBACK_FONTS {
            if let Ok(bytes) = tokio::fs::read(candidate).await {
                tracing::debug!(path = candidate, "using fallback summary font");
                return Some(bytes);
            }
        }
        tracing::debug!("no summary font available; drawing without text");
        None
    }
}

#[async_trait]
impl SummaryRenderer for PngSummaryRenderer {
    #[tracing::instrument(level = "debug", skip_all, fields(total = summary.total))]
    async fn render(&self, summary: &SummaryInput) -> Result<PathBuf> {
        let font = self.load_font().await;
        let summary = summary.clone();
        let dir = self.config.cache_dir.clone();
        let path = self.config.image_path();
        let target = path.clone();
        let bytes = tokio::task::spawn_blocking(move || {
            let img = draw_summary(&summary, font.as_deref());
            let encoded = encode_png(img)?;
            write_atomically(&dir, &target, &encoded)?;
            Ok::<_, Error>(encoded.len())
        })
        .await
        .map_err(|e| Error::backend("summary render task", e))??;

        tracing::info!(path = %path.display(), bytes, "summary image written");
        Ok(path)
    }
}

pub(crate) fn draw_summary(summary: &SummaryInput, font: Option<&[u8]>) -> RgbaImage {
    let mut img = RgbaImage::new(WIDTH, HEIGHT);
    paint_gradient(&mut img);
    draw_hollow_rect_mut(&mut img, Rect::at(50, 100).of_size(700, 420), BORDER);
    draw_bars(&mut img, &summary.top);

    let painter = font.and_then(TextPainter::new);
    if font.is_some() && painter.is_none() {
        tracing::warn!("summary font could not be parsed; drawing without text");
    }
    if let Some(mut painter) = painter {
        draw_text(&mut painter, &mut img, summary);
    }
    img
}

fn paint_gradient(img: &mut RgbaImage) {
    let span = (HEIGHT - 1) as f32;
    for y in 0..HEIGHT {
        let t = y as f32 / span;
        let mut px = [0u8; 4];
        for c in 0..3 {
            let from = f32::from(GRADIENT_TOP[c]);
            let to = f32::from(GRADIENT_BOTTOM[c]);
            px[c] = (from + (to - from) * t).round() as u8;
        }
        px[3] = 0xff;
        for x in 0..WIDTH {
            img.put_pixel(x, y, Rgba(px));
        }
    }
}

/// One bar per ranked row, scaled against the leader.
fn draw_bars(img: &mut RgbaImage, top: &[CountryRecord]) {
    let leader = top
        .first()
        .and_then(|r| r.estimated_gdp)
        .filter(|g| *g > 0.0);

    for (i, record) in top.iter().enumerate() {
        let y = ROW_TOP + ROW_STEP * i as i32 + 28;
        draw_filled_rect_mut(
            img,
            Rect::at(BAR_LEFT, y).of_size(BAR_MAX_WIDTH, BAR_HEIGHT),
            BAR_TRACK,
        );

        let ratio = match (leader, record.estimated_gdp) {
            (Some(max), Some(gdp)) => (gdp / max).clamp(0.0, 1.0),
            _ => 0.0,
        };
        let width = (f64::from(BAR_MAX_WIDTH) * ratio).round() as u32;
        if width > 0 {
            let color = if i == 0 { ACCENT } else { ROW_TEXT };
            draw_filled_rect_mut(img, Rect::at(BAR_LEFT, y).of_size(width, BAR_HEIGHT), color);
        }
    }
}

fn draw_text(painter: &mut TextPainter<'_>, img: &mut RgbaImage, summary: &SummaryInput) {
    draw_centered(painter, img, "Country Data Summary", 30, 36.0, WHITE);

    painter.draw(
        img,
        &format!("Total Countries: {}", summary.total),
        80,
        120,
        28.0,
        ACCENT,
    );
    painter.draw(img, "Top 5 Countries by GDP:", 80, 175, 24.0, WHITE);

    for (i, record) in summary.top.iter().enumerate() {
        let gdp = record.estimated_gdp.map_or_else(|| "n/a".to_string(), format_gdp);
        let line = format!("{}. {} - {}", i + 1, record.name, gdp);
        let color = if i == 0 { ACCENT } else { ROW_TEXT };
        painter.draw(img, &line, BAR_LEFT, ROW_TOP + ROW_STEP * i as i32, 20.0, color);
    }

    let updated = format!(
        "Last Updated: {}",
        summary.refreshed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    draw_centered(painter, img, &updated, 545, 18.0, FOOTER);
}

fn draw_centered(
    painter: &mut TextPainter<'_>,
    img: &mut RgbaImage,
    text: &str,
    y: i32,
    size: f32,
    color: Rgba<u8>,
) {
    let width = painter.measure(text, size);
    let x = ((WIDTH as f32 - width) / 2.0).max(0.0) as i32;
    painter.draw(img, text, x, y, size, color);
}

/// `$1.23T`, `$4.56B`, `$7.89M`, or plain dollars below a million.
pub fn format_gdp(gdp: f64) -> String {
    if gdp >= 1e12 {
        format!("${:.2}T", gdp / 1e12)
    } else if gdp >= 1e9 {
        format!("${:.2}B", gdp / 1e9)
    } else if gdp >= 1e6 {
        format!("${:.2}M", gdp / 1e6)
    } else {
        format!("${gdp:.2}")
    }
}

fn encode_png(img: RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| Error::backend("encode summary png", e))?;
    Ok(buf)
}

fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| Error::backend("create cache dir", e))?;
    // Unique per call; the temp file is removed on drop if anything below fails.
    let mut tmp = tempfile::Builder::new()
        .prefix(".summary.")
        .suffix(".png.tmp")
        .tempfile_in(dir)
        .map_err(|e| Error::backend("create summary temp file", e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| Error::backend("write summary temp file", e))?;
    tmp.persist(path)
        .map_err(|e| Error::backend("replace summary image", e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rec(name: &str, gdp: Option<f64>) -> CountryRecord {
        CountryRecord {
            id: 1,
            name: name.to_string(),
            capital: None,
            region: None,
            population: 10,
            currency_code: Some("USD".to_string()),
            exchange_rate: Some(1.0),
            estimated_gdp: gdp,
            flag_url: None,
            last_refreshed_at: Utc::now(),
        }
    }

    #[test]
    fn gdp_formatting_picks_the_largest_unit() {
        assert_eq!(format_gdp(2.5e13), "$25.00T");
        assert_eq!(format_gdp(1_234_000_000.0), "$1.23B");
        assert_eq!(format_gdp(7_890_000.0), "$7.89M");
        assert_eq!(format_gdp(512.0), "$512.00");
    }

    #[test]
    fn draws_without_a_font() {
        let summary = SummaryInput::from_committed(
            &[rec("Nigeria", Some(5.0e11)), rec("Ghana", Some(1.0e11))],
            Utc::now(),
        );
        let img = draw_summary(&summary, None);
        assert_eq!(img.dimensions(), (WIDTH, HEIGHT));
        assert_eq!(*img.get_pixel(0, 0), Rgba([0x1e, 0x3a, 0x8a, 0xff]));
        // leader bar spans the full width
        let bar_y = (ROW_TOP + 28) as u32;
        assert_eq!(
            *img.get_pixel(BAR_LEFT as u32 + BAR_MAX_WIDTH - 1, bar_y),
            ACCENT
        );

        let garbage = [0u8; 16];
        let img = draw_summary(&summary, Some(&garbage[..]));
        assert_eq!(img.dimensions(), (WIDTH, HEIGHT));
    }

    #[tokio::test]
    async fn render_writes_a_decodable_png() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = PngSummaryRenderer::new(RenderConfig {
            cache_dir: dir.path().join("cache"),
            font_path: None,
        });
        let summary = SummaryInput::from_committed(&[rec("Chile", Some(3.0e9))], Utc::now());

        let path = renderer.render(&summary).await.unwrap();
        assert_eq!(path, dir.path().join("cache").join("summary.png"));

        let bytes = std::fs::read(&path).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (WIDTH, HEIGHT));
        assert_eq!(cache_entries(&dir.path().join("cache")), vec!["summary.png"]);
    }

    fn cache_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_renders_publish_a_complete_image() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = std::sync::Arc::new(PngSummaryRenderer::new(RenderConfig {
            cache_dir: dir.path().to_path_buf(),
            font_path: None,
        }));

        let mut tasks = Vec::new();
        for i in 0..8u32 {
            let renderer = renderer.clone();
            tasks.push(tokio::spawn(async move {
                let gdp = f64::from(i + 1) * 1.0e9;
                let summary = SummaryInput::from_committed(
                    &[rec("Chile", Some(gdp)), rec("Peru", Some(gdp / 3.0))],
                    Utc::now(),
                );
                renderer.render(&summary).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let bytes = std::fs::read(renderer.image_path()).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (WIDTH, HEIGHT));
        assert_eq!(cache_entries(dir.path()), vec!["summary.png"]);
    }

    #[tokio::test]
    async fn unreadable_configured_font_still_renders() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = PngSummaryRenderer::new(RenderConfig {
            cache_dir: dir.path().to_path_buf(),
            font_path: Some(dir.path().join("missing.ttf")),
        });
        let summary = SummaryInput::from_committed(&[], Utc::now());
        assert!(renderer.render(&summary).await.is_ok());
    }
}
