use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};

use super::errors::{ErrorKind, SpecialErrorKind};
use super::run::TideRun;

const WIDTH: u32 = 720;
const HEIGHT: u32 = 360;
const MARGIN: u32 = 30;
const BAR_GAP: u32 = 8;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const GRID: Rgb<u8> = Rgb([220, 220, 220]);
const TICK_LEN: u32 = 6;

fn main_color(kind: ErrorKind) -> Rgb<u8> {
    match kind {
        ErrorKind::Class => Rgb([228, 26, 28]),
        ErrorKind::Box => Rgb([55, 126, 184]),
        ErrorKind::Both => Rgb([77, 175, 74]),
        ErrorKind::Duplicate => Rgb([152, 78, 163]),
        ErrorKind::Background => Rgb([255, 127, 0]),
        ErrorKind::Missed => Rgb([166, 86, 40]),
        ErrorKind::Other => Rgb([153, 153, 153]),
    }
}

fn special_color(kind: SpecialErrorKind) -> Rgb<u8> {
    match kind {
        SpecialErrorKind::FalsePositive => Rgb([247, 129, 191]),
        SpecialErrorKind::FalseNegative => Rgb([100, 100, 100]),
    }
}

/// Render the run's dAP values as a bar chart.
///
/// Slots left to right: Cls (red), Loc (blue), Both (green), Dupe (purple),
/// Bkg (orange), Miss (brown), a divider, then FalsePos (pink) and FalseNeg
/// (grey). Each slot carries its colour swatch below the axis; gridlines mark
/// the dAP scale at 1, 2 or 5 times a power of ten. Negative dAP values draw
/// as empty bars.
pub(crate) fn plot_run(run: &TideRun, out_dir: &Path) -> Result<PathBuf> {
    let mut bars: Vec<Option<(f64, Rgb<u8>)>> = run
        .main_errors()
        .into_iter()
        .map(|(kind, dap)| Some((dap, main_color(kind))))
        .collect();
    bars.push(None);
    bars.extend(
        run.special_errors()
            .into_iter()
            .map(|(kind, dap)| Some((dap, special_color(kind)))),
    );

    let img = render_bars(&bars);
    let file_name = format!("{}_{}_summary.png", file_stem(&run.name), run.mode.name());
    let path = out_dir.join(file_name);
    img.save(&path)
        .map_err(|e| anyhow!("failed to write plot {}: {}", path.display(), e))?;
    Ok(path)
}

fn render_bars(bars: &[Option<(f64, Rgb<u8>)>]) -> RgbImage {
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);
    let plot_w = WIDTH - 2 * MARGIN;
    let plot_h = HEIGHT - 2 * MARGIN;
    let baseline = HEIGHT - MARGIN;

    let max = bars
        .iter()
        .flatten()
        .map(|(value, _)| *value)
        .fold(0.0_f64, f64::max)
        .max(1.0);
    let slot = plot_w / bars.len().max(1) as u32;
    let to_px = |value: f64| ((value / max) * plot_h as f64).round() as u32;

    // Value scale: a gridline and an axis tick every `step` dAP points.
    let step = tick_step(max / 5.0);
    let mut tick = step;
    while tick <= max + 1e-9 {
        let y = baseline.saturating_sub(to_px(tick));
        fill_rect(&mut img, MARGIN, y, WIDTH - MARGIN, y + 1, GRID);
        fill_rect(&mut img, MARGIN - TICK_LEN, y, MARGIN, y + 1, AXIS);
        tick += step;
    }

    for (idx, bar) in bars.iter().enumerate() {
        let left = MARGIN + idx as u32 * slot;
        let Some((value, color)) = bar else {
            // Group divider between the main and special error types.
            fill_rect(&mut img, left, MARGIN, left + 1, baseline, AXIS);
            continue;
        };
        let x0 = left + BAR_GAP / 2;
        let x1 = x0 + slot.saturating_sub(BAR_GAP);

        // Colour key below the axis, drawn for every type including empty bars.
        let key_x0 = left + slot / 4;
        fill_rect(&mut img, key_x0, baseline + 8, key_x0 + slot / 2, baseline + 20, *color);

        if *value <= 0.0 {
            continue;
        }
        fill_rect(&mut img, x0, baseline.saturating_sub(to_px(*value)), x1, baseline, *color);
    }

    fill_rect(&mut img, MARGIN, baseline, WIDTH - MARGIN, baseline + 2, AXIS);
    fill_rect(&mut img, MARGIN - 2, MARGIN, MARGIN, baseline + 2, AXIS);
    img
}

/// Round `raw` up to 1, 2 or 5 times a power of ten.
fn tick_step(raw: f64) -> f64 {
    if raw <= 0.0 {
        return 1.0;
    }
    let magnitude = 10f64.powf(raw.log10().floor());
    let fraction = raw / magnitude;
    let nice = if fraction <= 1.0 {
        1.0
    } else if fraction <= 2.0 {
        2.0
    } else if fraction <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

/// Fill the half-open rectangle `[x0, x1) x [y0, y1)`, clipped to the image.
fn fill_rect(img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    for y in y0.min(h)..y1.min(h) {
        for x in x0.min(w)..x1.min(w) {
            img.put_pixel(x, y, color);
        }
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}
