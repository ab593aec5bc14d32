//! Rendering of image grids and loss curves to PNG
//!
//! Images arrive as (N, 3, H, W) tensors in some [`FeatureRange`]; grids are
//! laid out row by row with a one-pixel gutter. Loss curves are charted with
//! plotters.

use std::path::Path;

use anyhow::{bail, Context, Result};
use image::{imageops, Rgb, RgbImage};
use plotters::prelude::*;
use tch::Tensor;

use crate::data::{to_pixels, FeatureRange};
use crate::training::LossRecord;

const GUTTER: u32 = 1;
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Discriminator curve colour
pub const DISC_COLOUR: RGBColor = RGBColor(31, 119, 180);
/// Generator curve colour
pub const GEN_COLOUR: RGBColor = RGBColor(255, 127, 14);

const PLOT_DIMS: (u32, u32) = (800, 400);
const FONT: &str = "sans-serif";
const TITLE_FONT_SIZE: i32 = 24;
const MARGIN: i32 = 10;
const X_LABEL_AREA_SIZE: i32 = 40;
const Y_LABEL_AREA_SIZE: i32 = 50;
const LINE_STROKE_WIDTH: u32 = 2;
const LEGEND_LINE_LENGTH: i32 = 20;

/// Lay out a batch of images into a grid with `cols` columns
///
/// # Arguments
///
/// * `images` - Tensor of shape (N, 3, H, W)
/// * `cols` - Images per row; rows are added as needed
/// * `range` - Value range of `images`
pub fn image_grid(images: &Tensor, cols: usize, range: FeatureRange) -> Result<RgbImage> {
    let size = images.size();
    if size.len() != 4 || size[1] != 3 {
        bail!("expected images of shape (N, 3, H, W), got {:?}", size);
    }

    let (n, h, w) = (size[0] as usize, size[2] as usize, size[3] as usize);
    if n == 0 {
        bail!("cannot render an empty batch");
    }

    let cols = cols.clamp(1, n);
    let rows = n.div_ceil(cols);
    let pixels = to_pixels(images, range)?;

    let width = (cols * w) as u32 + GUTTER * (cols as u32 - 1);
    let height = (rows * h) as u32 + GUTTER * (rows as u32 - 1);
    let mut grid = RgbImage::from_pixel(width, height, BACKGROUND);

    let plane = h * w;
    for idx in 0..n {
        let (row, col) = (idx / cols, idx % cols);
        let x0 = (col * w) as u32 + GUTTER * col as u32;
        let y0 = (row * h) as u32 + GUTTER * row as u32;
        let base = idx * 3 * plane;

        for y in 0..h {
            for x in 0..w {
                let offset = base + y * w + x;
                let rgb = [pixels[offset], pixels[offset + plane], pixels[offset + 2 * plane]];
                grid.put_pixel(x0 + x as u32, y0 + y as u32, Rgb(rgb));
            }
        }
    }

    Ok(grid)
}

/// Render a grid and write it as PNG, enlarged by `upscale` (nearest neighbour)
pub fn save_image_grid<P: AsRef<Path>>(
    images: &Tensor,
    cols: usize,
    range: FeatureRange,
    upscale: u32,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    let grid = image_grid(images, cols, range)?;
    let grid = if upscale > 1 {
        imageops::resize(
            &grid,
            grid.width() * upscale,
            grid.height() * upscale,
            imageops::FilterType::Nearest,
        )
    } else {
        grid
    };

    grid.save(path).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Line chart of discriminator and generator losses over the logged steps
///
/// Non-finite values are drawn at the top of the chart.
pub fn plot_losses<P: AsRef<Path>>(records: &[LossRecord], path: P) -> Result<()> {
    let path = path.as_ref();
    if records.is_empty() {
        bail!("no losses to plot");
    }

    let max_loss = records
        .iter()
        .flat_map(|r| [r.d_loss, r.g_loss])
        .filter(|v| v.is_finite())
        .fold(0.0f64, f64::max)
        .max(1e-6);
    let x_max = (records.len().max(2) - 1) as i32;

    let root = BitMapBackend::new(path, PLOT_DIMS).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Training Losses", (FONT, TITLE_FONT_SIZE))
        .margin(MARGIN)
        .x_label_area_size(X_LABEL_AREA_SIZE)
        .y_label_area_size(Y_LABEL_AREA_SIZE)
        .build_cartesian_2d(0..x_max, 0.0..max_loss * 1.05)?;

    chart
        .configure_mesh()
        .x_desc("Logged step")
        .y_desc("Loss")
        .draw()?;

    let series: [(&str, RGBColor, fn(&LossRecord) -> f64); 2] = [
        ("Discriminator", DISC_COLOUR, |r| r.d_loss),
        ("Generator", GEN_COLOUR, |r| r.g_loss),
    ];

    for (label, colour, value) in series {
        chart
            .draw_series(LineSeries::new(
                records
                    .iter()
                    .enumerate()
                    .map(|(x, r)| (x as i32, value(r).min(max_loss))),
                ShapeStyle::from(colour).stroke_width(LINE_STROKE_WIDTH),
            ))?
            .label(label)
            .legend(move |(x, y)| {
                PathElement::new(
                    [(x, y), (x + LEGEND_LINE_LENGTH, y)],
                    ShapeStyle::from(colour).stroke_width(LINE_STROKE_WIDTH),
                )
            });
    }

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    root.present()
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
