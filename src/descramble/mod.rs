//! Reverse tile-permutation obfuscation applied by sources to hinder
//! straightforward scraping.
//!
//! `plan_steps` is a pure function: given the same (identifier, width,
//! height, scheme) it always produces the same step list, which is what makes
//! plan caching sound. The compositing half lives in [`apply_steps`].

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Closed, versioned set of obfuscation schemes. Adding a new source scheme
/// means adding one variant plus one planner case, never changing existing
/// cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrambleScheme {
    /// Horizontal strips stacked in reverse order; strip count keyed by the
    /// chapter id and image name. Identifier: `"{chapterId}/{imageName}"`.
    Strips,
    /// Square cell grid permuted by a keyed ordering; cut count from the
    /// numeric id modulo a small constant. Identifier: `"{chapterId}"`.
    Grid,
}

/// One rectangular copy operation. A compositor replays these in order onto
/// a destination surface to reconstruct the original image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyStep {
    pub source_x: u32,
    pub source_y: u32,
    pub source_width: u32,
    pub source_height: u32,
    pub dest_x: u32,
    pub dest_y: u32,
    pub dest_width: u32,
    pub dest_height: u32,
}

impl CopyStep {
    fn full_frame(width: u32, height: u32) -> Self {
        Self {
            source_x: 0,
            source_y: 0,
            source_width: width,
            source_height: height,
            dest_x: 0,
            dest_y: 0,
            dest_width: width,
            dest_height: height,
        }
    }
}

/// Compute the ordered copy steps that reassemble an obfuscated image.
///
/// Absent or unusable inputs degrade to the identity plan (a single
/// full-frame copy), never an error.
pub fn plan_steps(
    identifier: &str,
    width: u32,
    height: u32,
    scheme: Option<ScrambleScheme>,
) -> Vec<CopyStep> {
    if width == 0 || height == 0 {
        return Vec::new();
    }

    match scheme {
        None => vec![CopyStep::full_frame(width, height)],
        Some(ScrambleScheme::Strips) => strips_plan(identifier, width, height),
        Some(ScrambleScheme::Grid) => grid_plan(identifier, width, height),
    }
}

/// Replay a plan onto a fresh destination surface.
pub fn apply_steps(source: &RgbaImage, steps: &[CopyStep]) -> RgbaImage {
    let dest_width = steps
        .iter()
        .map(|s| s.dest_x + s.dest_width)
        .max()
        .unwrap_or(0);
    let dest_height = steps
        .iter()
        .map(|s| s.dest_y + s.dest_height)
        .max()
        .unwrap_or(0);

    let (src_width, src_height) = source.dimensions();
    let src_row = (src_width * 4) as usize;
    let dst_row = (dest_width * 4) as usize;
    let raw = source.as_raw();
    let mut out = vec![0u8; dst_row * dest_height as usize];

    for step in steps {
        let copy_width = step.source_width.min(step.dest_width);
        let copy_height = step.source_height.min(step.dest_height);
        for dy in 0..copy_height {
            let sy = step.source_y + dy;
            let ty = step.dest_y + dy;
            if sy >= src_height || ty >= dest_height {
                break;
            }
            let sw = copy_width.min(src_width.saturating_sub(step.source_x));
            let tw = sw.min(dest_width.saturating_sub(step.dest_x));
            if tw == 0 {
                continue;
            }
            let src_off = sy as usize * src_row + step.source_x as usize * 4;
            let dst_off = ty as usize * dst_row + step.dest_x as usize * 4;
            let bytes = tw as usize * 4;
            out[dst_off..dst_off + bytes].copy_from_slice(&raw[src_off..src_off + bytes]);
        }
    }

    RgbaImage::from_raw(dest_width, dest_height, out)
        .unwrap_or_else(|| RgbaImage::new(dest_width, dest_height))
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

// Chapter ids below this are always cut into ten strips.
const STRIPS_LEGACY_THRESHOLD: i64 = 268_850;
// Above this the keyed count switches from mod 10 to mod 8.
const STRIPS_MOD8_THRESHOLD: i64 = 421_926;

fn strips_segment_count(chapter_id: i64, image_name: &str) -> u32 {
    if chapter_id < STRIPS_LEGACY_THRESHOLD {
        return 10;
    }

    let digest = md5_hex(&format!("{chapter_id}{image_name}"));
    let last = digest.as_bytes().last().copied().unwrap_or(b'0') as i64;

    let num = if chapter_id > STRIPS_MOD8_THRESHOLD {
        last % 8
    } else {
        last % 10
    };
    (num * 2 + 2) as u32
}

fn strips_plan(identifier: &str, width: u32, height: u32) -> Vec<CopyStep> {
    let Some((chapter, name)) = identifier.split_once('/') else {
        return vec![CopyStep::full_frame(width, height)];
    };
    let Ok(chapter_id) = chapter.parse::<i64>() else {
        return vec![CopyStep::full_frame(width, height)];
    };

    let count = strips_segment_count(chapter_id, name);
    if count <= 1 || height < count {
        return vec![CopyStep::full_frame(width, height)];
    }

    let strip_height = height / count;
    let remainder = height % count;

    // Source boundaries ascending; the remainder rows belong to the last
    // strip, matching the site's cut.
    let mut blocks = Vec::with_capacity(count as usize);
    for i in 0..count {
        let start = strip_height * i;
        let mut end = strip_height * (i + 1);
        if i == count - 1 {
            end += remainder;
        }
        blocks.push((start, end));
    }

    // The obfuscation stacks strips bottom-up; reading them back in reverse
    // order restores the page top-down.
    let mut steps = Vec::with_capacity(count as usize);
    let mut y = 0u32;
    for (start, end) in blocks.into_iter().rev() {
        let segment = end - start;
        if segment == 0 {
            continue;
        }
        steps.push(CopyStep {
            source_x: 0,
            source_y: start,
            source_width: width,
            source_height: segment,
            dest_x: 0,
            dest_y: y,
            dest_width: width,
            dest_height: segment,
        });
        y += segment;
    }
    steps
}

// Grid cut count stays small: 2..=5 cells per axis.
const GRID_CUT_MODULUS: i64 = 4;

fn grid_cell_order(id: i64, cells: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..cells).collect();
    order.sort_by_key(|&cell| (md5_hex(&format!("{id}:{cell}")), cell));
    order
}

fn grid_plan(identifier: &str, width: u32, height: u32) -> Vec<CopyStep> {
    let Ok(id) = identifier.parse::<i64>() else {
        return vec![CopyStep::full_frame(width, height)];
    };

    let cuts = (id.rem_euclid(GRID_CUT_MODULUS) + 2) as u32;
    let cell_width = width / cuts;
    let cell_height = height / cuts;
    if cell_width == 0 || cell_height == 0 {
        return vec![CopyStep::full_frame(width, height)];
    }

    let cells = (cuts * cuts) as usize;
    let order = grid_cell_order(id, cells);

    // Scrambled slot k holds the original tile order[k]; copying slot k back
    // to slot order[k] restores the grid.
    let slot = |index: usize| -> (u32, u32) {
        let col = (index as u32) % cuts;
        let row = (index as u32) / cuts;
        (col * cell_width, row * cell_height)
    };

    let mut steps = Vec::with_capacity(cells + 2);
    for (k, &target) in order.iter().enumerate() {
        let (sx, sy) = slot(k);
        let (dx, dy) = slot(target);
        steps.push(CopyStep {
            source_x: sx,
            source_y: sy,
            source_width: cell_width,
            source_height: cell_height,
            dest_x: dx,
            dest_y: dy,
            dest_width: cell_width,
            dest_height: cell_height,
        });
    }

    // Right and bottom remainder strips are never permuted by the site; they
    // pass through in place so the plan tiles the destination exactly.
    let grid_width = cell_width * cuts;
    let grid_height = cell_height * cuts;
    if grid_width < width {
        steps.push(CopyStep {
            source_x: grid_width,
            source_y: 0,
            source_width: width - grid_width,
            source_height: height,
            dest_x: grid_width,
            dest_y: 0,
            dest_width: width - grid_width,
            dest_height: height,
        });
    }
    if grid_height < height {
        steps.push(CopyStep {
            source_x: 0,
            source_y: grid_height,
            source_width: grid_width,
            source_height: height - grid_height,
            dest_x: 0,
            dest_y: grid_height,
            dest_width: grid_width,
            dest_height: height - grid_height,
        });
    }
    steps
}
