//! Two-up job combining.
//!
//! Two consecutive 6x4 jobs with identical settings can go out as one
//! 6x8 sheet the printer cuts in half, which is faster and saves ribbon.

use log::{debug, info};

use crate::{
    media::{eligibility, MediaInfo},
    model::Model,
    spool::{cooked_len, matte_len, Job, MULTICUT_NONE, MULTICUT_TWO_UP},
};

const WHITE: u8 = 0xff;

fn compatible(a: &Job, b: &Job) -> bool {
    let (ha, hb) = (&a.header, &b.header);
    !a.raw_format()
        && !b.raw_format()
        && !a.is_processed()
        && !b.is_processed()
        && ha.columns == hb.columns
        && ha.rows == hb.rows
        && ha.laminate == hb.laminate
        && ha.laminate_mode == hb.laminate_mode
        && ha.sharpen == hb.sharpen
        && ha.speed == hb.speed
        && ha.reversed == hb.reversed
        && ha.use_lut == hb.use_lut
        && ha.multicut == MULTICUT_NONE
        && hb.multicut == MULTICUT_NONE
}

/// Merge `a` and `b` onto one two-up sheet, `a` on top.
///
/// Returns `None` when the jobs cannot share a sheet on `model`.
pub fn combine_jobs(model: Model, media: &[MediaInfo], a: &Job, b: &Job) -> Option<Job> {
    if !compatible(a, b) {
        debug!("Jobs differ, not combining");
        return None;
    }
    let layout = model.two_up(a.rows())?;

    let decks = &media[..model.deck_count().min(media.len())];
    let fit = eligibility(layout.rows, decks);
    if !fit.exact.iter().any(|e| *e) {
        debug!("No deck holds media for a {} row sheet, not combining", layout.rows);
        return None;
    }

    let columns = a.columns() as usize;
    let rows = a.rows() as usize;
    let image = columns * rows * 3;
    if a.plane_buffer.len() < image || b.plane_buffer.len() < image {
        return None;
    }

    let mut plane_buffer = Vec::with_capacity(cooked_len(a.columns(), layout.rows));
    plane_buffer.extend_from_slice(&a.plane_buffer[..image]);
    plane_buffer.resize(image + columns * layout.pad_rows as usize * 3, WHITE);
    plane_buffer.extend_from_slice(&b.plane_buffer[..image]);
    plane_buffer.resize(cooked_len(a.columns(), layout.rows), 0);

    let mut header = a.header.clone();
    header.rows = layout.rows;
    header.multicut = MULTICUT_TWO_UP;
    header.deck = 0;

    let matte = if a.has_lamination() {
        header.lam_columns = header.columns;
        header.lam_rows = layout.rows.saturating_add(model.matte_row_pad());
        let total = matte_len(header.lam_columns, header.lam_rows);
        let upper = columns * rows * 2;
        let lower = columns * b.header.lam_rows as usize * 2;
        if a.matte.len() < upper || b.matte.len() < lower {
            return None;
        }

        let mut matte = Vec::with_capacity(total);
        matte.extend_from_slice(&a.matte[..upper]);
        matte.resize(upper + columns * layout.pad_rows as usize * 2, 0);
        matte.extend_from_slice(&b.matte[..lower]);
        matte.resize(total, 0);
        matte
    } else {
        Vec::new()
    };

    let job = Job {
        header,
        plane_buffer,
        matte,
        color_tables: a.color_tables.clone(),
        deck_eligible: fit.eligible,
        deck_exact: fit.exact,
        copies: a.copies,
        processed: false,
    };

    info!(
        "Combined two {}x{} jobs into one {} row sheet",
        a.columns(),
        a.rows(),
        layout.rows
    );
    Some(job)
}
