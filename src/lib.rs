//! Dye-Sublimation Printer Backend
//!
//! This crate drives Mitsubishi CP-D70 family dye-sublimation photo
//! printers (CP-D70DW, CP-D707DW, CP-K60DW-S, CP-D80DW, Kodak 305 and
//! ASK-300): it parses spooled print jobs, optionally merges two 6x4
//! jobs onto one 6x8 sheet, picks a deck with suitable media and walks
//! each job through to completion.
//!
//! # Example
//!
//! ```rust,no_run
//! use dyesub::{Config, Model, Printer};
//! use std::fs::File;
//!
//! let config = Config::new(Model::D707, "serial".to_string());
//! let mut printer = Printer::open(config, None).unwrap();
//! let mut spool = File::open("job.bin").unwrap();
//! while let Some(job) = printer.parse_job(&mut spool, 1).unwrap() {
//!     printer.print(job).unwrap();
//! }
//! ```

mod color;
mod combine;
mod deck;
mod error;
mod media;
mod model;
mod printer;
mod protocol;
mod spool;
mod status;
mod transport;

pub use crate::{
    color::{
        assemble_planes, ColorEngine, ColorEngineError, ColorPipeline, CpcHandle, DeviceSink,
        EffectParams, LutHandle, PixelLayout, Planes, SEND_CALLBACK_API,
    },
    combine::combine_jobs,
    deck::{pick_deck, select_decks, DeckMask, DeckSelection},
    error::{DeviceFault, Error, Outcome},
    media::{eligibility, Eligibility, Fit, MediaInfo, MediaSpec, MAX_DECKS},
    model::{Model, TwoUp},
    printer::{Config, Printer, Sleeper, ThreadSleeper, DEFAULT_ASSET_DIR, POLL_INTERVAL},
    protocol::{Client, CHUNK_SIZE},
    spool::{parse_job, ColorTables, Job, PrintSpeed, SpoolHeader},
    transport::{Transport, UsbTransport},
};

/// Wire-level helpers for building and checking raw frames.
pub mod wire {
    pub use crate::protocol::{
        cancel_cmd, job_status_cmd, memory_status_cmd, reply_magic, wakeup_cmd,
        MEDIA_STATUS_LEN, SERIAL_LEN, WAKEUP_LEN,
    };
    pub use crate::spool::{
        align_block, cooked_len, matte_len, raw_plane_len, BLOCK_LEN, HEADER_LEN,
        LAMINATE_GLOSSY, LAMINATE_MATTE, MAX_COLUMNS, MAX_ROWS, MULTICUT_NONE, MULTICUT_TWO_UP,
    };
    pub use crate::status::*;
}
