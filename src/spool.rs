//! Spool format parsing.
//!
//! A job is a 512 byte header followed by the image payload and an
//! optional lamination plane, each padded to a 512 byte boundary.
//!
//! Header layout (multi-byte fields big-endian):
//!
//! | offset | field |
//! |--------|-------|
//! | 0..3   | magic `1b 5a 54` |
//! | 3      | submodel |
//! | 4..6   | job id, filled in on transmit |
//! | 12..14 | columns |
//! | 14..16 | rows |
//! | 16..18 | lamination columns |
//! | 18..20 | lamination rows |
//! | 20     | speed |
//! | 28     | deck (0 auto, 1 lower, 2 upper) |
//! | 36     | laminate enable |
//! | 37     | laminate mode (0 glossy, 2 matte) |
//! | 44     | multicut |
//! | 52     | RGB balance rate |
//! | 53     | overcoat operating rate |
//! | 57..61 | private: sharpen, mode, use LUT, reversed |
//!
//! The private bytes never reach the printer.

use log::{debug, info, warn};
use std::io::{ErrorKind, Read};

use crate::{
    error::Error,
    media::{eligibility, MediaInfo, MAX_DECKS},
    model::Model,
};

pub const HEADER_LEN: usize = 512;
pub const BLOCK_LEN: usize = 512;

const MAGIC: [u8; 3] = [0x1b, 0x5a, 0x54];
const WAKEUP_MAGIC: [u8; 4] = [0x1b, 0x45, 0x57, 0x55];

const OFF_SUBMODEL: usize = 3;
const OFF_JOB_ID: usize = 4;
const OFF_COLUMNS: usize = 12;
const OFF_ROWS: usize = 14;
const OFF_LAM_COLUMNS: usize = 16;
const OFF_LAM_ROWS: usize = 18;
const OFF_SPEED: usize = 20;
const OFF_DECK: usize = 28;
const OFF_LAMINATE: usize = 36;
const OFF_LAMINATE_MODE: usize = 37;
const OFF_MULTICUT: usize = 44;
const OFF_RGB_RATE: usize = 52;
const OFF_OC_RATE: usize = 53;
const OFF_SHARPEN: usize = 57;
const OFF_MODE: usize = 58;
const OFF_USE_LUT: usize = 59;
const OFF_REVERSED: usize = 60;

/// Widest image any supported printer accepts.
pub const MAX_COLUMNS: u16 = 2048;
/// Longest image any supported media takes (6x9).
pub const MAX_ROWS: u16 = 2730;

pub const LAMINATE_GLOSSY: u8 = 0x00;
pub const LAMINATE_MATTE: u8 = 0x02;
pub const MULTICUT_NONE: u8 = 0x00;
pub const MULTICUT_TWO_UP: u8 = 0x01;

/// Round up to the printer's 512 byte block size.
pub fn align_block(len: usize) -> usize {
    (len + BLOCK_LEN - 1) / BLOCK_LEN * BLOCK_LEN
}

/// One 16-bit color plane, padded.
pub fn raw_plane_len(columns: u16, rows: u16) -> usize {
    align_block(columns as usize * rows as usize * 2)
}

/// Packed 8-bit RGB awaiting color processing, padded.
pub fn cooked_len(columns: u16, rows: u16) -> usize {
    align_block(columns as usize * rows as usize * 3)
}

/// Lamination plane, padded.
pub fn matte_len(lam_columns: u16, lam_rows: u16) -> usize {
    align_block(lam_columns as usize * lam_rows as usize * 2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintSpeed {
    Standard,
    SuperFine,
    UltraFine,
}

impl PrintSpeed {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Standard),
            0x03 => Some(Self::SuperFine),
            0x04 => Some(Self::UltraFine),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Standard => 0x00,
            Self::SuperFine => 0x03,
            Self::UltraFine => 0x04,
        }
    }

    fn table_letter(&self) -> char {
        match self {
            Self::Standard => 'N',
            Self::SuperFine => 'S',
            Self::UltraFine => 'U',
        }
    }
}

/// Decoded primary job header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpoolHeader {
    pub submodel: u8,
    pub job_id: u16,
    pub columns: u16,
    pub rows: u16,
    pub lam_columns: u16,
    pub lam_rows: u16,
    pub speed: u8,
    pub deck: u8,
    pub laminate: u8,
    pub laminate_mode: u8,
    pub multicut: u8,
    pub rgb_rate: u8,
    pub oc_rate: u8,
    // backend private
    pub sharpen: u8,
    pub mode: u8,
    pub use_lut: u8,
    pub reversed: u8,
}

fn be16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn put_be16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

impl SpoolHeader {
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < HEADER_LEN || buf[..3] != MAGIC {
            return Err(Error::UnrecognizedFormat);
        }
        Ok(SpoolHeader {
            submodel: buf[OFF_SUBMODEL],
            job_id: be16(buf, OFF_JOB_ID),
            columns: be16(buf, OFF_COLUMNS),
            rows: be16(buf, OFF_ROWS),
            lam_columns: be16(buf, OFF_LAM_COLUMNS),
            lam_rows: be16(buf, OFF_LAM_ROWS),
            speed: buf[OFF_SPEED],
            deck: buf[OFF_DECK],
            laminate: buf[OFF_LAMINATE],
            laminate_mode: buf[OFF_LAMINATE_MODE],
            multicut: buf[OFF_MULTICUT],
            rgb_rate: buf[OFF_RGB_RATE],
            oc_rate: buf[OFF_OC_RATE],
            sharpen: buf[OFF_SHARPEN],
            mode: buf[OFF_MODE],
            use_lut: buf[OFF_USE_LUT],
            reversed: buf[OFF_REVERSED],
        })
    }

    /// Serialize including the backend private bytes.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = self.encode_for_device();
        buf[OFF_SHARPEN] = self.sharpen;
        buf[OFF_MODE] = self.mode;
        buf[OFF_USE_LUT] = self.use_lut;
        buf[OFF_REVERSED] = self.reversed;
        buf
    }

    /// Serialize the header as the printer expects it.
    pub fn encode_for_device(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..3].copy_from_slice(&MAGIC);
        buf[OFF_SUBMODEL] = self.submodel;
        put_be16(&mut buf, OFF_JOB_ID, self.job_id);
        put_be16(&mut buf, OFF_COLUMNS, self.columns);
        put_be16(&mut buf, OFF_ROWS, self.rows);
        put_be16(&mut buf, OFF_LAM_COLUMNS, self.lam_columns);
        put_be16(&mut buf, OFF_LAM_ROWS, self.lam_rows);
        buf[OFF_SPEED] = self.speed;
        buf[OFF_DECK] = self.deck;
        buf[OFF_LAMINATE] = self.laminate;
        buf[OFF_LAMINATE_MODE] = self.laminate_mode;
        buf[OFF_MULTICUT] = self.multicut;
        buf[OFF_RGB_RATE] = self.rgb_rate;
        buf[OFF_OC_RATE] = self.oc_rate;
        buf
    }
}

/// Correction tables a cooked job asks for, as file names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColorTables {
    pub lut: Option<String>,
    pub cpc: Option<String>,
    pub secondary_cpc: Option<String>,
}

impl ColorTables {
    /// Default tables for a model at a given speed.
    pub fn for_model(model: Model, speed: PrintSpeed, use_lut: bool) -> Self {
        let prefix = model.table_prefix();
        ColorTables {
            lut: if use_lut && model.has_lut() {
                Some(format!("{}L01.lut", prefix))
            } else {
                None
            },
            cpc: Some(format!("{}{}01.cpc", prefix, speed.table_letter())),
            secondary_cpc: if model.has_secondary_cpc() && speed == PrintSpeed::SuperFine {
                Some(format!("{}E01.cpc", prefix))
            } else {
                None
            },
        }
    }
}

/// One print request.
#[derive(Debug, Clone)]
pub struct Job {
    pub header: SpoolHeader,
    /// Packed RGB for cooked jobs, three padded 16-bit planes otherwise.
    pub plane_buffer: Vec<u8>,
    /// Lamination plane, empty when lamination is off.
    pub matte: Vec<u8>,
    pub color_tables: ColorTables,
    pub deck_eligible: [bool; MAX_DECKS],
    pub deck_exact: [bool; MAX_DECKS],
    /// Copies still to print.
    pub copies: u32,
    pub(crate) processed: bool,
}

impl Job {
    pub fn columns(&self) -> u16 {
        self.header.columns
    }

    pub fn rows(&self) -> u16 {
        self.header.rows
    }

    pub fn matte_length(&self) -> usize {
        self.matte.len()
    }

    pub fn sharpen_level(&self) -> u8 {
        self.header.sharpen
    }

    pub fn reversed(&self) -> bool {
        self.header.reversed != 0
    }

    pub fn multicut_mode(&self) -> u8 {
        self.header.multicut
    }

    /// Planes arrived ready to send.
    pub fn raw_format(&self) -> bool {
        self.header.mode != 0
    }

    pub fn use_lut(&self) -> bool {
        self.header.use_lut != 0
    }

    pub fn speed(&self) -> PrintSpeed {
        PrintSpeed::from_code(self.header.speed).unwrap_or(PrintSpeed::Standard)
    }

    pub fn has_lamination(&self) -> bool {
        self.header.laminate != 0
    }

    /// Deck index the job asked for, `None` for automatic.
    pub fn requested_deck(&self) -> Option<usize> {
        match self.header.deck {
            0 => None,
            n => Some(n as usize - 1),
        }
    }

    /// Cooked data still waiting for the color engine.
    pub fn needs_processing(&self) -> bool {
        !self.raw_format() && !self.processed
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn update_eligibility(&mut self, media: &[MediaInfo]) {
        let e = eligibility(self.rows(), media);
        self.deck_eligible = e.eligible;
        self.deck_exact = e.exact;
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, Error> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(total)
}

fn read_payload<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, Error> {
    let mut buf = vec![0u8; len];
    let n = read_full(reader, &mut buf)?;
    if n != len {
        return Err(Error::TruncatedStream {
            expected: len,
            read: n,
        });
    }
    Ok(buf)
}

/// Read one job from the spool stream.
///
/// Returns `Ok(None)` when the stream ends cleanly between jobs.
pub fn parse_job<R: Read>(
    reader: &mut R,
    copies: u32,
    model: Model,
    media: &[MediaInfo],
) -> Result<Option<Job>, Error> {
    let mut buf = [0u8; HEADER_LEN];

    loop {
        let n = read_full(reader, &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        if n != HEADER_LEN {
            return Err(Error::TruncatedStream {
                expected: HEADER_LEN,
                read: n,
            });
        }
        if buf[..4] == WAKEUP_MAGIC {
            debug!("Skipping wake-up header");
            continue;
        }
        break;
    }

    let mut header = SpoolHeader::decode(&buf)?;
    if header.columns == 0 || header.rows == 0 {
        debug!("Empty image {}x{}", header.columns, header.rows);
        return Err(Error::UnrecognizedFormat);
    }
    if header.columns > MAX_COLUMNS || header.rows > MAX_ROWS {
        debug!(
            "Image {}x{} exceeds {}x{}",
            header.columns, header.rows, MAX_COLUMNS, MAX_ROWS
        );
        return Err(Error::UnrecognizedFormat);
    }

    if header.submodel != model.submodel() {
        warn!(
            "Job header submodel {:02x} does not match {} ({:02x}), overriding",
            header.submodel,
            model,
            model.submodel()
        );
        header.submodel = model.submodel();
    }
    if header.deck as usize > model.deck_count() {
        warn!(
            "Job asks for deck {} on a {} deck printer, using automatic",
            header.deck,
            model.deck_count()
        );
        header.deck = 0;
    }
    let speed = match PrintSpeed::from_code(header.speed) {
        Some(speed) => speed,
        None => {
            warn!("Unknown print speed {:02x}, using standard", header.speed);
            header.speed = PrintSpeed::Standard.code();
            PrintSpeed::Standard
        }
    };
    if header.laminate != 0 {
        header.lam_columns = header.columns;
        header.lam_rows = header.rows.saturating_add(model.matte_row_pad());
    } else {
        header.lam_columns = 0;
        header.lam_rows = 0;
    }

    let raw_format = header.mode != 0;
    let plane_len = if raw_format {
        raw_plane_len(header.columns, header.rows) * 3
    } else {
        cooked_len(header.columns, header.rows)
    };
    let plane_buffer = read_payload(reader, plane_len)?;
    let matte = if header.laminate != 0 {
        read_payload(reader, matte_len(header.lam_columns, header.lam_rows))?
    } else {
        Vec::new()
    };

    let color_tables = if raw_format {
        ColorTables::default()
    } else {
        ColorTables::for_model(model, speed, header.use_lut != 0)
    };

    let mut job = Job {
        header,
        plane_buffer,
        matte,
        color_tables,
        deck_eligible: [false; MAX_DECKS],
        deck_exact: [false; MAX_DECKS],
        copies,
        processed: false,
    };
    job.update_eligibility(&media[..model.deck_count().min(media.len())]);

    info!(
        "Job {}x{} ({}), {} bytes of planes, matte {} bytes, {} copies",
        job.columns(),
        job.rows(),
        if raw_format { "raw" } else { "cooked" },
        job.plane_buffer.len(),
        job.matte_length(),
        copies
    );
    Ok(Some(job))
}
