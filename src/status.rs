//! Status and error code tables.
//!
//! Pure lookups from the raw bytes the printer reports to names an
//! operator can act on, plus the decoded status structures.

use crate::error::DeviceFault;
use crate::media::MAX_DECKS;
use std::fmt;

// Power
pub const POWER_ON: u8 = 0x00;
pub const POWER_SLEEP: u8 = 0x01;
pub const POWER_DEEP_SLEEP: u8 = 0x02;

// Mechanism, first byte
pub const MECHA_IDLE: u8 = 0x00;
pub const MECHA_LOAD: u8 = 0x40;
pub const MECHA_FEED: u8 = 0x50;
pub const MECHA_PRINT: u8 = 0x60;
pub const MECHA_EJECT: u8 = 0x70;
pub const MECHA_INIT: u8 = 0x80;

// Head temperature
pub const TEMPERATURE_NORMAL: u8 = 0x00;
pub const TEMPERATURE_PREHEAT: u8 = 0x40;
pub const TEMPERATURE_COOLING: u8 = 0x80;

// Job state, first byte of the triplet
pub const JOB_STATUS0_NONE: u8 = 0x00;
pub const JOB_STATUS0_DATA: u8 = 0x10;
pub const JOB_STATUS0_QUEUE: u8 = 0x20;
pub const JOB_STATUS0_PRINT: u8 = 0x50;
pub const JOB_STATUS0_ASSIGN: u8 = 0x70;
pub const JOB_STATUS0_END: u8 = 0x80;

// Printing phase
pub const JOB_STATUS1_PRINT_MEDIALOAD: u8 = 0x10;
pub const JOB_STATUS1_PRINT_PRE_Y: u8 = 0x20;
pub const JOB_STATUS1_PRINT_Y: u8 = 0x30;
pub const JOB_STATUS1_PRINT_PRE_M: u8 = 0x40;
pub const JOB_STATUS1_PRINT_M: u8 = 0x50;
pub const JOB_STATUS1_PRINT_PRE_C: u8 = 0x60;
pub const JOB_STATUS1_PRINT_C: u8 = 0x70;
pub const JOB_STATUS1_PRINT_PRE_OC: u8 = 0x80;
pub const JOB_STATUS1_PRINT_OC: u8 = 0x90;
pub const JOB_STATUS1_PRINT_EJECT: u8 = 0xA0;

// End reason
pub const JOB_STATUS1_END_OK: u8 = 0x00;
pub const JOB_STATUS1_END_MECHA: u8 = 0x10;
pub const JOB_STATUS1_END_HEADER: u8 = 0x20;
pub const JOB_STATUS1_END_PRINT: u8 = 0x30;
pub const JOB_STATUS1_END_INTERRUPT: u8 = 0x40;

// Header rejection detail
pub const JOB_STATUS2_END_HEADER_SIZE: u8 = 0x01;
pub const JOB_STATUS2_END_HEADER_MEMORY: u8 = 0x02;
pub const JOB_STATUS2_END_HEADER_MEDIA: u8 = 0x03;

pub fn power_name(code: u8) -> &'static str {
    match code {
        POWER_ON => "On",
        POWER_SLEEP => "Sleeping",
        POWER_DEEP_SLEEP => "Deep sleep",
        _ => "Unknown",
    }
}

pub fn is_asleep(power: u8) -> bool {
    power == POWER_SLEEP || power == POWER_DEEP_SLEEP
}

pub fn mecha_name(mecha: [u8; 2]) -> &'static str {
    match mecha[0] {
        MECHA_IDLE => "Idle",
        MECHA_LOAD => "Loading media",
        MECHA_FEED => "Feeding media",
        MECHA_PRINT => "Printing",
        MECHA_EJECT => "Ejecting",
        MECHA_INIT => "Initializing",
        _ => "Unknown",
    }
}

pub fn temperature_name(code: u8) -> &'static str {
    match code {
        TEMPERATURE_NORMAL => "Normal",
        TEMPERATURE_PREHEAT => "Warming up",
        TEMPERATURE_COOLING => "Cooling down",
        _ => "Unknown",
    }
}

pub fn error_class(code: u8) -> &'static str {
    match code {
        0x00 => "None",
        0x01 => "Paper",
        0x02 => "Ribbon",
        0x03 => "Setting",
        0x05 => "Door open",
        0x06 => "Scrap bin",
        0x07 => "Paper jam",
        0x08 => "Ribbon system",
        0x09 => "Mechanical",
        0x0A => "Electrical",
        0x0E => "Firmware",
        0x0F => "Other",
        _ => "Unknown class",
    }
}

pub fn error_instance(code: u8) -> &'static str {
    match code {
        0x00 => "No error",
        0x01 => "Scrap bin missing",
        0x02 => "No ribbon",
        0x03 => "No paper",
        0x04 => "Ribbon/Paper mismatch",
        0x05 => "Ribbon count exhausted",
        0x11 => "Unsupported ribbon",
        0x12 => "Bad job parameters",
        0x13 => "Paper end",
        0x21 => "Ribbon end",
        0x31 => "Door open while idle",
        0x32 => "Door open while printing",
        0x33 => "Power lost while printing",
        0x41 => "Ribbon skipped",
        0x42 => "Ribbon cut",
        0x51 => "Paper jam at feed",
        0x52 => "Paper jam at cutter",
        0x53 => "Paper jam at eject",
        0x61 => "Head overheated",
        0x62 => "Motor fault",
        0x71 => "Firmware fault",
        _ => "Unknown error",
    }
}

pub fn error_recovery(code: u8) -> &'static str {
    match code {
        0x00 => "Recovers automatically",
        0x01 => "Reset printer",
        0x02 => "Close door",
        0x03 => "Change ribbon",
        0x04 => "Change paper",
        0x05 => "Change paper and ribbon",
        0x06 => "Clear paper jam",
        0x07 => "Empty scrap bin",
        0x08 => "Contact service",
        _ => "Unknown recovery",
    }
}

/// Job state triplet: state plus two phase detail bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobState {
    pub state: u8,
    pub sub1: u8,
    pub sub2: u8,
}

impl JobState {
    pub fn new(state: u8, sub1: u8, sub2: u8) -> Self {
        JobState { state, sub1, sub2 }
    }

    pub fn is_none(&self) -> bool {
        self.state == JOB_STATUS0_NONE
    }

    pub fn is_end(&self) -> bool {
        self.state == JOB_STATUS0_END
    }

    pub fn is_end_ok(&self) -> bool {
        self.is_end() && self.sub1 == JOB_STATUS1_END_OK
    }

    /// The device has begun putting ink on paper.
    pub fn is_printing(&self) -> bool {
        self.state == JOB_STATUS0_PRINT || self.state == JOB_STATUS0_ASSIGN
    }

    pub fn describe(&self) -> String {
        match self.state {
            JOB_STATUS0_NONE => "No job".to_string(),
            JOB_STATUS0_DATA => "Receiving data".to_string(),
            JOB_STATUS0_QUEUE => "Queued".to_string(),
            JOB_STATUS0_ASSIGN => "Assigned to deck".to_string(),
            JOB_STATUS0_PRINT => format!("Printing: {}", print_phase(self.sub1)),
            JOB_STATUS0_END => match self.sub1 {
                JOB_STATUS1_END_OK => "Completed".to_string(),
                JOB_STATUS1_END_HEADER => {
                    format!("Aborted: {}", header_rejection(self.sub2))
                }
                other => format!("Aborted: {}", end_reason(other)),
            },
            other => format!("Unknown state {:02x}", other),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

pub fn print_phase(code: u8) -> &'static str {
    match code {
        JOB_STATUS1_PRINT_MEDIALOAD => "Media load",
        JOB_STATUS1_PRINT_PRE_Y => "Waiting (Y)",
        JOB_STATUS1_PRINT_Y => "Printing yellow plane",
        JOB_STATUS1_PRINT_PRE_M => "Waiting (M)",
        JOB_STATUS1_PRINT_M => "Printing magenta plane",
        JOB_STATUS1_PRINT_PRE_C => "Waiting (C)",
        JOB_STATUS1_PRINT_C => "Printing cyan plane",
        JOB_STATUS1_PRINT_PRE_OC => "Waiting (OC)",
        JOB_STATUS1_PRINT_OC => "Applying overcoat",
        JOB_STATUS1_PRINT_EJECT => "Ejecting",
        _ => "Unknown phase",
    }
}

pub fn end_reason(code: u8) -> &'static str {
    match code {
        JOB_STATUS1_END_OK => "Normal",
        JOB_STATUS1_END_MECHA => "Mechanical error",
        JOB_STATUS1_END_HEADER => "Header error",
        JOB_STATUS1_END_PRINT => "Print error",
        JOB_STATUS1_END_INTERRUPT => "Interrupted",
        _ => "Unknown",
    }
}

pub fn header_rejection(code: u8) -> &'static str {
    match code {
        JOB_STATUS2_END_HEADER_SIZE => "Unsupported print size",
        JOB_STATUS2_END_HEADER_MEMORY => "Insufficient memory",
        JOB_STATUS2_END_HEADER_MEDIA => "Media mismatch",
        _ => "Invalid header",
    }
}

/// Mechanism, temperature and error state of one deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeckState {
    pub mecha: [u8; 2],
    pub temperature: u8,
    pub error: DeviceFault,
}

/// Size of a deck block in status responses.
pub const DECK_BLOCK_LEN: usize = 8;

impl DeckState {
    pub fn from_buf(buf: &[u8]) -> Self {
        DeckState {
            mecha: [buf[0], buf[1]],
            temperature: buf[2],
            error: DeviceFault::from_buf(buf, 3),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.error.is_hard()
    }

    pub fn is_cooling(&self) -> bool {
        self.temperature == TEMPERATURE_COOLING
    }

    pub fn is_busy(&self) -> bool {
        self.mecha[0] != MECHA_IDLE
    }
}

impl fmt::Display for DeckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}",
            mecha_name(self.mecha),
            temperature_name(self.temperature),
            self.error
        )
    }
}

fn decks_from_buf(buf: &[u8], offset: usize) -> [DeckState; MAX_DECKS] {
    let mut decks = [DeckState::default(); MAX_DECKS];
    for (i, deck) in decks.iter_mut().enumerate() {
        let start = offset + i * DECK_BLOCK_LEN;
        *deck = DeckState::from_buf(&buf[start..start + DECK_BLOCK_LEN]);
    }
    decks
}

/// Reply to a job status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobStatus {
    pub job_id: u16,
    pub sheet: u16,
    pub state: JobState,
    pub power: u8,
    pub decks: [DeckState; MAX_DECKS],
}

pub const JOB_STATUS_LEN: usize = 32;

impl JobStatus {
    /// Decode a validated 32 byte job status response.
    pub fn from_buf(buf: &[u8]) -> Self {
        JobStatus {
            job_id: u16::from_be_bytes([buf[4], buf[5]]),
            sheet: u16::from_be_bytes([buf[6], buf[7]]),
            state: JobState::new(buf[8], buf[9], buf[10]),
            power: buf[11],
            decks: decks_from_buf(buf, 12),
        }
    }
}

/// Reply to a printer status query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrinterStatus {
    pub power: u8,
    pub firmware_version: String,
    pub decks: [DeckState; MAX_DECKS],
}

pub const PRINTER_STATUS_LEN: usize = 48;

impl PrinterStatus {
    pub fn from_buf(buf: &[u8]) -> Self {
        let firmware_version = String::from_utf8_lossy(&buf[8..14])
            .trim_end_matches(&['\0', ' '][..])
            .to_string();
        PrinterStatus {
            power: buf[4],
            firmware_version,
            decks: decks_from_buf(buf, 16),
        }
    }
}

/// Reply to a memory headroom query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStatus {
    /// The job can never fit.
    pub size_bad: bool,
    /// Not enough free job buffers right now.
    pub mem_low: bool,
}

pub const MEMORY_STATUS_LEN: usize = 6;

impl MemoryStatus {
    pub fn from_buf(buf: &[u8]) -> Self {
        MemoryStatus {
            size_bad: buf[4] != 0,
            mem_low: buf[5] != 0,
        }
    }
}
