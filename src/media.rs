/// Upper bound on decks in one printer.
pub const MAX_DECKS: usize = 2;

/// Size of a per-deck block in the media status response.
pub const MEDIA_BLOCK_LEN: usize = 16;

/// Media loaded in one deck, as last reported by the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaInfo {
    pub brand: u8,
    pub media_type: u8,
    pub subtype: u8,
    pub capacity: u16,
    pub remaining: u16,
}

impl MediaInfo {
    pub fn from_buf(buf: &[u8]) -> Self {
        MediaInfo {
            brand: buf[0],
            media_type: buf[1],
            subtype: buf[2],
            capacity: u16::from_be_bytes([buf[4], buf[5]]),
            remaining: u16::from_be_bytes([buf[6], buf[7]]),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.media_type != 0x00
    }

    pub fn spec(&self) -> Option<&'static MediaSpec> {
        MediaSpec::lookup(self.media_type)
    }

    pub fn name(&self) -> &'static str {
        if !self.is_loaded() {
            return "Not loaded";
        }
        self.spec().map(|s| s.name).unwrap_or("Unknown media")
    }
}

/// Row counts a nominal paper size can take.
///
/// `exact_rows` are layouts native to the sheet (including multi-cut
/// layouts of it); `compatible_rows` are smaller prints the printer will
/// still place on it.
#[derive(Debug)]
pub struct MediaSpec {
    pub code: u8,
    pub name: &'static str,
    pub exact_rows: &'static [u16],
    pub compatible_rows: &'static [u16],
}

static MEDIA: [MediaSpec; 5] = [
    MediaSpec {
        code: 0x01,
        name: "5x3.5",
        exact_rows: &[1076],
        compatible_rows: &[],
    },
    MediaSpec {
        code: 0x02,
        name: "5x7",
        exact_rows: &[2128],
        compatible_rows: &[1076],
    },
    MediaSpec {
        code: 0x04,
        name: "6x4",
        exact_rows: &[1218, 1228],
        compatible_rows: &[],
    },
    MediaSpec {
        code: 0x05,
        name: "6x8",
        exact_rows: &[2422, 2454],
        compatible_rows: &[1218, 1228],
    },
    MediaSpec {
        code: 0x06,
        name: "6x9",
        exact_rows: &[2730],
        compatible_rows: &[2422, 2454, 1218, 1228],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    Exact,
    Compatible,
    Unusable,
}

impl MediaSpec {
    pub fn lookup(code: u8) -> Option<&'static MediaSpec> {
        MEDIA.iter().find(|m| m.code == code)
    }

    pub fn fit(&self, rows: u16) -> Fit {
        if self.exact_rows.contains(&rows) {
            Fit::Exact
        } else if self.compatible_rows.contains(&rows) {
            Fit::Compatible
        } else {
            Fit::Unusable
        }
    }
}

/// Per-deck compatibility of a job with the loaded media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Eligibility {
    pub eligible: [bool; MAX_DECKS],
    pub exact: [bool; MAX_DECKS],
}

impl Eligibility {
    pub fn any(&self) -> bool {
        self.eligible.iter().any(|e| *e)
    }
}

/// Compare a job's row count against the media in each deck.
///
/// `media` holds one entry per deck; decks beyond it stay ineligible.
pub fn eligibility(rows: u16, media: &[MediaInfo]) -> Eligibility {
    let mut result = Eligibility::default();

    for (deck, info) in media.iter().take(MAX_DECKS).enumerate() {
        let fit = match info.spec() {
            Some(spec) => spec.fit(rows),
            None => Fit::Unusable,
        };
        result.eligible[deck] = fit != Fit::Unusable;
        result.exact[deck] = fit == Fit::Exact;
    }
    result
}
