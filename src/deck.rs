//! Deck selection.
//!
//! Decides, for one poll of the printer, which decks may take a job now
//! and which could take it once they stop being busy.

use bitflags::bitflags;
use log::debug;
use rand::Rng;

use crate::{media::MAX_DECKS, spool::Job, status::DeckState};

bitflags! {
    pub struct DeckMask: u8 {
        const LOWER = 0b01;
        const UPPER = 0b10;
    }
}

impl DeckMask {
    pub fn from_index(index: usize) -> Self {
        Self::from_bits_truncate(1 << index)
    }

    pub fn has_index(&self, index: usize) -> bool {
        index < MAX_DECKS && self.contains(Self::from_index(index))
    }

    pub fn count(&self) -> u32 {
        self.bits().count_ones()
    }

    pub fn indices(self) -> impl Iterator<Item = usize> {
        (0..MAX_DECKS).filter(move |i| self.has_index(*i))
    }
}

/// Result of matching a job against the current deck states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeckSelection {
    /// Can take the job right now.
    pub usable: DeckMask,
    /// Holds suitable media and is not in error.
    pub legal: DeckMask,
    /// Not reporting a hard error.
    pub online: DeckMask,
    /// Holds suitable media, regardless of errors.
    pub eligible: DeckMask,
}

impl DeckSelection {
    pub fn all_offline(&self) -> bool {
        self.online.is_empty()
    }
}

fn mask_of(flags: &[bool]) -> DeckMask {
    let mut mask = DeckMask::empty();
    for (i, flag) in flags.iter().enumerate().take(MAX_DECKS) {
        if *flag {
            mask.insert(DeckMask::from_index(i));
        }
    }
    mask
}

/// Rank the decks for `job` given fresh per-deck state.
///
/// `decks` holds one entry per physical deck.
pub fn select_decks(job: &Job, decks: &[DeckState]) -> DeckSelection {
    let present = decks.len().min(MAX_DECKS);
    let eligible = mask_of(&job.deck_eligible[..present]);
    let exact = mask_of(&job.deck_exact[..present]);

    let mut online = DeckMask::empty();
    let mut idle = DeckMask::empty();
    for (i, deck) in decks.iter().enumerate().take(present) {
        if deck.is_offline() {
            debug!("Deck {} offline: {}", i, deck.error);
            continue;
        }
        online.insert(DeckMask::from_index(i));
        if !deck.is_busy() && !deck.is_cooling() {
            idle.insert(DeckMask::from_index(i));
        }
    }

    let legal = eligible & online;

    let preferred = match job.requested_deck() {
        Some(deck) if legal.has_index(deck) => DeckMask::from_index(deck),
        _ if !(exact & legal).is_empty() => exact & legal,
        _ => legal,
    };

    DeckSelection {
        usable: preferred & idle,
        legal,
        online,
        eligible,
    }
}

/// Choose one deck out of `usable`.
///
/// Two usable decks hold interchangeable media, so either will do.
pub fn pick_deck<R: Rng + ?Sized>(usable: DeckMask, rng: &mut R) -> Option<usize> {
    let mut candidates = usable.indices();
    let first = candidates.next()?;
    match candidates.next() {
        Some(second) if rng.random_bool(0.5) => Some(second),
        _ => Some(first),
    }
}

/// Header deck byte for a deck index.
pub fn deck_code(index: usize) -> u8 {
    index as u8 + 1
}
