// Simulated printer for driving the job state machine without hardware.

#![allow(dead_code)]

use dyesub::wire::{
    matte_len, raw_plane_len, reply_magic, HEADER_LEN, JOB_STATUS0_END, JOB_STATUS0_NONE,
    JOB_STATUS0_PRINT, JOB_STATUS0_QUEUE, JOB_STATUS1_END_OK, JOB_STATUS1_PRINT_Y,
    MECHA_FEED, POWER_ON,
};
use dyesub::{ColorEngine, Config, Error, Model, Printer, Sleeper, SpoolHeader, Transport};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    JobStatus(u16),
    PrinterStatus,
    Media,
    Memory { columns: u16, rows: u16, matte: bool },
    Serial,
    Wakeup,
    Cancel(u16),
    Header { job_id: u16, deck: u8, rows: u16 },
    Data(usize),
    Sleep,
}

#[derive(Debug, Clone, Copy)]
struct SimJob {
    deck: usize,
    polls: usize,
}

pub struct SimState {
    pub events: Vec<Event>,
    pub headers: Vec<Vec<u8>>,
    pub power: u8,
    /// Printer status polls that still report sleeping after a wake-up.
    pub wake_polls: usize,
    pub media: [u8; 2],
    pub faults: [[u8; 3]; 2],
    /// Idle-phase job status polls that report every deck busy.
    pub busy_polls: usize,
    /// Job ids the printer reports as already in use.
    pub in_use: Vec<u16>,
    pub mem_low_polls: usize,
    pub size_bad: bool,
    /// Completion polls before a job reports END.
    pub polls_to_finish: usize,
    /// END sub codes reported instead of a clean finish.
    pub end_codes: Option<(u8, u8)>,
    /// Hard fault raised on a deck at its first completion poll.
    pub fail_deck: Option<(usize, [u8; 3])>,
    pending_data: usize,
    jobs: HashMap<u16, SimJob>,
    replies: VecDeque<Vec<u8>>,
}

impl SimState {
    pub fn sent(&self) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| **e != Event::Sleep)
            .cloned()
            .collect()
    }

    pub fn sleeps(&self) -> usize {
        self.events.iter().filter(|e| **e == Event::Sleep).count()
    }

    pub fn data_bytes(&self) -> usize {
        self.events
            .iter()
            .map(|e| match e {
                Event::Data(n) => *n,
                _ => 0,
            })
            .sum()
    }

    pub fn header_decks(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Header { deck, .. } => Some(*deck),
                _ => None,
            })
            .collect()
    }

    pub fn header_ids(&self) -> Vec<u16> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Header { job_id, .. } => Some(*job_id),
                _ => None,
            })
            .collect()
    }

    fn deck_block(&self, buf: &mut [u8], deck: usize, busy: bool) {
        if busy {
            buf[0] = MECHA_FEED;
        }
        buf[3..6].copy_from_slice(&self.faults[deck]);
    }

    fn job_status(&mut self, job_id: u16) -> Vec<u8> {
        let mut buf = vec![0u8; 32];
        buf[..4].copy_from_slice(&reply_magic([0x1b, 0x56, 0x31, 0x30]));
        buf[4..6].copy_from_slice(&job_id.to_be_bytes());
        buf[11] = self.power;

        let mut busy = false;
        let state = match self.jobs.get_mut(&job_id) {
            Some(job) => {
                job.polls += 1;
                let job = *job;
                if let Some((deck, fault)) = self.fail_deck {
                    if deck == job.deck && job.polls == 1 {
                        self.faults[deck] = fault;
                        self.fail_deck = None;
                    }
                }
                if job.polls >= self.polls_to_finish {
                    match self.end_codes {
                        Some((sub1, sub2)) => [JOB_STATUS0_END, sub1, sub2],
                        None => [JOB_STATUS0_END, JOB_STATUS1_END_OK, 0],
                    }
                } else if job.polls > 1 {
                    [JOB_STATUS0_PRINT, JOB_STATUS1_PRINT_Y, 0]
                } else {
                    [JOB_STATUS0_QUEUE, 0, 0]
                }
            }
            None if self.in_use.contains(&job_id) => [JOB_STATUS0_QUEUE, 0, 0],
            None => {
                if self.busy_polls > 0 {
                    self.busy_polls -= 1;
                    busy = true;
                }
                [JOB_STATUS0_NONE, 0, 0]
            }
        };
        buf[8..11].copy_from_slice(&state);

        for deck in 0..2 {
            let start = 12 + deck * 8;
            self.deck_block(&mut buf[start..start + 8], deck, busy);
        }
        buf
    }

    fn printer_status(&mut self) -> Vec<u8> {
        let mut buf = vec![0u8; 48];
        buf[..4].copy_from_slice(&reply_magic([0x1b, 0x56, 0x32, 0x30]));
        if self.power != POWER_ON && !self.events.iter().any(|e| *e == Event::Wakeup) {
            buf[4] = self.power;
        } else if self.wake_polls > 0 {
            self.wake_polls -= 1;
            buf[4] = self.power;
        } else {
            self.power = POWER_ON;
            buf[4] = POWER_ON;
        }
        buf[8..14].copy_from_slice(b"0110  ");
        for deck in 0..2 {
            let start = 16 + deck * 8;
            self.deck_block(&mut buf[start..start + 8], deck, false);
        }
        buf
    }

    fn media_status(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 36];
        buf[..4].copy_from_slice(&reply_magic([0x1b, 0x56, 0x20, 0x30]));
        for deck in 0..2 {
            let start = 4 + deck * 16;
            buf[start] = 0xff;
            buf[start + 1] = self.media[deck];
            buf[start + 4..start + 6].copy_from_slice(&400u16.to_be_bytes());
            buf[start + 6..start + 8].copy_from_slice(&350u16.to_be_bytes());
        }
        buf
    }

    fn memory_status(&mut self) -> Vec<u8> {
        let mut buf = vec![0u8; 6];
        buf[..4].copy_from_slice(&reply_magic([0x1b, 0x56, 0x33, 0x00]));
        buf[4] = self.size_bad as u8;
        if self.mem_low_polls > 0 {
            self.mem_low_polls -= 1;
            buf[5] = 1;
        }
        buf
    }

    fn serial(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 24];
        buf[..4].copy_from_slice(&reply_magic([0x1b, 0x56, 0x36, 0x00]));
        buf[4..10].copy_from_slice(b"SIM001");
        buf
    }

    fn header(&mut self, buf: &[u8]) {
        let header = match SpoolHeader::decode(buf) {
            Ok(header) => header,
            Err(err) => panic!("printer got a bad header: {}", err),
        };
        self.pending_data = raw_plane_len(header.columns, header.rows) * 3;
        if header.laminate != 0 {
            self.pending_data += matte_len(header.lam_columns, header.lam_rows);
        }
        let deck = if header.deck == 0 {
            0
        } else {
            header.deck as usize - 1
        };
        self.jobs.insert(header.job_id, SimJob { deck, polls: 0 });
        self.headers.push(buf.to_vec());
        self.events.push(Event::Header {
            job_id: header.job_id,
            deck: header.deck,
            rows: header.rows,
        });
    }
}

#[derive(Clone)]
pub struct SimPrinter {
    pub state: Rc<RefCell<SimState>>,
}

impl SimPrinter {
    /// An idle printer with the given media type in each deck.
    pub fn new(media: [u8; 2]) -> Self {
        SimPrinter {
            state: Rc::new(RefCell::new(SimState {
                events: Vec::new(),
                headers: Vec::new(),
                power: POWER_ON,
                wake_polls: 0,
                media,
                faults: [[0; 3]; 2],
                busy_polls: 0,
                in_use: Vec::new(),
                mem_low_polls: 0,
                size_bad: false,
                polls_to_finish: 3,
                end_codes: None,
                fail_deck: None,
                pending_data: 0,
                jobs: HashMap::new(),
                replies: VecDeque::new(),
            })),
        }
    }

    /// Attach a printer and forget the attach traffic.
    pub fn attach(&self, config: Config) -> Printer<SimPrinter> {
        self.attach_with(config, None)
    }

    pub fn attach_with(
        &self,
        config: Config,
        engine: Option<Box<dyn ColorEngine>>,
    ) -> Printer<SimPrinter> {
        let printer = match Printer::attach(self.clone(), config, engine) {
            Ok(printer) => printer,
            Err(err) => panic!("attach failed: {}", err),
        };
        let printer = printer.with_sleeper(Box::new(SimSleeper {
            state: self.state.clone(),
        }));
        self.state.borrow_mut().events.clear();
        printer
    }
}

impl Transport for SimPrinter {
    fn send(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut state = self.state.borrow_mut();
        if state.pending_data > 0 {
            state.pending_data = state.pending_data.saturating_sub(buf.len());
            state.events.push(Event::Data(buf.len()));
            return Ok(());
        }

        match buf {
            [0x1b, 0x56, 0x31, 0x30, hi, lo] => {
                let id = u16::from_be_bytes([*hi, *lo]);
                state.events.push(Event::JobStatus(id));
                let reply = state.job_status(id);
                state.replies.push_back(reply);
            }
            [0x1b, 0x56, 0x32, 0x30] => {
                state.events.push(Event::PrinterStatus);
                let reply = state.printer_status();
                state.replies.push_back(reply);
            }
            [0x1b, 0x56, 0x20, 0x30] => {
                state.events.push(Event::Media);
                let reply = state.media_status();
                state.replies.push_back(reply);
            }
            [0x1b, 0x56, 0x33, 0x00, c0, c1, r0, r1, matte] => {
                state.events.push(Event::Memory {
                    columns: u16::from_be_bytes([*c0, *c1]),
                    rows: u16::from_be_bytes([*r0, *r1]),
                    matte: *matte != 0,
                });
                let reply = state.memory_status();
                state.replies.push_back(reply);
            }
            [0x1b, 0x56, 0x36, 0x00] => {
                state.events.push(Event::Serial);
                let reply = state.serial();
                state.replies.push_back(reply);
            }
            [0x1b, 0x44, 0x71, hi, lo] => {
                let id = u16::from_be_bytes([*hi, *lo]);
                state.events.push(Event::Cancel(id));
                state.jobs.remove(&id);
            }
            _ if buf.len() >= 4 && buf[..4] == [0x1b, 0x45, 0x57, 0x55] => {
                state.events.push(Event::Wakeup);
            }
            _ if buf.len() == HEADER_LEN && buf[..3] == [0x1b, 0x5a, 0x54] => {
                state.header(buf);
            }
            other => panic!("printer got unexpected bytes {:02x?}", other),
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let reply = self
            .state
            .borrow_mut()
            .replies
            .pop_front()
            .unwrap_or_default();
        let n = reply.len().min(buf.len());
        buf[..n].copy_from_slice(&reply[..n]);
        Ok(n)
    }
}

/// Records backoff pauses in the event log instead of sleeping.
pub struct SimSleeper {
    state: Rc<RefCell<SimState>>,
}

impl Sleeper for SimSleeper {
    fn sleep(&self, _duration: Duration) {
        self.state.borrow_mut().events.push(Event::Sleep);
    }
}

/// A raw spool stream of `count` jobs.
pub fn raw_spool(model: Model, columns: u16, rows: u16, deck: u8, count: usize) -> Vec<u8> {
    let header = SpoolHeader {
        submodel: model.submodel(),
        columns,
        rows,
        deck,
        mode: 1,
        ..Default::default()
    };
    let mut data = Vec::new();
    for _ in 0..count {
        data.extend_from_slice(&header.encode());
        data.extend(std::iter::repeat(0x80).take(raw_plane_len(columns, rows) * 3));
    }
    data
}

/// A cooked spool stream holding one job.
pub fn cooked_spool(model: Model, columns: u16, rows: u16) -> Vec<u8> {
    let header = SpoolHeader {
        submodel: model.submodel(),
        columns,
        rows,
        ..Default::default()
    };
    let mut data = header.encode().to_vec();
    data.extend(std::iter::repeat(0x40).take(dyesub::wire::cooked_len(columns, rows)));
    data
}
