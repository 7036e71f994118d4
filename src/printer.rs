use log::{debug, error, info, warn};
use std::{
    io::Read,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    color::{ColorEngine, ColorPipeline},
    combine::combine_jobs,
    deck::{deck_code, pick_deck, select_decks, DeckMask},
    error::Error,
    media::{MediaInfo, MAX_DECKS},
    model::Model,
    protocol::Client,
    spool::{self, Job},
    status::{is_asleep, mecha_name, power_name, temperature_name, JobStatus, PrinterStatus},
    transport::{Transport, UsbTransport},
};

/// Backoff between status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const DEFAULT_ASSET_DIR: &str = "/usr/share/dyesub/corrtables";

/// Blocking pause between polls.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Connection and job handling options.
#[derive(Debug, Clone)]
pub struct Config {
    model: Model,
    serial: String,
    asset_dir: PathBuf,
    wait: bool,
    fast_return: bool,
    terminate: Arc<AtomicBool>,
}

impl Config {
    /// Initialize configuration data with default values.
    ///
    /// An empty serial attaches to the first printer of `model`.
    ///
    /// # Example
    ///
    /// ```
    /// use dyesub::{Config, Model};
    ///
    /// let config = Config::new(Model::D707, "A12345".to_string())
    ///     .fast_return(true)
    ///     .wait(false);
    /// assert_eq!(config.model(), Model::D707);
    /// ```
    pub fn new(model: Model, serial: String) -> Config {
        Config {
            model,
            serial,
            asset_dir: PathBuf::from(DEFAULT_ASSET_DIR),
            wait: true,
            fast_return: false,
            terminate: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Directory holding the correction tables.
    pub fn asset_dir(self, dir: impl Into<PathBuf>) -> Self {
        Config {
            asset_dir: dir.into(),
            ..self
        }
    }

    /// Block through busy, asleep and low memory conditions.
    ///
    /// When disabled those conditions end the job with a retryable error.
    pub fn wait(self, wait: bool) -> Self {
        Config { wait, ..self }
    }

    /// Return once a single copy is visibly printing.
    pub fn fast_return(self, fast_return: bool) -> Self {
        Config {
            fast_return,
            ..self
        }
    }

    /// Flag that, once raised, finishes the current copy and stops.
    pub fn terminate(self, terminate: Arc<AtomicBool>) -> Self {
        Config { terminate, ..self }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn assets(&self) -> &Path {
        &self.asset_dir
    }

    pub fn waits(&self) -> bool {
        self.wait
    }

    pub fn returns_fast(&self) -> bool {
        self.fast_return
    }

    pub fn terminating(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitWake,
    AwaitIdle,
    CheckMemory(DeckMask),
    CommitDeck(DeckMask),
    Transmit(usize),
    AwaitCompletion(usize),
    CopyDone,
}

/// One attached printer.
pub struct Printer<T: Transport> {
    client: Client<T>,
    config: Config,
    media: [MediaInfo; MAX_DECKS],
    job_id: u16,
    serial: String,
    firmware_version: String,
    power: u8,
    pipeline: Option<ColorPipeline>,
    sleeper: Box<dyn Sleeper>,
}

impl Printer<UsbTransport> {
    /// Open the printer over USB and attach to it.
    pub fn open(config: Config, engine: Option<Box<dyn ColorEngine>>) -> Result<Self, Error> {
        let transport = UsbTransport::open(config.model(), config.serial())?;
        Self::attach(transport, config, engine)
    }
}

impl<T: Transport> Printer<T> {
    /// Take over a connected transport and read the printer's identity.
    pub fn attach(
        transport: T,
        config: Config,
        engine: Option<Box<dyn ColorEngine>>,
    ) -> Result<Self, Error> {
        let mut client = Client::new(transport);

        let status = client.get_printer_status()?;
        let media = client.get_media_status()?;
        let serial = client.get_serial()?;

        info!(
            "{} serial {} firmware {} ({})",
            config.model(),
            serial,
            status.firmware_version,
            power_name(status.power)
        );
        for (i, m) in media.iter().enumerate().take(config.model().deck_count()) {
            info!("Deck {}: {} ({}/{} prints left)", i, m.name(), m.remaining, m.capacity);
        }

        let pipeline = match engine {
            Some(engine) => Some(ColorPipeline::new(engine, config.assets())),
            None => {
                info!("No color engine, only raw jobs can be printed");
                None
            }
        };

        Ok(Printer {
            client,
            media,
            job_id: 1,
            serial,
            firmware_version: status.firmware_version,
            power: status.power,
            pipeline,
            sleeper: Box::new(ThreadSleeper),
            config,
        })
    }

    /// Replace the sleeper used for poll backoff.
    pub fn with_sleeper(self, sleeper: Box<dyn Sleeper>) -> Self {
        Printer { sleeper, ..self }
    }

    pub fn model(&self) -> Model {
        self.config.model()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn firmware_version(&self) -> &str {
        &self.firmware_version
    }

    /// Media state of the decks present on this model.
    pub fn media(&self) -> &[MediaInfo] {
        &self.media[..self.model().deck_count()]
    }

    /// Next job id to be used.
    pub fn job_id(&self) -> u16 {
        self.job_id
    }

    pub fn pipeline(&self) -> Option<&ColorPipeline> {
        self.pipeline.as_ref()
    }

    pub fn transport(&self) -> &T {
        self.client.transport()
    }

    pub fn into_transport(self) -> T {
        self.client.into_transport()
    }

    /// Re-read the loaded media after an operator change.
    pub fn refresh_media(&mut self) -> Result<&[MediaInfo], Error> {
        self.media = self.client.get_media_status()?;
        Ok(self.media())
    }

    /// Human readable summary of the printer state.
    pub fn query_status(&mut self) -> Result<String, Error> {
        let status: PrinterStatus = self.client.get_printer_status()?;
        self.refresh_media()?;
        self.power = status.power;

        let mut out = format!(
            "{} serial {} firmware {}\nPower: {}\n",
            self.model(),
            self.serial,
            status.firmware_version,
            power_name(status.power)
        );
        for i in 0..self.model().deck_count() {
            let deck = &status.decks[i];
            let media = &self.media[i];
            out.push_str(&format!(
                "Deck {}: {}, {}\n  Error: {}\n  Media: {} ({}/{} prints left)\n",
                i,
                mecha_name(deck.mecha),
                temperature_name(deck.temperature),
                deck.error,
                media.name(),
                media.remaining,
                media.capacity
            ));
        }
        Ok(out)
    }

    /// Best effort: the printer may already be laying down color.
    pub fn cancel(&mut self, job_id: u16) -> Result<(), Error> {
        info!("Cancelling job {}", job_id);
        self.client.cancel_job(job_id)
    }

    /// Read the next job from a spool stream against the current media.
    pub fn parse_job<R: Read>(&self, reader: &mut R, copies: u32) -> Result<Option<Job>, Error> {
        spool::parse_job(reader, copies, self.model(), self.media())
    }

    /// Merge two jobs onto one two-up sheet, if they allow it.
    pub fn combine(&self, a: &Job, b: &Job) -> Option<Job> {
        combine_jobs(self.model(), self.media(), a, b)
    }

    /// Print every job in a spool stream, returning how many were printed.
    ///
    /// With `combine` set, consecutive 6x4 jobs share a sheet when a color
    /// engine is attached to cook them.
    pub fn print_stream<R: Read>(
        &mut self,
        reader: &mut R,
        copies: u32,
        combine: bool,
    ) -> Result<usize, Error> {
        let combine = combine && self.pipeline.is_some();
        let mut pending = None;
        let mut count = 0;

        while let Some(job) = self.parse_job(reader, copies)? {
            pending = match pending.take() {
                None if combine => Some(job),
                None => {
                    self.print(job)?;
                    count += 1;
                    None
                }
                Some(previous) => match self.combine(&previous, &job) {
                    Some(merged) => {
                        self.print(merged)?;
                        count += 2;
                        None
                    }
                    None => {
                        self.print(previous)?;
                        count += 1;
                        Some(job)
                    }
                },
            };
        }
        if let Some(job) = pending {
            self.print(job)?;
            count += 1;
        }
        info!("Printed {} jobs", count);
        Ok(count)
    }

    fn advance_job_id(&mut self) {
        self.job_id = match self.job_id.wrapping_add(1) {
            0 => 1,
            id => id,
        };
    }

    fn backoff(&self, busy: Error) -> Result<(), Error> {
        if !self.config.waits() {
            return Err(busy);
        }
        self.sleeper.sleep(POLL_INTERVAL);
        Ok(())
    }

    fn log_status(&self, last: &mut Option<JobStatus>, status: JobStatus) {
        if last.as_ref() == Some(&status) {
            return;
        }
        info!("Job {}: {}", self.job_id, status.state);
        for (i, deck) in status.decks.iter().enumerate().take(self.model().deck_count()) {
            debug!("Deck {}: {}", i, deck);
        }
        *last = Some(status);
    }

    /// Drive one job, all of its copies, to completion.
    pub fn print(&mut self, mut job: Job) -> Result<(), Error> {
        let model = self.model();
        let deck_count = model.deck_count();
        if job.copies == 0 {
            job.copies = 1;
        }

        if job.needs_processing() {
            match self.pipeline.as_mut() {
                Some(pipeline) => pipeline.finalize(&mut job, model)?,
                None => return Err(Error::MissingColorEngine),
            }
        }

        let mut last: Option<JobStatus> = None;
        let mut state = if is_asleep(self.power) {
            State::AwaitWake
        } else {
            State::AwaitIdle
        };

        loop {
            debug!("State {:?}", state);
            state = match state {
                State::AwaitWake => {
                    info!("Printer is {}, waking it up", power_name(self.power));
                    self.client.send_wakeup()?;
                    loop {
                        let status = self.client.get_printer_status()?;
                        self.power = status.power;
                        if !is_asleep(status.power) {
                            break State::AwaitIdle;
                        }
                        self.backoff(Error::DeviceAsleep)?;
                    }
                }

                State::AwaitIdle => {
                    let status = self.client.get_job_status(self.job_id)?;
                    self.power = status.power;
                    if is_asleep(status.power) {
                        State::AwaitWake
                    } else if !status.state.is_none() {
                        debug!("Job id {} in use ({}), skipping", self.job_id, status.state);
                        self.advance_job_id();
                        State::AwaitIdle
                    } else {
                        self.log_status(&mut last, status);
                        let selection = select_decks(&job, &status.decks[..deck_count]);
                        if selection.eligible.is_empty() {
                            return Err(Error::MediaMismatch { rows: job.rows() });
                        }
                        if selection.all_offline() {
                            let fault = status.decks[0].error;
                            error!("All decks offline: {}", fault);
                            return Err(Error::AllDecksOffline(fault));
                        }
                        if selection.legal.is_empty() {
                            warn!("No online deck holds media for this job");
                            return Err(Error::NoLegalDeck);
                        }
                        if selection.usable.is_empty() {
                            debug!("Waiting for a deck to become idle");
                            self.backoff(Error::DeviceBusy)?;
                            State::AwaitIdle
                        } else {
                            State::CheckMemory(selection.usable)
                        }
                    }
                }

                State::CheckMemory(usable) => {
                    let rows = model.memory_query_rows(job.rows(), job.multicut_mode());
                    let memory = self.client.get_memory_headroom(
                        job.columns(),
                        rows,
                        job.has_lamination(),
                    )?;
                    if memory.size_bad {
                        return Err(Error::JobTooLarge {
                            columns: job.columns(),
                            rows: job.rows(),
                        });
                    }
                    if memory.mem_low {
                        info!("Printer memory full, waiting");
                        self.backoff(Error::MemoryExhausted { retryable: true })?;
                        State::AwaitIdle
                    } else {
                        State::CommitDeck(usable)
                    }
                }

                State::CommitDeck(usable) => {
                    let deck = pick_deck(usable, &mut rand::rng()).ok_or(Error::NoLegalDeck)?;
                    info!("Job {} committed to deck {}", self.job_id, deck);
                    State::Transmit(deck)
                }

                State::Transmit(deck) => {
                    let mut header = job.header.clone();
                    header.job_id = self.job_id;
                    header.deck = if deck_count > 1 { deck_code(deck) } else { 0 };
                    self.client.send(&header.encode_for_device())?;

                    let client = &mut self.client;
                    match self.pipeline.as_mut() {
                        Some(pipeline) if job.is_processed() && pipeline.supports_send_callback() => {
                            pipeline.send_planes(&job.plane_buffer, &mut |chunk: &[u8]| {
                                client.send(chunk)
                            })?
                        }
                        _ => client.send_chunked(&job.plane_buffer)?,
                    }
                    if !job.matte.is_empty() {
                        client.send_chunked(&job.matte)?;
                    }
                    debug!(
                        "Sent {} bytes of planes and {} bytes of matte",
                        job.plane_buffer.len(),
                        job.matte_length()
                    );
                    State::AwaitCompletion(deck)
                }

                State::AwaitCompletion(deck) => {
                    let status = self.client.get_job_status(self.job_id)?;
                    self.log_status(&mut last, status);

                    let fault = status.decks[deck].error;
                    if fault.is_hard() {
                        error!("Deck {} failed: {}", deck, fault);
                        if let Err(err) = self.client.cancel_job(self.job_id) {
                            warn!("Failed to cancel job {}: {}", self.job_id, err);
                        }
                        self.advance_job_id();

                        let selection = select_decks(&job, &status.decks[..deck_count]);
                        if !selection.legal.is_empty() {
                            info!("Retrying on another deck");
                            State::AwaitIdle
                        } else if !selection.online.is_empty() {
                            return Err(Error::NoLegalDeck);
                        } else {
                            return Err(Error::DeviceError { deck, fault });
                        }
                    } else if status.state.is_end_ok() {
                        State::CopyDone
                    } else if status.state.is_end() {
                        error!("Job {} ended: {}", self.job_id, status.state);
                        self.advance_job_id();
                        if status.state.sub1 == crate::status::JOB_STATUS1_END_HEADER {
                            return Err(Error::JobRejected(status.state.describe()));
                        }
                        return Err(Error::DeviceError { deck, fault });
                    } else if self.config.returns_fast()
                        && job.copies == 1
                        && status.state.is_printing()
                    {
                        info!("Fast return mode, not waiting for completion");
                        self.advance_job_id();
                        return Ok(());
                    } else {
                        self.sleeper.sleep(POLL_INTERVAL);
                        State::AwaitCompletion(deck)
                    }
                }

                State::CopyDone => {
                    if self.config.terminating() {
                        job.copies = 1;
                    }
                    job.copies -= 1;
                    info!("Job {} complete, {} copies left", self.job_id, job.copies);
                    self.advance_job_id();
                    if job.copies == 0 {
                        return Ok(());
                    }
                    State::AwaitIdle
                }
            };
        }
    }
}
