mod common;

use common::{cooked_spool, Event, SimPrinter};
use dyesub::wire::raw_plane_len;
use dyesub::{
    ColorEngine, ColorEngineError, Config, CpcHandle, DeviceSink, EffectParams, Error, LutHandle,
    Model, Outcome, PixelLayout, Planes,
};
use std::fs;
use std::io::Cursor;
use std::path::Path;

const SIX_BY_FOUR: u8 = 0x04;
const SIX_BY_EIGHT: u8 = 0x05;
const SEND_CHUNK: usize = 1000;

/// Loads real table files and fills every plane with mid gray.
struct TableEngine {
    api: u32,
    tables: Vec<Vec<u8>>,
}

impl ColorEngine for TableEngine {
    fn api_version(&self) -> u32 {
        self.api
    }

    fn load_lut(&mut self, path: &Path) -> Result<LutHandle, ColorEngineError> {
        let data = fs::read(path).map_err(|_| ColorEngineError::Load(path.display().to_string()))?;
        self.tables.push(data);
        Ok(LutHandle(self.tables.len() as u32))
    }

    fn destroy_lut(&mut self, _lut: LutHandle) {}

    fn load_cpc(
        &mut self,
        path: &Path,
        _secondary: Option<&Path>,
    ) -> Result<CpcHandle, ColorEngineError> {
        let data = fs::read(path).map_err(|_| ColorEngineError::Load(path.display().to_string()))?;
        self.tables.push(data);
        Ok(CpcHandle(self.tables.len() as u32))
    }

    fn destroy_cpc(&mut self, _cpc: CpcHandle) {}

    fn lut_convert(
        &mut self,
        _lut: LutHandle,
        _data: &mut [u8],
        _layout: PixelLayout,
        _columns: u16,
        _rows: u16,
    ) -> Result<(), ColorEngineError> {
        Ok(())
    }

    fn image_effect(
        &mut self,
        _cpc: CpcHandle,
        _rgb: &[u8],
        params: &EffectParams,
    ) -> Result<Planes, ColorEngineError> {
        let n = params.columns as usize * params.rows as usize;
        Ok(Planes {
            yellow: vec![0x8000; n],
            magenta: vec![0x8000; n],
            cyan: vec![0x8000; n],
        })
    }

    fn rgb_rate(&mut self, _: &Planes, _: u16, _: u16) -> Result<u8, ColorEngineError> {
        Ok(0x5a)
    }

    fn overcoat_rate(&mut self, _: &Planes, _: u16, _: u16) -> Result<u8, ColorEngineError> {
        Ok(0x3c)
    }

    fn send_data(
        &mut self,
        data: &[u8],
        sink: &mut DeviceSink<'_>,
    ) -> Result<(), ColorEngineError> {
        if self.api < 2 {
            return Err(ColorEngineError::Unsupported(self.api));
        }
        for chunk in data.chunks(SEND_CHUNK) {
            sink(chunk)?;
        }
        Ok(())
    }
}

fn engine(api: u32) -> Option<Box<dyn ColorEngine>> {
    Some(Box::new(TableEngine {
        api,
        tables: Vec::new(),
    }))
}

fn print_cooked(sim: &SimPrinter, assets: &Path, api: u32) -> Result<(), Error> {
    let config = Config::new(Model::D80, String::new()).asset_dir(assets);
    let mut printer = sim.attach_with(config, engine(api));
    let mut spool = Cursor::new(cooked_spool(Model::D80, 8, 1218));
    let job = printer.parse_job(&mut spool, 1)?.expect("one job");
    printer.print(job)
}

#[test]
fn test_cooked_job_streams_through_engine() {
    let assets = tempfile::tempdir().unwrap();
    fs::write(assets.path().join("CPD80N01.cpc"), b"table").unwrap();

    let sim = SimPrinter::new([SIX_BY_FOUR, SIX_BY_FOUR]);
    let result = print_cooked(&sim, assets.path(), 2);
    assert!(result.is_ok(), "{:?}", result);

    let state = sim.state.borrow();
    let planes = raw_plane_len(8, 1218) * 3;
    assert_eq!(state.data_bytes(), planes);
    let chunks = state
        .events
        .iter()
        .filter(|e| matches!(e, Event::Data(_)))
        .count();
    assert_eq!(chunks, (planes + SEND_CHUNK - 1) / SEND_CHUNK);

    let header = &state.headers[0];
    assert_eq!(header[52], 0x5a);
    assert_eq!(header[53], 0x3c);
    assert_eq!(header[58], 0);
}

#[test]
fn test_old_engine_uses_chunked_writes() {
    let assets = tempfile::tempdir().unwrap();
    fs::write(assets.path().join("CPD80N01.cpc"), b"table").unwrap();

    let sim = SimPrinter::new([SIX_BY_FOUR, SIX_BY_FOUR]);
    assert!(print_cooked(&sim, assets.path(), 1).is_ok());

    let state = sim.state.borrow();
    assert_eq!(
        state
            .events
            .iter()
            .filter(|e| matches!(e, Event::Data(_)))
            .count(),
        1
    );
}

#[test]
fn test_missing_table_cancels() {
    let assets = tempfile::tempdir().unwrap();

    let sim = SimPrinter::new([SIX_BY_FOUR, SIX_BY_FOUR]);
    let result = print_cooked(&sim, assets.path(), 2);
    match &result {
        Err(Error::ImageProcessingFailed(msg)) => assert!(msg.contains("CPD80N01.cpc")),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(Outcome::from(&result), Outcome::Cancel);
    assert!(sim.state.borrow().events.is_empty());
}

fn header_rows(sim: &SimPrinter) -> Vec<u16> {
    sim.state
        .borrow()
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Header { rows, .. } => Some(*rows),
            _ => None,
        })
        .collect()
}

fn print_pair(sim: &SimPrinter, assets: &Path) -> Result<usize, Error> {
    let config = Config::new(Model::D80, String::new()).asset_dir(assets);
    let mut printer = sim.attach_with(config, engine(2));
    let mut data = cooked_spool(Model::D80, 8, 1218);
    data.extend(cooked_spool(Model::D80, 8, 1218));
    printer.print_stream(&mut Cursor::new(data), 1, true)
}

#[test]
fn test_stream_combines_onto_six_by_eight() {
    let assets = tempfile::tempdir().unwrap();
    fs::write(assets.path().join("CPD80N01.cpc"), b"table").unwrap();

    let sim = SimPrinter::new([SIX_BY_EIGHT, SIX_BY_FOUR]);
    assert_eq!(print_pair(&sim, assets.path()).unwrap(), 2);
    assert_eq!(header_rows(&sim), vec![2454]);
    assert_eq!(sim.state.borrow().header_decks(), vec![1]);
}

#[test]
fn test_stream_keeps_jobs_apart_without_six_by_eight() {
    let assets = tempfile::tempdir().unwrap();
    fs::write(assets.path().join("CPD80N01.cpc"), b"table").unwrap();

    let sim = SimPrinter::new([SIX_BY_FOUR, SIX_BY_FOUR]);
    assert_eq!(print_pair(&sim, assets.path()).unwrap(), 2);
    assert_eq!(header_rows(&sim), vec![1218, 1218]);
}
