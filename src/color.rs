//! Color processing contract.
//!
//! Cooked jobs carry packed 8-bit RGB that an external engine turns into
//! the three 16-bit planes the printer wants. The engine is optional: when
//! it is missing, only raw jobs can be printed.

use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::{
    error::Error,
    model::Model,
    spool::{align_block, Job, PrintSpeed},
};

/// First engine API version with the device write callback.
pub const SEND_CALLBACK_API: u32 = 2;

/// Loaded 3D lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LutHandle(pub u32);

/// Loaded gamma/sharpen correction tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpcHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// RGBRGB...
    Packed,
    /// RRR...GGG...BBB...
    Planar,
}

/// Per-job knobs handed to the image effect pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectParams {
    pub columns: u16,
    pub rows: u16,
    pub sharpen: u8,
    pub reversed: bool,
    pub speed: PrintSpeed,
}

/// Finished device planes, one sample per pixel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Planes {
    pub yellow: Vec<u16>,
    pub magenta: Vec<u16>,
    pub cyan: Vec<u16>,
}

#[derive(thiserror::Error, Debug)]
pub enum ColorEngineError {
    #[error("Unable to load table {0}")]
    Load(String),

    #[error("{0}")]
    Failed(String),

    #[error("Not supported by engine API version {0}")]
    Unsupported(u32),

    /// The device sink failed while the engine was streaming.
    #[error(transparent)]
    Device(#[from] Error),
}

/// Receives finished plane data for the printer.
pub type DeviceSink<'a> = dyn FnMut(&[u8]) -> Result<(), Error> + 'a;

/// An image processing library for this printer family.
pub trait ColorEngine {
    fn api_version(&self) -> u32;

    fn load_lut(&mut self, path: &Path) -> Result<LutHandle, ColorEngineError>;

    fn destroy_lut(&mut self, lut: LutHandle);

    /// Load the gamma/sharpen tables, with the enhanced table if given.
    fn load_cpc(
        &mut self,
        path: &Path,
        secondary: Option<&Path>,
    ) -> Result<CpcHandle, ColorEngineError>;

    fn destroy_cpc(&mut self, cpc: CpcHandle);

    /// Apply a 3D LUT in place.
    fn lut_convert(
        &mut self,
        lut: LutHandle,
        data: &mut [u8],
        layout: PixelLayout,
        columns: u16,
        rows: u16,
    ) -> Result<(), ColorEngineError>;

    /// Gamma expansion, sharpening and separation into YMC planes.
    fn image_effect(
        &mut self,
        cpc: CpcHandle,
        rgb: &[u8],
        params: &EffectParams,
    ) -> Result<Planes, ColorEngineError>;

    fn rgb_rate(&mut self, planes: &Planes, columns: u16, rows: u16)
        -> Result<u8, ColorEngineError>;

    fn overcoat_rate(
        &mut self,
        planes: &Planes,
        columns: u16,
        rows: u16,
    ) -> Result<u8, ColorEngineError>;

    /// Stream finished plane data to the printer in bounded chunks.
    fn send_data(
        &mut self,
        _data: &[u8],
        _sink: &mut DeviceSink<'_>,
    ) -> Result<(), ColorEngineError> {
        Err(ColorEngineError::Unsupported(self.api_version()))
    }
}

fn processing_failed(err: ColorEngineError) -> Error {
    match err {
        ColorEngineError::Device(err) => err,
        other => Error::ImageProcessingFailed(other.to_string()),
    }
}

/// Serialize planes big-endian, each padded to the block size.
pub fn assemble_planes(planes: &Planes, columns: u16, rows: u16) -> Result<Vec<u8>, Error> {
    let samples = columns as usize * rows as usize;
    let plane_len = align_block(samples * 2);
    let mut out = Vec::with_capacity(plane_len * 3);

    for (name, plane) in [
        ("yellow", &planes.yellow),
        ("magenta", &planes.magenta),
        ("cyan", &planes.cyan),
    ]
    .iter()
    {
        if plane.len() != samples {
            return Err(Error::ImageProcessingFailed(format!(
                "{} plane has {} samples, expected {}",
                name,
                plane.len(),
                samples
            )));
        }
        let start = out.len();
        for sample in plane.iter() {
            out.extend_from_slice(&sample.to_be_bytes());
        }
        out.resize(start + plane_len, 0);
    }
    Ok(out)
}

/// Caching adapter around a [`ColorEngine`].
///
/// Tables stay loaded across jobs and are reloaded only when a job names
/// a different file.
pub struct ColorPipeline {
    engine: Box<dyn ColorEngine>,
    asset_dir: PathBuf,
    lut: Option<(String, LutHandle)>,
    cpc: Option<(String, Option<String>, CpcHandle)>,
}

impl ColorPipeline {
    pub fn new(engine: Box<dyn ColorEngine>, asset_dir: impl Into<PathBuf>) -> Self {
        let asset_dir = asset_dir.into();
        info!(
            "Color engine API version {}, tables in {}",
            engine.api_version(),
            asset_dir.display()
        );
        ColorPipeline {
            engine,
            asset_dir,
            lut: None,
            cpc: None,
        }
    }

    pub fn api_version(&self) -> u32 {
        self.engine.api_version()
    }

    pub fn supports_send_callback(&self) -> bool {
        self.engine.api_version() >= SEND_CALLBACK_API
    }

    /// Name of the primary correction table currently loaded.
    pub fn last_cpc(&self) -> Option<&str> {
        self.cpc.as_ref().map(|(name, _, _)| name.as_str())
    }

    pub fn last_secondary_cpc(&self) -> Option<&str> {
        self.cpc
            .as_ref()
            .and_then(|(_, secondary, _)| secondary.as_deref())
    }

    pub fn last_lut(&self) -> Option<&str> {
        self.lut.as_ref().map(|(name, _)| name.as_str())
    }

    fn ensure_lut(&mut self, name: &str) -> Result<LutHandle, Error> {
        if let Some((loaded, handle)) = &self.lut {
            if loaded == name {
                return Ok(*handle);
            }
        }
        if let Some((old, handle)) = self.lut.take() {
            debug!("Releasing LUT {}", old);
            self.engine.destroy_lut(handle);
        }
        let path = self.asset_dir.join(name);
        debug!("Loading LUT {}", path.display());
        let handle = self.engine.load_lut(&path).map_err(processing_failed)?;
        self.lut = Some((name.to_string(), handle));
        Ok(handle)
    }

    fn ensure_cpc(&mut self, name: &str, secondary: Option<&str>) -> Result<CpcHandle, Error> {
        if let Some((loaded, loaded_secondary, handle)) = &self.cpc {
            if loaded == name && loaded_secondary.as_deref() == secondary {
                return Ok(*handle);
            }
        }
        if let Some((old, _, handle)) = self.cpc.take() {
            debug!("Releasing correction table {}", old);
            self.engine.destroy_cpc(handle);
        }
        let path = self.asset_dir.join(name);
        let secondary_path = secondary.map(|s| self.asset_dir.join(s));
        debug!("Loading correction table {}", path.display());
        let handle = self
            .engine
            .load_cpc(&path, secondary_path.as_deref())
            .map_err(processing_failed)?;
        self.cpc = Some((name.to_string(), secondary.map(String::from), handle));
        Ok(handle)
    }

    /// Turn a cooked job into device planes in place.
    ///
    /// Raw jobs pass through untouched.
    pub fn finalize(&mut self, job: &mut Job, model: Model) -> Result<(), Error> {
        if !job.needs_processing() {
            return Ok(());
        }
        let columns = job.columns();
        let rows = job.rows();
        let pixels = columns as usize * rows as usize * 3;

        if let Some(lut_name) = job.color_tables.lut.clone() {
            let lut = self.ensure_lut(&lut_name)?;
            self.engine
                .lut_convert(
                    lut,
                    &mut job.plane_buffer[..pixels],
                    PixelLayout::Packed,
                    columns,
                    rows,
                )
                .map_err(processing_failed)?;
        }

        let cpc_name = job
            .color_tables
            .cpc
            .clone()
            .ok_or_else(|| Error::ImageProcessingFailed("no correction table".into()))?;
        let secondary = job.color_tables.secondary_cpc.clone();
        let cpc = self.ensure_cpc(&cpc_name, secondary.as_deref())?;

        let params = EffectParams {
            columns,
            rows,
            sharpen: job.sharpen_level(),
            reversed: job.reversed(),
            speed: job.speed(),
        };
        let planes = self
            .engine
            .image_effect(cpc, &job.plane_buffer[..pixels], &params)
            .map_err(processing_failed)?;

        if model.needs_rate_bytes() {
            job.header.rgb_rate = self
                .engine
                .rgb_rate(&planes, columns, rows)
                .map_err(processing_failed)?;
            job.header.oc_rate = self
                .engine
                .overcoat_rate(&planes, columns, rows)
                .map_err(processing_failed)?;
            debug!(
                "RGB rate {:02x}, overcoat rate {:02x}",
                job.header.rgb_rate, job.header.oc_rate
            );
        }

        job.plane_buffer = assemble_planes(&planes, columns, rows)?;
        job.processed = true;
        Ok(())
    }

    /// Let the engine push planes through `sink`.
    pub fn send_planes(&mut self, data: &[u8], sink: &mut DeviceSink<'_>) -> Result<(), Error> {
        self.engine.send_data(data, sink).map_err(processing_failed)
    }
}

impl Drop for ColorPipeline {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.lut.take() {
            self.engine.destroy_lut(handle);
        }
        if let Some((_, _, handle)) = self.cpc.take() {
            self.engine.destroy_cpc(handle);
        }
    }
}
