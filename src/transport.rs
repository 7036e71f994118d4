//! Byte-stream transport to the printer.
//!
//! Everything above this boundary deals in framed commands; the transport
//! only moves bytes.

use log::{debug, info};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, Direction, TransferType, UsbContext};
use std::time::Duration;

use crate::{error::Error, model::Model};

/// Point-to-point connection to one printer.
pub trait Transport {
    /// Write the whole buffer or fail.
    fn send(&mut self, buf: &[u8]) -> Result<(), Error>;

    /// Read up to `buf.len()` bytes, returning how many arrived.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, buf: &[u8]) -> Result<(), Error> {
        (**self).send(buf)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        (**self).receive(buf)
    }
}

#[derive(Debug, Clone, Copy)]
struct Endpoint {
    iface: u8,
    address: u8,
}

/// USB bulk transport.
pub struct UsbTransport {
    handle: DeviceHandle<Context>,
    endpoint_out: Endpoint,
    endpoint_in: Endpoint,
}

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(5);

impl UsbTransport {
    /// Open the printer of `model` whose USB serial number is `serial`.
    ///
    /// An empty serial matches the first printer of that model.
    pub fn open(model: Model, serial: &str) -> Result<Self, Error> {
        let mut context = Context::new()?;
        let (mut device, device_desc, mut handle) =
            match Self::open_device(&mut context, model.vid(), model.pid(), serial) {
                Ok(found) => found,
                Err(err) => {
                    debug!("{:?}", err);
                    return Err(Error::DeviceOffline);
                }
            };

        let endpoint_in = Self::find_endpoint(&mut device, &device_desc, Direction::In)
            .ok_or(Error::MissingEndpoint)?;
        let endpoint_out = Self::find_endpoint(&mut device, &device_desc, Direction::Out)
            .ok_or(Error::MissingEndpoint)?;

        // usblp grabs the printer class interface on most distributions
        handle.set_auto_detach_kernel_driver(true)?;
        let has_kernel_driver = matches!(handle.kernel_driver_active(endpoint_out.iface), Ok(true));
        info!("Kernel driver support is {}", has_kernel_driver);
        handle.claim_interface(endpoint_out.iface)?;

        Ok(UsbTransport {
            handle,
            endpoint_out,
            endpoint_in,
        })
    }

    fn open_device(
        context: &mut Context,
        vid: u16,
        pid: u16,
        serial: &str,
    ) -> Result<(Device<Context>, DeviceDescriptor, DeviceHandle<Context>), Error> {
        let devices = context.devices()?;

        if devices.is_empty() {
            debug!("Failed to read device list");
            return Err(Error::DeviceListNotReadable);
        }
        for device in devices.iter() {
            let device_desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(err) => {
                    debug!("{:?}", err);
                    continue;
                }
            };

            if device_desc.vendor_id() != vid || device_desc.product_id() != pid {
                continue;
            }
            let handle = match device.open() {
                Ok(handle) => handle,
                Err(err) => {
                    debug!("Failed to open device: {:?}", err);
                    continue;
                }
            };
            if serial.is_empty() {
                return Ok((device, device_desc, handle));
            }

            let timeout = Duration::from_secs(1);
            let languages = handle.read_languages(timeout)?;
            let language = match languages.first() {
                Some(language) => *language,
                None => continue,
            };
            match handle.read_serial_number_string(language, &device_desc, timeout) {
                Ok(s) if s == serial => return Ok((device, device_desc, handle)),
                Ok(_) => continue,
                Err(err) => {
                    debug!("Failed to read serial number string: {:?}", err);
                    continue;
                }
            }
        }
        debug!("No device match with this serial: {:?}", serial);
        Err(Error::DeviceOffline)
    }

    fn find_endpoint(
        device: &mut Device<Context>,
        device_desc: &DeviceDescriptor,
        direction: Direction,
    ) -> Option<Endpoint> {
        for n in 0..device_desc.num_configurations() {
            let config_desc = match device.config_descriptor(n) {
                Ok(c) => c,
                Err(_) => continue,
            };
            for interface in config_desc.interfaces() {
                for interface_desc in interface.descriptors() {
                    for endpoint_desc in interface_desc.endpoint_descriptors() {
                        if endpoint_desc.direction() == direction
                            && endpoint_desc.transfer_type() == TransferType::Bulk
                        {
                            return Some(Endpoint {
                                iface: interface_desc.interface_number(),
                                address: endpoint_desc.address(),
                            });
                        }
                    }
                }
            }
        }
        None
    }
}

impl Transport for UsbTransport {
    fn send(&mut self, buf: &[u8]) -> Result<(), Error> {
        let n = self
            .handle
            .write_bulk(self.endpoint_out.address, buf, WRITE_TIMEOUT)?;
        if n != buf.len() {
            debug!(
                "write error: bytes wrote {} != bytes supplied {}, possibly timeout ?",
                n,
                buf.len()
            );
            return Err(Error::ShortWrite {
                expected: buf.len(),
                written: n,
            });
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self
            .handle
            .read_bulk(self.endpoint_in.address, buf, READ_TIMEOUT)
        {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Ok(0),
            Err(e) => Err(Error::UsbError(e)),
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        if let Err(err) = self.handle.release_interface(self.endpoint_out.iface) {
            debug!("Failed to release interface: {:?}", err);
        }
    }
}
