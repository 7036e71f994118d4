//! Command framing and response validation.
//!
//! Every query is a short frame starting with ESC and a family opcode; the
//! reply is a fixed-size block whose first four bytes echo the request
//! family with `e4` in place of ESC. All multi-byte fields are big-endian.
//!
//! | query          | command                      | reply |
//! |----------------|------------------------------|-------|
//! | job status     | `1b 56 31 30 jj jj`          | 32    |
//! | printer status | `1b 56 32 30`                | 48    |
//! | media status   | `1b 56 20 30`                | 36    |
//! | memory         | `1b 56 33 00 cc cc rr rr mm` | 6     |
//! | serial number  | `1b 56 36 00`                | 24    |
//! | wake up        | `1b 45 57 55` + padding      | -     |
//! | cancel job     | `1b 44 71 jj jj`             | -     |

use log::debug;

use crate::{
    error::Error,
    media::{MediaInfo, MAX_DECKS, MEDIA_BLOCK_LEN},
    status::{
        JobStatus, MemoryStatus, PrinterStatus, JOB_STATUS_LEN, MEMORY_STATUS_LEN,
        PRINTER_STATUS_LEN,
    },
    transport::Transport,
};

/// Plane data goes out in writes of this size.
pub const CHUNK_SIZE: usize = 256 * 1024;

const ESC: u8 = 0x1b;
const REPLY: u8 = 0xe4;

const JOB_STATUS: [u8; 4] = [ESC, 0x56, 0x31, 0x30];
const PRINTER_STATUS: [u8; 4] = [ESC, 0x56, 0x32, 0x30];
const MEDIA_STATUS: [u8; 4] = [ESC, 0x56, 0x20, 0x30];
const MEMORY_STATUS: [u8; 4] = [ESC, 0x56, 0x33, 0x00];
const SERIAL: [u8; 4] = [ESC, 0x56, 0x36, 0x00];
const WAKEUP: [u8; 4] = [ESC, 0x45, 0x57, 0x55];
const CANCEL: [u8; 3] = [ESC, 0x44, 0x71];

pub const MEDIA_STATUS_LEN: usize = 4 + MAX_DECKS * MEDIA_BLOCK_LEN;
pub const SERIAL_LEN: usize = 24;
pub const WAKEUP_LEN: usize = 34;

/// Reply magic for a request family.
pub fn reply_magic(request: [u8; 4]) -> [u8; 4] {
    [REPLY, request[1], request[2], request[3]]
}

pub fn job_status_cmd(job_id: u16) -> [u8; 6] {
    let id = job_id.to_be_bytes();
    [JOB_STATUS[0], JOB_STATUS[1], JOB_STATUS[2], JOB_STATUS[3], id[0], id[1]]
}

pub fn memory_status_cmd(columns: u16, rows: u16, matte: bool) -> [u8; 9] {
    let c = columns.to_be_bytes();
    let r = rows.to_be_bytes();
    [
        MEMORY_STATUS[0],
        MEMORY_STATUS[1],
        MEMORY_STATUS[2],
        MEMORY_STATUS[3],
        c[0],
        c[1],
        r[0],
        r[1],
        matte as u8,
    ]
}

pub fn wakeup_cmd() -> [u8; WAKEUP_LEN] {
    let mut buf = [0u8; WAKEUP_LEN];
    buf[..4].copy_from_slice(&WAKEUP);
    buf
}

pub fn cancel_cmd(job_id: u16) -> [u8; 5] {
    let id = job_id.to_be_bytes();
    [CANCEL[0], CANCEL[1], CANCEL[2], id[0], id[1]]
}

/// Request/response exchange with one printer.
///
/// Holds no protocol state; one request is in flight at a time.
pub struct Client<T: Transport> {
    transport: T,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Self {
        Client { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn send(&mut self, buf: &[u8]) -> Result<(), Error> {
        self.transport.send(buf)
    }

    pub fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        self.transport.receive(buf)
    }

    /// Stream a payload in `CHUNK_SIZE` writes.
    pub fn send_chunked(&mut self, data: &[u8]) -> Result<(), Error> {
        for chunk in data.chunks(CHUNK_SIZE) {
            self.transport.send(chunk)?;
        }
        Ok(())
    }

    fn query(&mut self, cmd: &[u8], family: [u8; 4], len: usize) -> Result<Vec<u8>, Error> {
        self.transport.send(cmd)?;

        let mut buf = vec![0u8; len];
        let n = self.transport.receive(&mut buf)?;
        if n != len {
            debug!("short read: {} of {} bytes for {:02x?}", n, len, family);
            return Err(Error::ShortRead {
                expected: len,
                got: n,
            });
        }

        let expected = reply_magic(family);
        let got = [buf[0], buf[1], buf[2], buf[3]];
        if got != expected {
            return Err(Error::BadResponse { expected, got });
        }
        Ok(buf)
    }

    pub fn get_job_status(&mut self, job_id: u16) -> Result<JobStatus, Error> {
        let buf = self.query(&job_status_cmd(job_id), JOB_STATUS, JOB_STATUS_LEN)?;
        Ok(JobStatus::from_buf(&buf))
    }

    pub fn get_printer_status(&mut self) -> Result<PrinterStatus, Error> {
        let buf = self.query(&PRINTER_STATUS, PRINTER_STATUS, PRINTER_STATUS_LEN)?;
        Ok(PrinterStatus::from_buf(&buf))
    }

    pub fn get_media_status(&mut self) -> Result<[MediaInfo; MAX_DECKS], Error> {
        let buf = self.query(&MEDIA_STATUS, MEDIA_STATUS, MEDIA_STATUS_LEN)?;
        let mut media = [MediaInfo::default(); MAX_DECKS];
        for (i, info) in media.iter_mut().enumerate() {
            let start = 4 + i * MEDIA_BLOCK_LEN;
            *info = MediaInfo::from_buf(&buf[start..start + MEDIA_BLOCK_LEN]);
        }
        Ok(media)
    }

    /// Ask whether a job of the given size fits in printer memory.
    pub fn get_memory_headroom(
        &mut self,
        columns: u16,
        rows: u16,
        matte: bool,
    ) -> Result<MemoryStatus, Error> {
        let cmd = memory_status_cmd(columns, rows, matte);
        let buf = self.query(&cmd, MEMORY_STATUS, MEMORY_STATUS_LEN)?;
        Ok(MemoryStatus::from_buf(&buf))
    }

    pub fn get_serial(&mut self) -> Result<String, Error> {
        let buf = self.query(&SERIAL, SERIAL, SERIAL_LEN)?;
        Ok(String::from_utf8_lossy(&buf[4..])
            .trim_end_matches(&['\0', ' '][..])
            .to_string())
    }

    pub fn send_wakeup(&mut self) -> Result<(), Error> {
        self.transport.send(&wakeup_cmd())
    }

    /// Best effort: the device may already be laying down color.
    pub fn cancel_job(&mut self, job_id: u16) -> Result<(), Error> {
        self.transport.send(&cancel_cmd(job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Canned {
        sent: Vec<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
    }

    impl Transport for Canned {
        fn send(&mut self, buf: &[u8]) -> Result<(), Error> {
            self.sent.push(buf.to_vec());
            Ok(())
        }

        fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
            let reply = self.replies.pop_front().unwrap_or_default();
            let n = reply.len().min(buf.len());
            buf[..n].copy_from_slice(&reply[..n]);
            Ok(n)
        }
    }

    fn reply(family: [u8; 4], len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        buf[..4].copy_from_slice(&reply_magic(family));
        buf
    }

    #[test]
    fn test_command_framing() {
        assert_eq!(job_status_cmd(0x0102), [0x1b, 0x56, 0x31, 0x30, 0x01, 0x02]);
        assert_eq!(
            memory_status_cmd(1864, 2454, true),
            [0x1b, 0x56, 0x33, 0x00, 0x07, 0x48, 0x09, 0x96, 0x01]
        );
        assert_eq!(cancel_cmd(7), [0x1b, 0x44, 0x71, 0x00, 0x07]);
        let wake = wakeup_cmd();
        assert_eq!(&wake[..4], &[0x1b, 0x45, 0x57, 0x55]);
        assert!(wake[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_short_read() {
        let mut canned = Canned::default();
        canned.replies.push_back(vec![0xe4, 0x56, 0x31, 0x30]);
        let mut client = Client::new(canned);
        match client.get_job_status(1) {
            Err(Error::ShortRead { expected, got }) => {
                assert_eq!(expected, JOB_STATUS_LEN);
                assert_eq!(got, 4);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_wrong_family() {
        let mut canned = Canned::default();
        canned.replies.push_back(reply(PRINTER_STATUS, JOB_STATUS_LEN));
        let mut client = Client::new(canned);
        assert!(matches!(
            client.get_job_status(1),
            Err(Error::BadResponse { .. })
        ));
    }

    #[test]
    fn test_media_and_serial() {
        let mut canned = Canned::default();
        let mut media = reply(MEDIA_STATUS, MEDIA_STATUS_LEN);
        media[4 + 1] = 0x04;
        media[20 + 1] = 0x05;
        canned.replies.push_back(media);
        let mut serial = reply(SERIAL, SERIAL_LEN);
        serial[4..10].copy_from_slice(b"A12345");
        canned.replies.push_back(serial);

        let mut client = Client::new(canned);
        let media = client.get_media_status().unwrap();
        assert_eq!(media[0].media_type, 0x04);
        assert_eq!(media[1].media_type, 0x05);
        assert_eq!(client.get_serial().unwrap(), "A12345");
        assert_eq!(client.transport().sent[0], MEDIA_STATUS.to_vec());
    }

    #[test]
    fn test_send_chunked() {
        let mut client = Client::new(Canned::default());
        let data = vec![0u8; CHUNK_SIZE * 2 + 10];
        client.send_chunked(&data).unwrap();
        let sizes: Vec<usize> = client.transport().sent.iter().map(|s| s.len()).collect();
        assert_eq!(sizes, vec![CHUNK_SIZE, CHUNK_SIZE, 10]);
    }
}
