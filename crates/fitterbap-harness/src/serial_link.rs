//! A `LowerLink` over a real `serial2::SerialPort`, used by the
//! `serial` subcommand. Grounded in `dxkb-split-link-tester`'s
//! `SerialBus`: a background thread owns the read side and pushes
//! whatever it reads into a shared queue, while `send` writes directly
//! through a cloned handle — the same split the teacher's tester uses
//! (there, the reader thread parsed framing itself; here the wire
//! format already carries its own SOF markers and length byte, so the
//! queue just holds raw bytes for `FrameDecoder` to chew on).

use std::collections::VecDeque;
use std::io::{ErrorKind, Write};
use std::sync::{Arc, Mutex};

use serial2::SerialPort;

use fitterbap_common::link::{LinkSendError, LowerLink};

#[derive(Clone)]
pub struct SerialLink {
    port: Arc<SerialPort>,
    inbox: Arc<Mutex<VecDeque<u8>>>,
}

impl SerialLink {
    /// Spawns the background reader thread and returns a handle that
    /// can both `send` (the `LowerLink` impl) and drain whatever the
    /// reader thread has queued up via [`Self::read_available`].
    pub fn new(port: SerialPort) -> Self {
        let port = Arc::new(port);
        let inbox = Arc::new(Mutex::new(VecDeque::new()));

        let reader_port = Arc::clone(&port);
        let reader_inbox = Arc::clone(&inbox);
        std::thread::spawn(move || loop {
            use std::io::Read;
            let mut buf = [0u8; 4096];
            match reader_port.as_ref().read(&mut buf) {
                Ok(0) => {}
                Ok(n) => reader_inbox.lock().unwrap().extend(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => panic!("serial read failed: {e}"),
            }
        });

        SerialLink { port, inbox }
    }

    /// Drains whatever the reader thread has queued since the last
    /// call, returning the number of bytes copied into `buf`.
    pub fn read_available(&self, buf: &mut [u8]) -> usize {
        let mut inbox = self.inbox.lock().unwrap();
        let n = inbox.len().min(buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = inbox.pop_front().unwrap();
        }
        n
    }
}

impl LowerLink for SerialLink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkSendError> {
        match self.port.as_ref().write_all(bytes) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => Err(LinkSendError::WouldBlock),
            Err(e) => panic!("serial write failed: {e}"),
        }
    }

    fn send_available(&self) -> usize {
        // Real serial ports don't expose a meaningful "room left in the
        // OS write buffer" figure through `serial2`; a soak-test harness
        // just always reports room and lets a failed `write_all` turn
        // into a retried `WouldBlock` on the next `process` call.
        usize::MAX
    }
}
